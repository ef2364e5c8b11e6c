use std::fs;

use chatvault_codec::{CipherParams, DecryptError, DecryptionKey, decrypt, decrypt_with};
use chatvault_core::{MessageKind, TimeWindow};
use chatvault_harness::fixtures::header_reserve;
use chatvault_harness::{
    MessageRow, TestVault, random_key, seal_bytes, seal_database, synthetic_plaintext, test_params,
};
use chatvault_storage::{MessageStore, SqliteArchive};

// ============================================================================
// Synthetic page images
// ============================================================================

#[test]
fn decrypts_synthetic_image_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    let plain = synthetic_plaintext(4, &params);
    fs::write(vault.path("MSG0.enc"), seal_bytes(&key, &plain, &params)?)?;

    let out = vault.path("MSG0.db");
    let report = decrypt_with(&key, &vault.path("MSG0.enc"), &out, &params)?;
    assert_eq!(report.pages, 4);
    assert!(report.is_clean());

    let decrypted = fs::read(&out)?;
    assert_eq!(decrypted.len(), plain.len());
    for pgno in 1..=4u32 {
        let start = (pgno as usize - 1) * params.page_size;
        let body = params.body_range(pgno);
        assert_eq!(
            &decrypted[start + body.start..start + body.end],
            &plain[start + body.start..start + body.end],
            "page {pgno} body differs"
        );
    }
    assert_eq!(&decrypted[..16], b"SQLite format 3\0");
    Ok(())
}

#[test]
fn decrypting_twice_is_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    fs::write(
        vault.path("in.enc"),
        seal_bytes(&key, &synthetic_plaintext(3, &params), &params)?,
    )?;

    let first = decrypt_with(&key, &vault.path("in.enc"), &vault.path("a.db"), &params)?;
    let second = decrypt_with(&key, &vault.path("in.enc"), &vault.path("b.db"), &params)?;
    assert_eq!(first.digest, second.digest);
    assert_eq!(fs::read(vault.path("a.db"))?, fs::read(vault.path("b.db"))?);
    assert_eq!(first.digest, blake3::hash(&fs::read(vault.path("a.db"))?));
    Ok(())
}

#[test]
fn corrupted_tag_fails_only_that_page() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    let plain = synthetic_plaintext(5, &params);
    let mut sealed = seal_bytes(&key, &plain, &params)?;
    let tag_byte = 2 * params.page_size + params.tag_range().start;
    sealed[tag_byte] ^= 0xff;
    fs::write(vault.path("in.enc"), &sealed)?;

    let out = vault.path("out.db");
    let report = decrypt_with(&key, &vault.path("in.enc"), &out, &params)?;
    assert_eq!(report.failed_pages, vec![3]);
    assert_eq!(report.pages_ok(), 4);

    let decrypted = fs::read(&out)?;
    let page = |n: usize| &decrypted[(n - 1) * params.page_size..n * params.page_size];
    assert!(page(3).iter().all(|b| *b == 0));
    let body = params.body_range(4);
    assert_eq!(
        &page(4)[body.clone()],
        &plain[3 * params.page_size + body.start..3 * params.page_size + body.end]
    );
    Ok(())
}

#[test]
fn swapped_pages_fail_authentication() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    let mut sealed = seal_bytes(&key, &synthetic_plaintext(3, &params), &params)?;
    let size = params.page_size;
    let (head, tail) = sealed.split_at_mut(2 * size);
    head[size..2 * size].swap_with_slice(&mut tail[..size]);
    fs::write(vault.path("in.enc"), &sealed)?;

    let report = decrypt_with(&key, &vault.path("in.enc"), &vault.path("out.db"), &params)?;
    assert_eq!(report.failed_pages, vec![2, 3]);
    Ok(())
}

#[test]
fn wrong_key_is_key_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let sealed = seal_bytes(&random_key(), &synthetic_plaintext(2, &params), &params)?;
    fs::write(vault.path("in.enc"), sealed)?;

    let out = vault.path("out.db");
    let err = decrypt_with(&random_key(), &vault.path("in.enc"), &out, &params).unwrap_err();
    assert!(matches!(err, DecryptError::KeyMismatch { .. }));
    assert!(!out.exists());
    Ok(())
}

#[test]
fn mismatched_geometry_is_format_error() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    let mut plain = synthetic_plaintext(2, &params);
    plain[20] = 64;
    fs::write(vault.path("in.enc"), seal_bytes(&key, &plain, &params)?)?;

    let out = vault.path("out.db");
    let err = decrypt_with(&key, &vault.path("in.enc"), &out, &params).unwrap_err();
    assert!(matches!(err, DecryptError::Format { .. }));
    assert!(!out.exists());
    Ok(())
}

#[test]
fn hex_key_decrypts_like_raw_key() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let raw = [0x3cu8; 32];
    let key = DecryptionKey::from_bytes(raw);
    fs::write(
        vault.path("in.enc"),
        seal_bytes(&key, &synthetic_plaintext(1, &params), &params)?,
    )?;
    let hex_key = DecryptionKey::from_hex(&"3c".repeat(32))?;
    let report = decrypt_with(&hex_key, &vault.path("in.enc"), &vault.path("out.db"), &params)?;
    assert!(report.is_clean());
    Ok(())
}

#[test]
fn vendor_parameters_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = CipherParams::default();
    let key = random_key();
    fs::write(
        vault.path("in.enc"),
        seal_bytes(&key, &synthetic_plaintext(2, &params), &params)?,
    )?;
    let report = decrypt(&key, &vault.path("in.enc"), &vault.path("out.db"))?;
    assert_eq!(report.pages, 2);
    assert!(report.is_clean());
    Ok(())
}

// ============================================================================
// Real SQLite shards
// ============================================================================

#[test]
fn sealed_sqlite_shard_opens_after_decrypt() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let params = test_params();
    let key = random_key();
    let rows: Vec<_> = (1..=40)
        .map(|i| MessageRow::text(i, "room@chatroom", 1_700_000_000 + i, &"lorem ipsum ".repeat(30)))
        .collect();
    let plain = vault.reserved_message_shard("plain.db", &rows)?;
    assert_eq!(header_reserve(&plain)?, 48);

    seal_database(&key, &plain, &vault.path("MSG0.db.enc"), &params)?;
    let out = vault.path("MSG0.db");
    let report = decrypt_with(&key, &vault.path("MSG0.db.enc"), &out, &params)?;
    assert!(report.pages > 1);
    assert!(report.is_clean());

    let archive = SqliteArchive::open(&out)?;
    let messages = archive.messages("room@chatroom", &TimeWindow::unbounded())?;
    assert_eq!(messages.len(), 40);
    assert_eq!(messages[0].kind, MessageKind::Text);
    assert_eq!(messages[39].local_id, 40);
    Ok(())
}

#[test]
fn iteration_count_mismatch_is_key_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let vault = TestVault::new()?;
    let key = random_key();
    let params = test_params();
    fs::write(
        vault.path("in.enc"),
        seal_bytes(&key, &synthetic_plaintext(1, &params), &params)?,
    )?;
    let err = decrypt_with(
        &key,
        &vault.path("in.enc"),
        &vault.path("out.db"),
        &CipherParams {
            kdf_iterations: 3,
            ..params
        },
    )
    .unwrap_err();
    assert!(matches!(err, DecryptError::KeyMismatch { .. }));
    Ok(())
}
