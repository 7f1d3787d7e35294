use fenn::{Config, Error};
use test_log::test;

#[test]
fn kv_simple() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    db.put("abc", "xyz")?;
    assert_eq!(b"xyz".to_vec(), db.get("abc")?);
    assert_eq!(1, db.len());

    db.delete("abc")?;
    assert!(matches!(db.get("abc"), Err(Error::KeyNotFound)));
    assert!(db.is_empty());

    Ok(())
}

#[test]
fn kv_overwrite() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    for i in 0..100u32 {
        db.put("abc", i.to_string())?;
    }

    assert_eq!(b"99".to_vec(), db.get("abc")?);
    assert_eq!(1, db.len());

    Ok(())
}

#[test]
fn kv_delete_missing_key() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    // Deleting a key that was never written is fine; the tombstone is
    // still recorded
    db.delete("ghost")?;
    assert!(matches!(db.get("ghost"), Err(Error::KeyNotFound)));

    Ok(())
}

#[test]
fn kv_empty_key_rejected() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    assert!(matches!(db.put("", "value"), Err(Error::EmptyKey)));
    assert!(matches!(db.get(""), Err(Error::EmptyKey)));
    assert!(matches!(db.delete(""), Err(Error::EmptyKey)));

    Ok(())
}

#[test]
fn kv_closed() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;
    db.put("a", "b")?;
    db.close()?;

    assert!(matches!(db.put("a", "c"), Err(Error::Closed)));
    assert!(matches!(db.get("a"), Err(Error::Closed)));
    assert!(matches!(db.delete("a"), Err(Error::Closed)));

    Ok(())
}

#[test]
fn kv_large_value() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    // Spans several blocks of the underlying log
    let value = vec![b'v'; 100_000];
    db.put("big", &value)?;
    assert_eq!(value, db.get("big")?);

    Ok(())
}

#[test]
fn kv_value_too_large() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path())
        .segment_size(block_wal::MIB)
        .open()?;

    let value = vec![b'v'; 2 * block_wal::MIB as usize];
    assert!(matches!(
        db.put("big", &value),
        Err(Error::Wal(block_wal::Error::RecordTooLarge))
    ));

    // The engine stays usable
    db.put("small", "fits")?;
    assert_eq!(b"fits".to_vec(), db.get("small")?);

    Ok(())
}
