use fenn::{Config, Error};
use test_log::test;

#[test]
fn recover_large_key_count() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path())
        .segment_size(block_wal::MIB)
        .open()?;

    for i in 1..=100_000u32 {
        db.put(format!("k{i}"), "xxxx")?;
    }
    db.close()?;

    let db = Config::new(folder.path())
        .segment_size(block_wal::MIB)
        .open()?;

    assert_eq!(100_000, db.len());
    for i in 1..=100_000u32 {
        assert_eq!(b"xxxx".to_vec(), db.get(format!("k{i}"))?);
    }

    Ok(())
}

#[test]
fn recover_tombstone_overrides_earlier_writes() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;
    db.put("a", "1")?;
    db.put("b", "2")?;
    db.delete("a")?;
    db.close()?;

    let db = Config::new(folder.path()).open()?;
    assert!(matches!(db.get("a"), Err(Error::KeyNotFound)));
    assert_eq!(b"2".to_vec(), db.get("b")?);
    assert_eq!(1, db.len());

    Ok(())
}

#[test]
fn recover_latest_version_wins() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    // Small segments force the versions of the key across several files
    let db = Config::new(folder.path())
        .segment_size(block_wal::KIB * 64)
        .open()?;

    let filler = vec![b'f'; 1_000];
    for i in 0..1_000u32 {
        db.put("key", i.to_string())?;
        db.put(format!("filler{i}"), &filler)?;
    }
    db.close()?;

    let db = Config::new(folder.path())
        .segment_size(block_wal::KIB * 64)
        .open()?;
    assert_eq!(b"999".to_vec(), db.get("key")?);

    Ok(())
}

#[test]
fn recover_empty_dir() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;
    assert!(db.is_empty());
    db.close()?;

    let db = Config::new(folder.path()).open()?;
    assert!(db.is_empty());

    Ok(())
}
