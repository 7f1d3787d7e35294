use fenn::Config;
use test_log::test;

#[test]
fn concurrent_writers_and_readers() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    let writers = (0..4u32)
        .map(|t| {
            let db = db.clone();

            std::thread::spawn(move || -> fenn::Result<()> {
                for i in 0..2_500u32 {
                    db.put(format!("t{t}-k{i}"), format!("t{t}-v{i}"))?;
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    for writer in writers {
        writer.join().expect("thread should not panic")?;
    }

    assert_eq!(10_000, db.len());

    let readers = (0..4u32)
        .map(|t| {
            let db = db.clone();

            std::thread::spawn(move || -> fenn::Result<()> {
                for i in 0..2_500u32 {
                    let value = db.get(format!("t{t}-k{i}"))?;
                    assert_eq!(format!("t{t}-v{i}").into_bytes(), value);
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    for reader in readers {
        reader.join().expect("thread should not panic")?;
    }

    Ok(())
}

#[test]
fn merge_concurrent_with_writes() -> fenn::Result<()> {
    let folder = tempfile::tempdir()?;

    let db = Config::new(folder.path()).open()?;

    for i in 0..10_000u32 {
        db.put(format!("old{i}"), "v")?;
    }

    let writer = {
        let db = db.clone();
        std::thread::spawn(move || -> fenn::Result<()> {
            for i in 0..5_000u32 {
                db.put(format!("new{i}"), "w")?;
            }
            Ok(())
        })
    };

    db.merge()?;
    writer.join().expect("thread should not panic")?;

    assert_eq!(15_000, db.len());
    assert_eq!(b"v".to_vec(), db.get("old9999")?);
    assert_eq!(b"w".to_vec(), db.get("new4999")?);

    // Everything is still there after a reopen
    db.close()?;
    let db = Config::new(folder.path()).open()?;

    assert_eq!(15_000, db.len());
    assert_eq!(b"v".to_vec(), db.get("old9999")?);
    assert_eq!(b"w".to_vec(), db.get("new4999")?);

    Ok(())
}
