use crate::{
    config::Config,
    db::{open_data_wal, Db},
    file::{HINT_SUFFIX, MERGE_DIR, MERGE_FIN_FILE},
    index::Indexer as _,
    record::{self, RecordType},
    time::unix_nano,
    Error,
};
use block_wal::{segment_path, SEGMENT_SUFFIX};
use std::path::Path;

impl Db {
    /// Compacts the log: rewrites only still-live records into a fresh set
    /// of segments, builds a hint file for fast recovery, and atomically
    /// swaps both in.
    ///
    /// Writers and readers keep running while the live records are copied;
    /// the engine lock is only taken for the final swap-in.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs. The engine then continues
    /// to operate on the original log unchanged.
    pub fn merge(&self) -> crate::Result<()> {
        if self.0.is_closed() {
            return Err(Error::Closed);
        }

        let _guard = self.0.merge_guard.lock().expect("lock is poisoned");

        log::debug!("merge: starting in {}", self.0.config.path.display());

        let merge_dir = self.0.config.path.join(MERGE_DIR);

        // A leftover directory from a crashed merge carries no marker and
        // was never swapped in, so it is safe to wipe
        if merge_dir.try_exists()? {
            std::fs::remove_dir_all(&merge_dir)?;
        }

        self.do_merge(&merge_dir)?;

        let mut state = self.0.state.write().expect("lock is poisoned");

        self.replace_segment_files(&merge_dir)?;

        state.wal = open_data_wal(&self.0.config)?;
        self.0.index.clear();
        self.0.load_index(&state.wal)?;

        log::debug!("merge: done, {} live keys", self.0.index.len());

        Ok(())
    }

    /// Builds the compacted log plus hint file inside `merge_dir`
    fn do_merge(&self, merge_dir: &Path) -> crate::Result<()> {
        let merge_db = Config::new(merge_dir)
            .segment_size(self.0.config.segment_size)
            .open()?;

        {
            let mut merge_state = merge_db.0.state.write().expect("lock is poisoned");
            merge_state.hint_wal = Some(merge_db.0.open_hint_wal()?);
        }

        let result = self.copy_live_records(&merge_db, merge_dir);

        if let Err(e) = merge_db.close() {
            log::error!("merge: failed to close merge engine: {e:?}");
        }

        result
    }

    fn copy_live_records(&self, merge_db: &Db, merge_dir: &Path) -> crate::Result<()> {
        // Everything written from here on goes to a fresh segment and is
        // untouched by this merge pass
        let prev_segment_id = {
            let state = self.0.state.read().expect("lock is poisoned");
            state.wal.switch_new_segment_force()?
        };

        log::trace!("merge: compacting segments 1..={prev_segment_id}");

        let now = unix_nano();

        let iter = {
            let state = self.0.state.read().expect("lock is poisoned");
            state.wal.iter_up_to(prev_segment_id)
        };

        for item in iter {
            let (data, old_position) = item?;
            let record = record::decode_record(&data);

            if record.record_type != RecordType::Modified || record.is_expired(now) {
                continue;
            }

            // Copy the record only if the index still points at exactly this
            // position; older versions are skipped and newer ones live past
            // prev_segment_id
            let current = {
                let _state = self.0.state.read().expect("lock is poisoned");
                self.0.index.get(&record.key)
            };

            let is_live = current.is_some_and(|position| {
                position.segment_id == old_position.segment_id
                    && position.block_index == old_position.block_index
                    && position.block_offset == old_position.block_offset
            });

            if !is_live {
                continue;
            }

            let merge_state = merge_db.0.state.read().expect("lock is poisoned");

            let new_position = merge_state.wal.write(&data)?;

            let hint = record::encode_hint_record(&record.key, new_position);
            merge_state
                .hint_wal
                .as_ref()
                .expect("hint log is attached during merge")
                .write(&hint)?;
        }

        write_merge_fin(merge_dir, prev_segment_id)
    }

    /// Swaps the compacted segments, hint file and marker into the engine
    /// directory. Caller holds the engine write lock.
    fn replace_segment_files(&self, merge_dir: &Path) -> crate::Result<()> {
        let db_dir = &self.0.config.path;

        if !merge_dir.try_exists()? {
            return Ok(());
        }

        let result = (|| {
            let max_segment_id = read_merge_fin(merge_dir)?;

            for id in 1..=max_segment_id {
                let path = segment_path(db_dir, SEGMENT_SUFFIX, id);
                if path.try_exists()? {
                    std::fs::remove_file(&path)?;
                }
            }

            for id in 1..=max_segment_id {
                move_file(
                    &segment_path(merge_dir, SEGMENT_SUFFIX, id),
                    &segment_path(db_dir, SEGMENT_SUFFIX, id),
                )?;
            }

            move_file(
                &segment_path(merge_dir, HINT_SUFFIX, 1),
                &segment_path(db_dir, HINT_SUFFIX, 1),
            )?;

            // The marker moves last: its presence is what makes the merge
            // output authoritative during recovery
            move_file(&merge_dir.join(MERGE_FIN_FILE), &db_dir.join(MERGE_FIN_FILE))
        })();

        if let Err(e) = std::fs::remove_dir_all(merge_dir) {
            log::error!("merge: failed to remove merge directory: {e:?}");
        }

        result
    }
}

/// Renames a file, treating a missing source as a no-op.
///
/// The merge directory sits inside the engine directory, so the rename never
/// crosses filesystems.
fn move_file(src: &Path, dst: &Path) -> crate::Result<()> {
    if !src.try_exists()? {
        return Ok(());
    }
    std::fs::rename(src, dst)?;
    Ok(())
}

/// Writes the merge-finish marker naming the highest compacted segment id
pub(crate) fn write_merge_fin(dir: &Path, max_segment_id: u32) -> crate::Result<()> {
    std::fs::write(dir.join(MERGE_FIN_FILE), max_segment_id.to_string())?;
    Ok(())
}

/// Reads the merge-finish marker; 0 if no merge has completed yet
pub(crate) fn read_merge_fin(dir: &Path) -> crate::Result<u32> {
    match std::fs::read_to_string(dir.join(MERGE_FIN_FILE)) {
        Ok(contents) => contents.parse().map_err(|_| Error::InvalidMergeMarker),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_merge_fin_round_trip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        assert_eq!(0, read_merge_fin(dir.path())?);

        write_merge_fin(dir.path(), 42)?;
        assert_eq!(42, read_merge_fin(dir.path())?);

        Ok(())
    }

    #[test]
    fn test_merge_fin_garbage() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        std::fs::write(dir.path().join(MERGE_FIN_FILE), "not a number")?;
        assert!(matches!(
            read_merge_fin(dir.path()),
            Err(Error::InvalidMergeMarker)
        ));

        Ok(())
    }
}
