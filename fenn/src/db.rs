use crate::{
    config::Config,
    file::HINT_SUFFIX,
    index::{new_indexer, Indexer},
    merge::read_merge_fin,
    record::{self, RecordType, RECORD_HEADER_MAX},
    scheduler::{parse_schedule, CronScheduler, Scheduler},
    time::unix_nano,
    Error,
};
use block_wal::{Options, Wal, GIB, SEGMENT_SUFFIX};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

/// Mutable core of the engine, guarded by the engine lock.
///
/// The scratch buffers are reused across writes; they are only touched while
/// the engine write lock is held.
pub(crate) struct DbState {
    pub(crate) wal: Wal,
    pub(crate) hint_wal: Option<Wal>,
    record_header: [u8; RECORD_HEADER_MAX],
    encode_buf: Vec<u8>,
}

pub(crate) struct DbInner {
    pub(crate) config: Config,
    pub(crate) state: RwLock<DbState>,
    pub(crate) index: Box<dyn Indexer>,
    pub(crate) merge_guard: Mutex<()>,
    closed: AtomicBool,
    merge_trigger: Mutex<Option<CronScheduler>>,
}

impl Drop for DbInner {
    fn drop(&mut self) {
        log::trace!("Dropping database, stopping merge trigger");
        self.stop_merge_trigger();
    }
}

/// A Bitcask-style embedded key-value store.
///
/// The handle is cheap to clone and may be shared across threads; every
/// operation takes `&self`.
#[derive(Clone)]
pub struct Db(pub(crate) Arc<DbInner>);

impl Db {
    /// Opens a database using the given config and recovers the key index
    /// from the log.
    pub(crate) fn open(config: Config) -> crate::Result<Self> {
        log::debug!("Opening database at {}", config.path.display());

        // Reject a broken auto-merge expression before touching the disk
        let schedule = config
            .auto_merge
            .as_deref()
            .map(parse_schedule)
            .transpose()?;

        let wal = open_data_wal(&config)?;

        let db = Self(Arc::new(DbInner {
            config,
            state: RwLock::new(DbState {
                wal,
                hint_wal: None,
                record_header: [0; RECORD_HEADER_MAX],
                encode_buf: Vec::new(),
            }),
            index: new_indexer(),
            merge_guard: Mutex::new(()),
            closed: AtomicBool::new(false),
            merge_trigger: Mutex::new(None),
        }));

        {
            let state = db.0.state.read().expect("lock is poisoned");
            db.0.load_index(&state.wal)?;
        }

        if let Some(schedule) = schedule {
            // The trigger only holds a weak handle, so dropping the last
            // user handle still tears the engine down
            let weak = Arc::downgrade(&db.0);

            let trigger = CronScheduler::start(schedule, move || {
                let Some(inner) = weak.upgrade() else { return };
                if let Err(e) = Self(inner).merge() {
                    log::error!("auto merge failed: {e:?}");
                }
            });

            *db.0.merge_trigger.lock().expect("lock is poisoned") = Some(trigger);
        }

        Ok(db)
    }

    /// Inserts a key-value pair, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, the database is closed, or an
    /// I/O error occurs.
    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> crate::Result<()> {
        self.put_with_ttl(key, value, Duration::ZERO)
    }

    /// Inserts a key-value pair that expires once `ttl` has elapsed.
    ///
    /// A zero `ttl` never expires. Reads of an expired key behave exactly
    /// like reads of a missing key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, the database is closed, or an
    /// I/O error occurs.
    pub fn put_with_ttl<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &self,
        key: K,
        value: V,
        ttl: Duration,
    ) -> crate::Result<()> {
        let key = key.as_ref();

        if self.0.is_closed() {
            return Err(Error::Closed);
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let mut state = self.0.state.write().expect("lock is poisoned");

        let expire = if ttl.is_zero() {
            0
        } else {
            // NOTE: Truncation is okay, no reasonable TTL overflows i64 nanoseconds
            #[allow(clippy::cast_possible_truncation)]
            {
                unix_nano() + ttl.as_nanos() as i64
            }
        };

        self.0
            .write_record(&mut state, RecordType::Modified, key, value.as_ref(), expire)
    }

    /// Retrieves the value of a key.
    ///
    /// # Errors
    ///
    /// Will return [`Error::KeyNotFound`] if the key does not exist or has
    /// expired.
    ///
    /// # Panics
    ///
    /// Panics if the index points at a deleted record; that state is
    /// unreachable unless the engine itself is defective.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<Vec<u8>> {
        let key = key.as_ref();

        if self.0.is_closed() {
            return Err(Error::Closed);
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let state = self.0.state.read().expect("lock is poisoned");

        let now = unix_nano();
        let Some(position) = self.0.index.get(key) else {
            return Err(Error::KeyNotFound);
        };

        let data = state.wal.read(position)?;
        let record = record::decode_record(&data);

        assert!(
            record.record_type != RecordType::Deleted,
            "deleted record must not be reachable through the index"
        );

        if record.is_expired(now) {
            self.0.index.delete(key);
            return Err(Error::KeyNotFound);
        }

        Ok(record.value)
    }

    /// Removes a key.
    ///
    /// A tombstone is appended even if the key does not exist, since it must
    /// override earlier records for the same key during recovery.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the key is empty, the database is closed, or an
    /// I/O error occurs.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<()> {
        let key = key.as_ref();

        if self.0.is_closed() {
            return Err(Error::Closed);
        }
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let mut state = self.0.state.write().expect("lock is poisoned");
        self.0
            .write_record(&mut state, RecordType::Deleted, key, &[], 0)
    }

    /// Number of live keys (not deleted, not known to be expired)
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.index.len()
    }

    /// Returns `true` if the database holds no live keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes the data log to disk.
    ///
    /// Useful as an explicit checkpoint when running with
    /// [`SyncPolicy::Never`](crate::SyncPolicy::Never).
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn sync(&self) -> crate::Result<()> {
        let state = self.0.state.read().expect("lock is poisoned");
        state.wal.sync()?;
        Ok(())
    }

    /// Closes the database; further operations fail with [`Error::Closed`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn close(&self) -> crate::Result<()> {
        log::debug!("Closing database at {}", self.0.config.path.display());

        {
            let state = self.0.state.write().expect("lock is poisoned");
            state.wal.close()?;

            if let Some(hint_wal) = &state.hint_wal {
                hint_wal.close()?;
            }
        }

        self.0.stop_merge_trigger();
        self.0.closed.store(true, Ordering::Release);

        Ok(())
    }
}

impl DbInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stop_merge_trigger(&self) {
        let trigger = self.merge_trigger.lock().expect("lock is poisoned").take();
        if let Some(mut trigger) = trigger {
            trigger.stop();
        }
    }

    fn write_record(
        &self,
        state: &mut DbState,
        record_type: RecordType,
        key: &[u8],
        value: &[u8],
        expire: i64,
    ) -> crate::Result<()> {
        let DbState {
            wal,
            record_header,
            encode_buf,
            ..
        } = state;

        encode_buf.clear();
        record::encode_record(record_type, expire, key, value, record_header, encode_buf);

        let position = wal.write(encode_buf)?;

        if record_type == RecordType::Deleted {
            self.index.delete(key);
        } else {
            self.index.put(key.to_vec(), position);
        }

        Ok(())
    }

    /// Rebuilds the index: hint file first, then the data log tail that is
    /// not covered by the last merge.
    pub(crate) fn load_index(&self, wal: &Wal) -> crate::Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        self.load_index_from_hint()?;
        self.load_index_from_wal(wal)
    }

    fn load_index_from_hint(&self) -> crate::Result<()> {
        let hint_wal = self.open_hint_wal()?;

        for item in hint_wal.iter() {
            let (data, _) = item?;
            let (key, position) = record::decode_hint_record(&data);
            self.index.put(key, position);
        }

        hint_wal.close()?;
        Ok(())
    }

    fn load_index_from_wal(&self, wal: &Wal) -> crate::Result<()> {
        let merge_fin_id = read_merge_fin(&self.config.path)?;

        let mut iter = wal.iter();
        iter.skip_segment_less_equal(merge_fin_id);

        let now = unix_nano();

        for item in iter {
            let (data, position) = item?;
            let record = record::decode_record(&data);

            match record.record_type {
                RecordType::Modified if !record.is_expired(now) => {
                    self.index.put(record.key, position);
                }
                RecordType::Modified => {}
                RecordType::Deleted => {
                    self.index.delete(&record.key);
                }
            }
        }

        Ok(())
    }

    /// Opens the hint log living next to the data segments
    pub(crate) fn open_hint_wal(&self) -> crate::Result<Wal> {
        let wal = Wal::open(
            Options::new(&self.config.path)
                .segment_size(GIB)
                .segment_suffix(HINT_SUFFIX),
        )?;
        Ok(wal)
    }
}

pub(crate) fn open_data_wal(config: &Config) -> crate::Result<Wal> {
    let wal = Wal::open(
        Options::new(&config.path)
            .segment_size(config.segment_size)
            .segment_suffix(SEGMENT_SUFFIX)
            .sync(config.sync)
            .bytes_before_sync(config.bytes_before_sync),
    )?;
    Ok(wal)
}
