use crate::Db;
use block_wal::{SyncPolicy, GIB};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Storage directory
    pub(crate) path: PathBuf,

    /// Maximum allowed data segment file size in bytes
    pub(crate) segment_size: u64,

    /// Durability mode forwarded to the write-ahead log
    pub(crate) sync: SyncPolicy,

    /// Byte threshold for [`SyncPolicy::Threshold`]
    pub(crate) bytes_before_sync: u32,

    /// Cron expression for background merges; `None` disables them
    pub(crate) auto_merge: Option<String>,
}

impl Config {
    /// Initializes a new config for a database inside the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
            segment_size: GIB,
            sync: SyncPolicy::default(),
            bytes_before_sync: 0,
            auto_merge: None,
        }
    }

    /// Sets the maximum data segment file size.
    ///
    /// Defaults to 1 GiB.
    ///
    /// Writes whose framed size can never fit a segment of this size are
    /// rejected.
    #[must_use]
    pub fn segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Sets the durability mode.
    ///
    /// Defaults to [`SyncPolicy::Never`].
    #[must_use]
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync = policy;
        self
    }

    /// Sets the byte threshold used by [`SyncPolicy::Threshold`]
    #[must_use]
    pub fn bytes_before_sync(mut self, bytes: u32) -> Self {
        self.bytes_before_sync = bytes;
        self
    }

    /// Schedules background merges using a cron expression.
    ///
    /// The seconds field is optional, so both `0 3 * * *` and
    /// `30 0 3 * * *` are accepted.
    ///
    /// Defaults to no background merges.
    #[must_use]
    pub fn auto_merge<S: Into<String>>(mut self, expression: S) -> Self {
        self.auto_merge = Some(expression.into());
        self
    }

    /// Opens a database using the config.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs, if recovery hits damaged
    /// data, or if the auto-merge expression cannot be parsed.
    pub fn open(self) -> crate::Result<Db> {
        Db::open(self)
    }
}
