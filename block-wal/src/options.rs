use std::path::{Path, PathBuf};

/// 1 kibibyte
pub const KIB: u64 = 1_024;

/// 1 mebibyte
pub const MIB: u64 = 1_024 * KIB;

/// 1 gibibyte
pub const GIB: u64 = 1_024 * MIB;

/// Default file extension of data segment files
pub const SEGMENT_SUFFIX: &str = ".seg";

/// Durability mode applied by the log after each write
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SyncPolicy {
    /// Never fsync on write; only OS-level buffering applies.
    ///
    /// A crash may lose the unsynced tail of the log.
    #[default]
    Never,

    /// Fsync after every single write before returning to the caller
    EveryWrite,

    /// Fsync once [`Options::bytes_before_sync`] bytes have accumulated
    /// since the last sync.
    ///
    /// Losses after a crash are bounded to the configured threshold.
    Threshold,
}

/// Write-ahead log configuration
#[derive(Clone, Debug)]
pub struct Options {
    /// Directory the segment files live in
    pub dir: PathBuf,

    /// Maximum allowed size of a single segment file in bytes
    ///
    /// Defaults to 1 GiB.
    pub segment_size: u64,

    /// File extension of segment files
    pub segment_suffix: String,

    /// Durability mode
    pub sync: SyncPolicy,

    /// Byte threshold for [`SyncPolicy::Threshold`]
    pub bytes_before_sync: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            segment_size: GIB,
            segment_suffix: SEGMENT_SUFFIX.into(),
            sync: SyncPolicy::default(),
            bytes_before_sync: 0,
        }
    }
}

impl Options {
    /// Initializes new options for a log inside the given directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().into(),
            ..Default::default()
        }
    }

    /// Sets the maximum segment file size in bytes.
    ///
    /// Defaults to 1 GiB.
    #[must_use]
    pub fn segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Sets the file extension of segment files.
    ///
    /// Defaults to `.seg`.
    #[must_use]
    pub fn segment_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.segment_suffix = suffix.into();
        self
    }

    /// Sets the durability mode.
    ///
    /// Defaults to [`SyncPolicy::Never`].
    #[must_use]
    pub fn sync(mut self, policy: SyncPolicy) -> Self {
        self.sync = policy;
        self
    }

    /// Sets the byte threshold used by [`SyncPolicy::Threshold`]
    #[must_use]
    pub fn bytes_before_sync(mut self, bytes: u32) -> Self {
        self.bytes_before_sync = bytes;
        self
    }
}
