//! A Bitcask-style embedded key-value storage engine.
//!
//! It is not:
//!
//! - a standalone server
//! - a relational database
//! - an LSM-tree: there is no sorted on-disk structure and no range scans
//!
//! Every mutation is appended to a segmented write-ahead log; an in-memory
//! index maps each live key to the on-disk location of its latest value.
//! Reads cost at most one disk access, writes exactly one append. Obsolete
//! records are reclaimed by [`Db::merge`], which rewrites only still-live
//! records into a compacted set of segments and also produces a hint file so
//! the next [`Config::open`] can rebuild the index without re-reading values.
//!
//! Keys and values are arbitrary byte strings; every write may carry an
//! optional time-to-live.
//!
//! ```
//! use fenn::Config;
//!
//! # let folder = tempfile::tempdir()?;
//! #
//! let db = Config::new(folder.path()).open()?;
//!
//! // Write some data
//! db.put("a", "hello")?;
//!
//! // And retrieve it
//! let bytes = db.get("a")?;
//!
//! // Or remove it again
//! db.delete("a")?;
//!
//! // Values can expire
//! db.put_with_ttl("b", "short-lived", std::time::Duration::from_secs(60))?;
//!
//! // Reclaim space taken by overwritten and deleted records
//! db.merge()?;
//!
//! db.close()?;
//! #
//! # Ok::<_, fenn::Error>(())
//! ```
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod config;
mod db;
mod error;
mod file;
mod index;
mod merge;
mod record;
mod scheduler;
mod time;

pub use block_wal::SyncPolicy;

pub use {
    config::Config,
    db::Db,
    error::{Error, Result},
};
