//! A segmented write-ahead log with block-structured, CRC-protected framing.
//!
//! ##### NOTE
//!
//! > This crate only provides the log primitive.
//! > You probably want to use the `fenn` key-value engine instead, which
//! > composes this log with an in-memory index and a compaction pipeline.
//!
//! ##### About
//!
//! The log is a collection of append-only segment files inside a single
//! directory. Each segment is divided into fixed 32 KiB blocks; a payload is
//! framed into one or more chunks, each carrying a 7 byte header with a
//! CRC-32 checksum. Payloads larger than a block are split across consecutive
//! blocks using `Start`/`Middle`/`End` chunks, so a single record may be
//! arbitrarily large (up to the configured segment size).
//!
//! Exactly one segment is active (appendable) at a time; older segments are
//! sealed and read-only. Writing returns a [`ChunkPosition`] which can later
//! be handed back to [`Wal::read`] for random access, and the whole log can
//! be replayed in order through [`Wal::iter`].
//!
//! # Example usage
//!
//! ```
//! use block_wal::{Options, Wal};
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! let wal = Wal::open(Options::new(folder.path()))?;
//!
//! let position = wal.write(b"hello")?;
//! assert_eq!(b"hello".to_vec(), wal.read(position)?);
//!
//! for item in wal.iter() {
//!     let (payload, position) = item?;
//!     // ...
//! }
//! #
//! # Ok::<(), block_wal::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]

mod error;
mod options;
mod pool;
mod segment;
mod wal;

pub use {
    error::{Error, Result},
    options::{Options, SyncPolicy, GIB, KIB, MIB, SEGMENT_SUFFIX},
    segment::{segment_path, ChunkPosition, BLOCK_SIZE, CHUNK_HEADER_SIZE},
    wal::{Wal, WalIterator},
};
