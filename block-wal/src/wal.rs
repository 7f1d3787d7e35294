use crate::{
    options::Options,
    segment::{self, ChunkPosition, Segment},
    Error, SyncPolicy,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

struct WalInner {
    active: Arc<Segment>,
    sealed: BTreeMap<u32, Arc<Segment>>,
    bytes_since_sync: u32,
}

/// A write-ahead log: the ordered collection of segments in one directory.
///
/// Exactly one segment is active (appendable), the rest are sealed and
/// read-only. Writes roll over into a fresh segment once the active one
/// cannot hold the payload anymore.
pub struct Wal {
    options: Options,
    inner: RwLock<WalInner>,
}

impl Wal {
    /// Opens the log inside the configured directory, creating it if needed.
    ///
    /// Existing segment files are discovered by their
    /// `<9-digit zero-padded id><suffix>` names; entries that do not parse
    /// are ignored. The highest id becomes the active segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn open(options: Options) -> crate::Result<Self> {
        log::debug!("Opening WAL at {}", options.dir.display());

        std::fs::create_dir_all(&options.dir)?;

        let mut ids = Vec::new();

        for entry in std::fs::read_dir(&options.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(&options.segment_suffix) else {
                continue;
            };
            let Ok(id) = stem.parse::<u32>() else { continue };
            ids.push(id);
        }

        ids.sort_unstable();

        let mut sealed = BTreeMap::new();

        let active = if let Some((&last, rest)) = ids.split_last() {
            for &id in rest {
                let segment = Segment::open(&options.dir, &options.segment_suffix, id)?;
                sealed.insert(id, Arc::new(segment));
            }
            Segment::open(&options.dir, &options.segment_suffix, last)?
        } else {
            Segment::open(&options.dir, &options.segment_suffix, 1)?
        };

        Ok(Self {
            options,
            inner: RwLock::new(WalInner {
                active: Arc::new(active),
                sealed,
                bytes_since_sync: 0,
            }),
        })
    }

    /// Appends a payload to the log, rolling over to a fresh segment first
    /// if the active one cannot hold it, then applies the configured
    /// durability policy.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::RecordTooLarge`] if the framed payload can never
    /// fit a segment of the configured size; the log is left untouched.
    pub fn write(&self, data: &[u8]) -> crate::Result<ChunkPosition> {
        let mut inner = self.inner.write().expect("lock is poisoned");

        let required = segment::max_required_capacity(data.len());
        if required > self.options.segment_size {
            return Err(Error::RecordTooLarge);
        }

        if inner.active.size() + required > self.options.segment_size {
            self.switch_new_segment(&mut inner)?;
        }

        let position = inner.active.write(data)?;

        match self.options.sync {
            SyncPolicy::Never => {}
            SyncPolicy::EveryWrite => inner.active.sync()?,
            SyncPolicy::Threshold => {
                inner.bytes_since_sync += position.size;
                if inner.bytes_since_sync >= self.options.bytes_before_sync {
                    inner.active.sync()?;
                    inner.bytes_since_sync = 0;
                }
            }
        }

        Ok(position)
    }

    /// Reads the record at the given position.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SegmentNotFound`] if the position names a segment
    /// that is not part of the log, and with [`Error::InvalidChecksum`] if
    /// the stored data is damaged.
    pub fn read(&self, position: ChunkPosition) -> crate::Result<Vec<u8>> {
        let inner = self.inner.read().expect("lock is poisoned");

        let segment = if position.segment_id == inner.active.id() {
            &inner.active
        } else {
            inner
                .sealed
                .get(&position.segment_id)
                .ok_or(Error::SegmentNotFound(position.segment_id))?
        };

        segment.read(position.block_index, position.block_offset)
    }

    /// Unconditionally seals the active segment and opens a fresh one.
    ///
    /// Returns the id of the previously active segment; every record written
    /// before this call now lives in a sealed segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn switch_new_segment_force(&self) -> crate::Result<u32> {
        let mut inner = self.inner.write().expect("lock is poisoned");

        let prev_id = inner.active.id();
        self.switch_new_segment(&mut inner)?;

        Ok(prev_id)
    }

    fn switch_new_segment(&self, inner: &mut WalInner) -> crate::Result<()> {
        inner.active.sync()?;

        let new_id = inner.active.id() + 1;
        log::trace!("Sealing segment {} and rolling over to {new_id}", inner.active.id());

        let segment = Segment::open(&self.options.dir, &self.options.segment_suffix, new_id)?;
        let old = std::mem::replace(&mut inner.active, Arc::new(segment));
        inner.sealed.insert(old.id(), old);

        Ok(())
    }

    /// Returns an iterator over every record in the log, in segment order
    #[must_use]
    pub fn iter(&self) -> WalIterator {
        self.iter_up_to(u32::MAX)
    }

    /// Returns an iterator over every record in segments whose id is at most
    /// `max_segment_id`.
    ///
    /// The segment list is snapshotted on construction; records appended to
    /// segments opened afterwards are not observed.
    #[must_use]
    pub fn iter_up_to(&self, max_segment_id: u32) -> WalIterator {
        let inner = self.inner.read().expect("lock is poisoned");

        let mut segments: Vec<Arc<Segment>> = inner.sealed.values().cloned().collect();
        segments.push(inner.active.clone());
        segments.retain(|segment| segment.id() <= max_segment_id);
        segments.sort_by_key(|segment| segment.id());

        WalIterator {
            segments,
            segment_idx: 0,
            next_block_index: 0,
            next_block_offset: 0,
        }
    }

    /// Flushes the active segment to disk
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn sync(&self) -> crate::Result<()> {
        let inner = self.inner.write().expect("lock is poisoned");
        inner.active.sync()
    }

    /// Closes every segment; further operations fail with a closed error
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn close(&self) -> crate::Result<()> {
        let inner = self.inner.write().expect("lock is poisoned");

        for segment in inner.sealed.values() {
            segment.close();
        }
        inner.active.close();

        Ok(())
    }

    /// Removes every segment file of the log from disk
    ///
    /// # Errors
    ///
    /// Will return `Err` if an I/O error occurs.
    pub fn delete(&self) -> crate::Result<()> {
        let inner = self.inner.write().expect("lock is poisoned");

        for segment in inner.sealed.values() {
            segment.remove()?;
        }
        inner.active.remove()
    }
}

/// Iterates the records of a [`Wal`] in on-disk order, yielding each payload
/// together with its starting position
pub struct WalIterator {
    segments: Vec<Arc<Segment>>,
    segment_idx: usize,
    next_block_index: u32,
    next_block_offset: u32,
}

impl WalIterator {
    /// While still positioned at the very first segment, advances to the
    /// first segment whose id exceeds `id`.
    ///
    /// Used to skip over data that is already covered by a hint file.
    pub fn skip_segment_less_equal(&mut self, id: u32) {
        if self.segment_idx > 0 {
            return;
        }
        while self
            .segments
            .get(self.segment_idx)
            .is_some_and(|segment| segment.id() <= id)
        {
            self.segment_idx += 1;
        }
    }
}

impl Iterator for WalIterator {
    type Item = crate::Result<(Vec<u8>, ChunkPosition)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let segment = self.segments.get(self.segment_idx)?;

            match segment.do_read(self.next_block_index, self.next_block_offset) {
                Ok(Some(record)) => {
                    let position = ChunkPosition {
                        segment_id: segment.id(),
                        block_index: self.next_block_index,
                        block_offset: self.next_block_offset,
                        size: record.framed_size,
                    };

                    self.next_block_index = record.next_block_index;
                    self.next_block_offset = record.next_block_offset;

                    return Some(Ok((record.data, position)));
                }
                Ok(None) => {
                    self.segment_idx += 1;
                    self.next_block_index = 0;
                    self.next_block_offset = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
