use crate::{pool, Error};
use byteorder::{ByteOrder, LittleEndian};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

/// Size of a single I/O block in bytes.
///
/// A chunk never straddles a block boundary; larger payloads are split
/// across consecutive blocks instead.
pub const BLOCK_SIZE: u32 = 32 * 1_024;

/// Size of a chunk header in bytes: checksum (4) + length (2) + type (1)
pub const CHUNK_HEADER_SIZE: u32 = 7;

const CHUNK_TYPE_FULL: u8 = 0;
const CHUNK_TYPE_START: u8 = 1;
const CHUNK_TYPE_MIDDLE: u8 = 2;
const CHUNK_TYPE_END: u8 = 3;

/// Location of one framed record inside the log
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkPosition {
    /// Id of the segment file holding the record
    pub segment_id: u32,

    /// Block the record's first chunk starts in
    pub block_index: u32,

    /// Byte offset of the first chunk header inside that block
    pub block_offset: u32,

    /// Framed size in bytes, including every chunk header emitted for the record
    pub size: u32,
}

/// Builds the path of a segment file: `<9-digit zero-padded id><suffix>`
pub fn segment_path<P: AsRef<Path>>(dir: P, suffix: &str, id: u32) -> PathBuf {
    dir.as_ref().join(format!("{id:09}{suffix}"))
}

/// Result of reading one record out of a segment, carrying the position
/// where the following record starts
pub(crate) struct RawRecord {
    pub data: Vec<u8>,
    pub next_block_index: u32,
    pub next_block_offset: u32,
    pub framed_size: u32,
}

/// A single append-only segment file, divided into fixed-size blocks
pub(crate) struct Segment {
    id: u32,
    file: File,
    path: PathBuf,
    active_block_index: AtomicU32,
    active_block_offset: AtomicU32,
    closed: AtomicBool,
}

impl Segment {
    /// Opens (or creates) the segment file with the given id.
    ///
    /// The active block index and offset are derived from the on-disk length.
    pub fn open<P: AsRef<Path>>(dir: P, suffix: &str, id: u32) -> crate::Result<Self> {
        let path = segment_path(dir, suffix, id);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let len = file.metadata()?.len();

        // NOTE: Truncation is okay, block coordinates fit u32 by construction
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self {
            id,
            file,
            path,
            active_block_index: AtomicU32::new((len / u64::from(BLOCK_SIZE)) as u32),
            active_block_offset: AtomicU32::new((len % u64::from(BLOCK_SIZE)) as u32),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current length of the segment in bytes (padding included)
    pub fn size(&self) -> u64 {
        u64::from(self.active_block_index.load(Ordering::Acquire)) * u64::from(BLOCK_SIZE)
            + u64::from(self.active_block_offset.load(Ordering::Acquire))
    }

    /// Appends a payload to the segment, returning its position.
    ///
    /// The framed bytes are buffered and flushed in a single write syscall.
    pub fn write(&self, data: &[u8]) -> crate::Result<ChunkPosition> {
        if self.is_closed() {
            return Err(Error::SegmentClosed);
        }

        let mut buffer = pool::get_frame_buffer();
        let result = self.write_to_buffer(data, &mut buffer).and_then(|position| {
            (&self.file).write_all(&buffer)?;
            Ok(position)
        });
        pool::put_frame_buffer(buffer);

        result
    }

    fn write_to_buffer(&self, data: &[u8], buffer: &mut Vec<u8>) -> crate::Result<ChunkPosition> {
        let mut block_index = self.active_block_index.load(Ordering::Acquire);
        let mut block_offset = self.active_block_offset.load(Ordering::Acquire);

        // When another chunk header cannot follow in this block, pad it with
        // zeros up to the block boundary. The padding is never read back.
        if block_offset + CHUNK_HEADER_SIZE >= BLOCK_SIZE && block_offset < BLOCK_SIZE {
            buffer.resize(buffer.len() + (BLOCK_SIZE - block_offset) as usize, 0);
            block_index += 1;
            block_offset = 0;
        }

        let mut position = ChunkPosition {
            segment_id: self.id,
            block_index,
            block_offset,
            size: 0,
        };

        // NOTE: Truncation is okay, a payload always fits u32
        #[allow(clippy::cast_possible_truncation)]
        let data_size = data.len() as u32;

        if block_offset + data_size + CHUNK_HEADER_SIZE <= BLOCK_SIZE {
            // The whole payload fits into the current block
            append_chunk(buffer, data, CHUNK_TYPE_FULL);
            position.size = data_size + CHUNK_HEADER_SIZE;
        } else {
            // Split across blocks: Start, zero or more Middle, then End
            let mut chunk_count: u32 = 0;
            let mut start: usize = 0;
            let mut remaining = data.len();
            let mut offset = block_offset as usize;

            while remaining > 0 {
                let free = BLOCK_SIZE as usize - offset;

                let chunk_type = if start == 0 {
                    CHUNK_TYPE_START
                } else if free < CHUNK_HEADER_SIZE as usize + remaining {
                    CHUNK_TYPE_MIDDLE
                } else {
                    CHUNK_TYPE_END
                };

                let end = (start + free - CHUNK_HEADER_SIZE as usize).min(data.len());
                append_chunk(buffer, &data[start..end], chunk_type);

                chunk_count += 1;
                start = end;
                offset = (offset + free) % BLOCK_SIZE as usize;
                remaining = data.len() - start;
            }

            position.size = chunk_count * CHUNK_HEADER_SIZE + data_size;
        }

        block_offset += position.size;
        if block_offset >= BLOCK_SIZE {
            block_index += block_offset / BLOCK_SIZE;
            block_offset %= BLOCK_SIZE;
        }

        self.active_block_index.store(block_index, Ordering::Release);
        self.active_block_offset.store(block_offset, Ordering::Release);

        Ok(position)
    }

    /// Reads the record starting at the given position.
    ///
    /// Reading past the end of the segment fails with an I/O error.
    pub fn read(&self, block_index: u32, block_offset: u32) -> crate::Result<Vec<u8>> {
        match self.do_read(block_index, block_offset)? {
            Some(record) => Ok(record.data),
            None => Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
        }
    }

    /// Same as [`Segment::read`], but also reports where the next record
    /// starts. Returns `Ok(None)` at the end of the segment.
    pub fn do_read(&self, block_index: u32, block_offset: u32) -> crate::Result<Option<RawRecord>> {
        if self.is_closed() {
            return Err(Error::SegmentClosed);
        }

        let mut block = pool::get_block_buffer();
        let result = self.do_read_buffered(&mut block, block_index, block_offset);
        pool::put_block_buffer(block);

        result
    }

    fn do_read_buffered(
        &self,
        block: &mut [u8],
        mut block_index: u32,
        mut offset: u32,
    ) -> crate::Result<Option<RawRecord>> {
        let mut data = Vec::new();
        let mut chunk_count: u32 = 0;

        loop {
            let segment_size = self.size();
            let block_start = u64::from(block_index) * u64::from(BLOCK_SIZE);

            // The newest block may not be full yet, so only its valid prefix
            // is loaded
            let size = u64::from(BLOCK_SIZE).min(segment_size.saturating_sub(block_start));

            if u64::from(offset) >= size {
                return Ok(None);
            }

            // NOTE: Truncation is okay, size is at most BLOCK_SIZE
            #[allow(clippy::cast_possible_truncation)]
            read_exact_at(
                &self.file,
                block.get_mut(..size as usize).ok_or(Error::InvalidChecksum)?,
                block_start,
            )?;

            let header_start = offset as usize;
            let data_start = header_start + CHUNK_HEADER_SIZE as usize;
            let header = block
                .get(header_start..data_start)
                .ok_or(Error::InvalidChecksum)?;

            let saved_checksum = LittleEndian::read_u32(&header[0..4]);
            let length = LittleEndian::read_u16(&header[4..6]);
            let chunk_type = header[6];

            let data_end = data_start + usize::from(length);
            let checked = block
                .get(header_start + 4..data_end)
                .ok_or(Error::InvalidChecksum)?;

            let mut hasher = crc32fast::Hasher::new();
            hasher.update(checked);
            if hasher.finalize() != saved_checksum {
                return Err(Error::InvalidChecksum);
            }

            data.extend_from_slice(&checked[3..]);
            chunk_count += 1;

            if chunk_type == CHUNK_TYPE_FULL || chunk_type == CHUNK_TYPE_END {
                let mut next_block_index = block_index;

                // NOTE: Truncation is okay, data_end is at most BLOCK_SIZE
                #[allow(clippy::cast_possible_truncation)]
                let mut next_block_offset = data_end as u32;

                if next_block_offset + CHUNK_HEADER_SIZE >= BLOCK_SIZE {
                    next_block_index += 1;
                    next_block_offset = 0;
                }

                // NOTE: Truncation is okay, a payload always fits u32
                #[allow(clippy::cast_possible_truncation)]
                let framed_size = chunk_count * CHUNK_HEADER_SIZE + data.len() as u32;

                return Ok(Some(RawRecord {
                    data,
                    next_block_index,
                    next_block_offset,
                    framed_size,
                }));
            }

            block_index += 1;
            offset = 0;
        }
    }

    /// Flushes the segment file to disk
    pub fn sync(&self) -> crate::Result<()> {
        if self.is_closed() {
            return Err(Error::SegmentClosed);
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Marks the segment closed; further operations fail.
    ///
    /// The file descriptor itself is released when the segment is dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Closes the segment and deletes its file from disk
    pub fn remove(&self) -> crate::Result<()> {
        self.close();
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Frames one chunk (header + payload) into the write buffer
fn append_chunk(buffer: &mut Vec<u8>, data: &[u8], chunk_type: u8) {
    let mut header = [0; CHUNK_HEADER_SIZE as usize];

    // NOTE: Truncation is okay, a chunk payload never exceeds a block
    #[allow(clippy::cast_possible_truncation)]
    LittleEndian::write_u16(&mut header[4..6], data.len() as u16);
    header[6] = chunk_type;

    // The checksum covers length, type and payload
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[4..7]);
    hasher.update(data);
    LittleEndian::write_u32(&mut header[0..4], hasher.finalize());

    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(data);
}

/// Estimates the framed size of a payload in the worst case, with one
/// header per touched block plus one for a possible leading padding skip
pub(crate) fn max_required_capacity(data_size: usize) -> u64 {
    let n = data_size as u64;
    let header = u64::from(CHUNK_HEADER_SIZE);

    header + (n / u64::from(BLOCK_SIZE) + 1) * header + n
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SEGMENT_SUFFIX;
    use std::io::{Seek, SeekFrom, Write};
    use test_log::test;

    fn block_sized(fill: u8, len: usize) -> Vec<u8> {
        vec![fill; len]
    }

    #[test]
    fn test_segment_write_and_read() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let value = b"some value".to_vec();
        let position = segment.write(&value)?;

        assert_eq!(value, segment.read(position.block_index, position.block_offset)?);
        assert_eq!(CHUNK_HEADER_SIZE + 10, position.size);

        Ok(())
    }

    #[test]
    fn test_segment_write_full_block() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let value = block_sized(b'a', (BLOCK_SIZE - CHUNK_HEADER_SIZE) as usize);
        let position = segment.write(&value)?;

        assert_eq!(0, position.block_index);
        assert_eq!(0, position.block_offset);

        // The next write starts on a fresh block
        assert_eq!(1, segment.active_block_index.load(Ordering::Acquire));
        assert_eq!(0, segment.active_block_offset.load(Ordering::Acquire));

        assert_eq!(value, segment.read(position.block_index, position.block_offset)?);

        Ok(())
    }

    #[test]
    fn test_segment_write_padding() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let value = block_sized(b'a', (BLOCK_SIZE - CHUNK_HEADER_SIZE - 5) as usize);
        let position = segment.write(&value)?;
        assert_eq!(0, position.block_index);

        // Only 5 bytes remain in block 0, so the next chunk is padded over
        // to block 1
        let position = segment.write(b"a")?;
        assert_eq!(1, position.block_index);
        assert_eq!(0, position.block_offset);

        Ok(())
    }

    #[test]
    fn test_segment_write_cross_block() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let value = block_sized(b'a', (BLOCK_SIZE - CHUNK_HEADER_SIZE * 2 - 1) as usize);
        segment.write(&value)?;

        let value = b"abc".to_vec();
        let position = segment.write(&value)?;
        assert_eq!(0, position.block_index);

        assert_eq!(value, segment.read(position.block_index, position.block_offset)?);

        Ok(())
    }

    #[test]
    fn test_segment_write_spanning_blocks() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        segment.write(&block_sized(b'a', (BLOCK_SIZE - 100) as usize))?;

        // Start + Middle + Middle + End
        let value = block_sized(b'z', ((BLOCK_SIZE - CHUNK_HEADER_SIZE) * 3) as usize);
        let position = segment.write(&value)?;

        assert_eq!(0, position.block_index);
        assert_eq!(3, segment.active_block_index.load(Ordering::Acquire));

        assert_eq!(value, segment.read(position.block_index, position.block_offset)?);

        Ok(())
    }

    #[test]
    fn test_segment_reopen_derives_position() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let first = {
            let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;
            segment.write(b"one")?
        };

        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;
        assert_eq!(
            u64::from(CHUNK_HEADER_SIZE) + 3,
            segment.size(),
        );

        let second = segment.write(b"two")?;
        assert_eq!(b"one".to_vec(), segment.read(first.block_index, first.block_offset)?);
        assert_eq!(b"two".to_vec(), segment.read(second.block_index, second.block_offset)?);

        Ok(())
    }

    #[test]
    fn test_segment_closed() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let position = segment.write(b"abc")?;
        segment.close();

        assert!(matches!(segment.write(b"abc"), Err(Error::SegmentClosed)));
        assert!(matches!(
            segment.read(position.block_index, position.block_offset),
            Err(Error::SegmentClosed)
        ));
        assert!(matches!(segment.sync(), Err(Error::SegmentClosed)));

        Ok(())
    }

    #[test]
    fn test_segment_checksum_mismatch() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        let position = segment.write(b"some important value")?;

        // Mangle the payload on disk
        {
            let mut file = OpenOptions::new()
                .write(true)
                .open(segment_path(dir.path(), SEGMENT_SUFFIX, 1))?;
            file.seek(SeekFrom::Start(u64::from(CHUNK_HEADER_SIZE) + 2))?;
            file.write_all(b"garbage")?;
            file.sync_all()?;
        }

        assert!(matches!(
            segment.read(position.block_index, position.block_offset),
            Err(Error::InvalidChecksum)
        ));

        Ok(())
    }

    #[test]
    fn test_segment_remove() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let segment = Segment::open(dir.path(), SEGMENT_SUFFIX, 1)?;

        segment.write(b"abc")?;
        segment.remove()?;

        assert!(!segment_path(dir.path(), SEGMENT_SUFFIX, 1).try_exists()?);

        Ok(())
    }

    #[test]
    fn test_max_required_capacity() {
        assert_eq!(
            u64::from(CHUNK_HEADER_SIZE) * 2 + 10,
            max_required_capacity(10)
        );

        // A payload spanning several blocks pays one header per block
        let spanning = (BLOCK_SIZE * 2) as usize;
        assert_eq!(
            u64::from(CHUNK_HEADER_SIZE) * 4 + BLOCK_SIZE as u64 * 2,
            max_required_capacity(spanning)
        );
    }
}
