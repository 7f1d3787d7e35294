use crate::segment::BLOCK_SIZE;
use std::sync::{Mutex, OnceLock};

// Process-wide buffer pools shared by every open log to keep allocator
// pressure flat under read/write heavy workloads.

fn block_pool() -> &'static Mutex<Vec<Vec<u8>>> {
    static POOL: OnceLock<Mutex<Vec<Vec<u8>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

fn frame_pool() -> &'static Mutex<Vec<Vec<u8>>> {
    static POOL: OnceLock<Mutex<Vec<Vec<u8>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

/// Takes a zero-initialized block-sized scratch buffer out of the pool
pub fn get_block_buffer() -> Vec<u8> {
    let buffer = block_pool().lock().expect("lock is poisoned").pop();
    buffer.unwrap_or_else(|| vec![0; BLOCK_SIZE as usize])
}

/// Hands a block scratch buffer back to the pool
pub fn put_block_buffer(buffer: Vec<u8>) {
    if buffer.len() == BLOCK_SIZE as usize {
        block_pool().lock().expect("lock is poisoned").push(buffer);
    }
}

/// Takes an empty frame buffer for a single write call out of the pool
pub fn get_frame_buffer() -> Vec<u8> {
    let buffer = frame_pool().lock().expect("lock is poisoned").pop();
    let mut buffer = buffer.unwrap_or_default();
    buffer.clear();
    buffer
}

/// Hands a frame buffer back to the pool
pub fn put_frame_buffer(buffer: Vec<u8>) {
    frame_pool().lock().expect("lock is poisoned").push(buffer);
}
