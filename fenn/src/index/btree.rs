use super::Indexer;
use block_wal::ChunkPosition;
use std::{collections::BTreeMap, sync::RwLock};

/// Ordered index over byte-lexicographically sorted keys
#[derive(Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, ChunkPosition>>,
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, position: ChunkPosition) -> Option<ChunkPosition> {
        self.tree
            .write()
            .expect("lock is poisoned")
            .insert(key, position)
    }

    fn get(&self, key: &[u8]) -> Option<ChunkPosition> {
        self.tree
            .read()
            .expect("lock is poisoned")
            .get(key)
            .copied()
    }

    fn delete(&self, key: &[u8]) -> Option<ChunkPosition> {
        self.tree.write().expect("lock is poisoned").remove(key)
    }

    fn len(&self) -> usize {
        self.tree.read().expect("lock is poisoned").len()
    }

    fn clear(&self) {
        self.tree.write().expect("lock is poisoned").clear();
    }
}
