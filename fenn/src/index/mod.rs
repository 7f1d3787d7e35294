mod btree;

use block_wal::ChunkPosition;

/// In-memory mapping from live keys to the on-disk location of their latest
/// value.
///
/// Implementations carry their own interior locking and must only preserve
/// the point-operation contract; the engine never traverses the index in
/// order.
pub trait Indexer: Send + Sync {
    /// Maps a key to a position, returning the previous position if the key
    /// was already present
    fn put(&self, key: Vec<u8>, position: ChunkPosition) -> Option<ChunkPosition>;

    /// Looks up the position of a key
    fn get(&self, key: &[u8]) -> Option<ChunkPosition>;

    /// Removes a key, returning its position if it was present
    fn delete(&self, key: &[u8]) -> Option<ChunkPosition>;

    /// Number of keys currently held
    fn len(&self) -> usize;

    /// Returns `true` if no keys are held
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key, used when the index is rebuilt after a merge
    fn clear(&self);
}

/// Creates the default index implementation
pub fn new_indexer() -> Box<dyn Indexer> {
    Box::new(btree::BTreeIndex::default())
}
