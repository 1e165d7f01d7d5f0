//! In-memory configuration store.
//!
//! Implements [`ConfigPort`] by keeping the object list as one `postcard`
//! blob, the same encoding a flash-backed store would write.  Replacing
//! the blob in one assignment makes each save atomic.

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::objects::ObjectData;

/// Largest blob the store accepts, matching a typical flash key-value slot.
pub const MAX_BLOB_SIZE: usize = 4000;

#[derive(Debug)]
pub struct MemoryConfigStore {
    blob: Option<Vec<u8>>,
    capacity: usize,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BLOB_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blob: None,
            capacity,
        }
    }

    /// Start from a raw blob (e.g. one read back from another store).
    pub fn from_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Some(blob),
            capacity: MAX_BLOB_SIZE,
        }
    }

    /// The encoded blob, if anything was saved.
    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    pub fn clear(&mut self) {
        self.blob = None;
    }
}

impl ConfigPort for MemoryConfigStore {
    fn load(&self) -> Result<Vec<ObjectData>, ConfigError> {
        let bytes = self.blob.as_deref().ok_or(ConfigError::NotFound)?;
        let objects: Vec<ObjectData> =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        info!("MemoryConfigStore: loaded {} objects ({} bytes)", objects.len(), bytes.len());
        Ok(objects)
    }

    fn save(&mut self, objects: &[ObjectData]) -> Result<(), ConfigError> {
        let bytes = postcard::to_allocvec(objects).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > self.capacity {
            return Err(ConfigError::StorageFull);
        }
        info!("MemoryConfigStore: saved {} objects ({} bytes)", objects.len(), bytes.len());
        self.blob = Some(bytes);
        Ok(())
    }
}
