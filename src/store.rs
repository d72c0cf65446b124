//! In-memory model registry.
//!
//! Fixed-width chained hash table keyed by the model's decimal id.
//! Identifiers are assigned monotonically at insert time and are never
//! reused, so a remove cannot alias a later registration.

use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::EncryptionParameters;
use crate::graph::OperatorGraph;

/// Bucket count. Large enough that chains stay short for any plausible
/// number of resident pipelines.
const CAPACITY: usize = 3000;
const HASH_MULTIPLIER: u64 = 65599;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("model already registered under id {id}")]
    DuplicateModel { id: i32 },
}

/// Where a model's partition blobs live between requests.
#[derive(Debug)]
pub enum PartitionStorage {
    /// Decrypted plaintext held in memory; no tags needed at inference.
    Resident(Vec<Vec<u8>>),
    /// Ciphertext files on disk, re-authenticated on every inference.
    Durable(Vec<PathBuf>),
}

#[derive(Debug)]
pub struct StoredModel {
    pub id: i32,
    pub partition_names: Vec<String>,
    pub params: EncryptionParameters,
    pub graph: OperatorGraph,
    pub storage: PartitionStorage,
    pub tokenizer: Option<Vec<u8>>,
}

/// Registration input; the store assigns the id.
#[derive(Debug)]
pub struct ModelEntry {
    pub partition_names: Vec<String>,
    pub params: EncryptionParameters,
    pub graph: OperatorGraph,
    pub storage: PartitionStorage,
    pub tokenizer: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct ModelStore {
    buckets: Vec<Vec<StoredModel>>,
    next_id: i32,
    len: usize,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(CAPACITY);
        buckets.resize_with(CAPACITY, Vec::new);
        Self {
            buckets,
            next_id: 1,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_for(id: i32) -> usize {
        let digits = id.to_string();
        let mut hash = 0u64;
        for byte in digits.bytes() {
            hash = hash.wrapping_mul(HASH_MULTIPLIER).wrapping_add(byte as u64);
        }
        (hash % CAPACITY as u64) as usize
    }

    /// A registration whose leading names equal a stored model's full
    /// name list, element for element, is the same content registered
    /// again (possibly with extra partitions appended).
    fn is_prefix_equal(stored: &[String], candidate: &[String]) -> bool {
        candidate.len() >= stored.len() && candidate[..stored.len()] == *stored
    }

    /// Scan every stored model for one whose name list is a leading
    /// prefix of `names`. Returns the existing id on a match.
    pub fn find_duplicate(&self, names: &[String]) -> Option<i32> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter())
            .find(|stored| Self::is_prefix_equal(&stored.partition_names, names))
            .map(|stored| stored.id)
    }

    /// Identifier the next successful insert will receive.
    pub fn next_id(&self) -> i32 {
        self.next_id
    }

    /// Register a model, rejecting a pipeline whose partition names
    /// already identify a stored one. Returns the assigned id.
    pub fn insert(&mut self, entry: ModelEntry) -> Result<i32, StoreError> {
        if let Some(id) = self.find_duplicate(&entry.partition_names) {
            return Err(StoreError::DuplicateModel { id });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.len += 1;

        let bucket = Self::bucket_for(id);
        self.buckets[bucket].push(StoredModel {
            id,
            partition_names: entry.partition_names,
            params: entry.params,
            graph: entry.graph,
            storage: entry.storage,
            tokenizer: entry.tokenizer,
        });
        Ok(id)
    }

    pub fn get(&self, id: i32) -> Option<&StoredModel> {
        self.buckets[Self::bucket_for(id)]
            .iter()
            .find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: i32) -> Option<StoredModel> {
        let bucket = &mut self.buckets[Self::bucket_for(id)];
        let position = bucket.iter().position(|m| m.id == id)?;
        self.len -= 1;
        Some(bucket.swap_remove(position))
    }

    /// Drop every stored model. Used at shutdown so key material does
    /// not outlive the serving process.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }
}
