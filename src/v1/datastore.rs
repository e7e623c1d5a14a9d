use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::storage::file::FileStorage;

/// Resource records keyed by name, JSON-encoded, flushed to a [`Storage`] on save.
#[derive(Clone)]
pub struct Datastore {
    inner: HashMap<String, Vec<u8>>,
    storage: Arc<dyn Storage + Send + Sync>,
}
impl Default for Datastore {
    fn default() -> Self {
        Datastore::new(FileStorage::default())
    }
}
pub trait Storage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError>;
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError>;
}

impl Datastore {
    pub fn new(storage: impl Storage + 'static + Send + Sync) -> Self {
        Self {
            inner: Default::default(),
            storage: Arc::new(storage),
        }
    }
    /// Replaces the in-memory records with what the storage holds.
    pub fn reload(&mut self) -> Result<(), DatastoreError> {
        let data = self
            .storage
            .load()
            .map_err(|e| DatastoreError::LoadError(e.to_string()))?;
        for k in data.keys() {
            debug!(resource = %k, "loaded from datastore");
        }
        self.inner = data;
        Ok(())
    }
    pub fn save(&self) -> Result<(), DatastoreError> {
        debug!(resources = self.inner.len(), "saving datastore");
        self.storage.save(&self.inner)
    }
    pub fn insert<T: Serialize>(
        &mut self,
        id: impl Into<String>,
        value: &T,
    ) -> Result<Option<Vec<u8>>, DatastoreError> {
        let id = id.into();
        let bytes = serde_json::to_vec(value)?;
        debug!(resource = %id, "insert into datastore");
        Ok(self.inner.insert(id, bytes))
    }
    pub fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, DatastoreError> {
        self.inner
            .get(id)
            .map(|data| serde_json::from_slice(data).map_err(DatastoreError::JsonError))
            .transpose()
    }
    pub fn remove(&mut self, id: &str) -> Option<Vec<u8>> {
        debug!(resource = %id, "remove from datastore");
        self.inner.remove(id)
    }
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("Load Error error: {0}")]
    LoadError(String),
    #[error("IO Error error: {0}")]
    IOError(#[from] io::Error),
    #[error("Serialization or deserialization error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("Serialization or deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}
