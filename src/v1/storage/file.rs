use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::v1::datastore::{DatastoreError, Storage};

pub const DEFAULT_STORE: &str = "rsvend.store";

/// Bincode-encoded store file. Saves go through a sibling temp file so an
/// interrupted write never truncates the previous state.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_STORE)
    }
}
impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileStorage { path: path.into() }
    }
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        Ok(if self.path.exists() {
            let file = File::open(&self.path)?;
            bincode::deserialize_from(BufReader::new(file))?
        } else {
            HashMap::new()
        })
    }
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError> {
        let temp = self.temp_path();
        let mut writer = BufWriter::new(File::create(&temp)?);
        bincode::serialize_into(&mut writer, data)?;
        writer.flush()?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.store"));
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsvend.store");
        let storage = FileStorage::new(&path);

        let mut data = HashMap::new();
        data.insert("sandbox".to_string(), b"{}".to_vec());
        storage.save(&data).unwrap();
        data.remove("sandbox");
        data.insert("prod".to_string(), vec![1, 2, 3]);
        storage.save(&data).unwrap();

        assert_eq!(storage.load().unwrap(), data);
        assert!(!dir.path().join("rsvend.store.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsvend.store");
        fs::write(&path, [0xff; 3]).unwrap();
        assert!(FileStorage::new(path).load().is_err());
    }
}
