use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use storewatch_common::StoreId;
use tracing::warn;

use crate::error::{Result, ServerError};

const DEFAULT_KEY: &str = "default";

/// `store_id -> [email, ...]` mapping loaded from a JSON file, with a
/// `"default"` entry used for stores that have no specific entry.
/// Hot-reloadable via `POST /config/reload`.
pub struct RecipientDirectory {
    path: PathBuf,
    map: RwLock<HashMap<String, Vec<String>>>,
}

impl RecipientDirectory {
    /// Loads `path`, tolerating a missing file (empty directory, every
    /// alert persists without notification until the file is created).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = Self::read(&path)?;
        Ok(Self {
            path,
            map: RwLock::new(map),
        })
    }

    fn read(path: &PathBuf) -> Result<HashMap<String, Vec<String>>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| ServerError::Config(format!("invalid recipients file {path:?}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = ?path, "recipients file not found, starting with an empty directory");
                Ok(HashMap::new())
            }
            Err(e) => Err(ServerError::Config(format!("reading {path:?}: {e}"))),
        }
    }

    pub fn reload(&self) -> Result<()> {
        let fresh = Self::read(&self.path)?;
        *self.map.write().unwrap() = fresh;
        Ok(())
    }

    pub fn recipients_for(&self, store_id: &StoreId) -> Vec<String> {
        let map = self.map.read().unwrap();
        map.get(store_id.as_str())
            .or_else(|| map.get(DEFAULT_KEY))
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.map.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_directory() {
        let dir = RecipientDirectory::load("/nonexistent/path/recipients.json").unwrap();
        assert!(dir.recipients_for(&StoreId::new("store-1")).is_empty());
    }

    #[test]
    fn falls_back_to_default_entry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default": ["ops@example.com"]}}"#).unwrap();

        let dir = RecipientDirectory::load(file.path()).unwrap();
        assert_eq!(
            dir.recipients_for(&StoreId::new("store-1")),
            vec!["ops@example.com".to_string()]
        );
    }

    #[test]
    fn store_specific_entry_wins_over_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"default": ["ops@example.com"], "store-1": ["store1@example.com"]}}"#
        )
        .unwrap();

        let dir = RecipientDirectory::load(file.path()).unwrap();
        assert_eq!(
            dir.recipients_for(&StoreId::new("store-1")),
            vec!["store1@example.com".to_string()]
        );
    }

    #[test]
    fn reload_picks_up_changed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default": ["a@example.com"]}}"#).unwrap();

        let dir = RecipientDirectory::load(file.path()).unwrap();
        assert_eq!(dir.recipients_for(&StoreId::new("x")), vec!["a@example.com"]);

        let mut file = std::fs::File::create(dir.path.clone()).unwrap();
        write!(file, r#"{{"default": ["b@example.com"]}}"#).unwrap();
        dir.reload().unwrap();

        assert_eq!(dir.recipients_for(&StoreId::new("x")), vec!["b@example.com"]);
    }
}
