use std::io;
use std::path::PathBuf;

use serde_json::{Map, Value};

/// Key under which the session token is persisted
pub const TOKEN_KEY: &str = "jwt";

/// Where the client keeps its bearer token between calls.
/// A blank or absent token means logged out.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> io::Result<Option<String>>;
    fn store_token(&self, token: &str) -> io::Result<()>;
    fn clear_token(&self) -> io::Result<()>;
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|token| !token.trim().is_empty())
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    token: parking_lot::RwLock<Option<String>>,
}

impl TokenStore for InMemoryTokenStore {
    fn token(&self) -> io::Result<Option<String>> {
        Ok(non_blank(self.token.read().clone()))
    }

    fn store_token(&self, token: &str) -> io::Result<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> io::Result<()> {
        *self.token.write() = None;
        Ok(())
    }
}

/// Keeps the token in a JSON key/value file, next to whatever other keys the file holds
pub struct FileTokenStore {
    path: PathBuf,
    // serializes read-modify-write cycles of this process
    lock: parking_lot::Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: parking_lot::Mutex::new(()),
        }
    }

    fn read_entries(&self) -> io::Result<Map<String, Value>> {
        match std::fs::read(&self.path) {
            Ok(content) if content.is_empty() => Ok(Map::new()),
            Ok(content) => serde_json::from_slice(&content).map_err(io::Error::from),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err),
        }
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> io::Result<()> {
        let content = serde_json::to_vec_pretty(entries).map_err(io::Error::from)?;
        std::fs::write(&self.path, content)
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> io::Result<Option<String>> {
        let _guard = self.lock.lock();
        let entries = self.read_entries()?;
        Ok(non_blank(
            entries
                .get(TOKEN_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
        ))
    }

    fn store_token(&self, token: &str) -> io::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write_entries(&entries)
    }

    fn clear_token(&self) -> io::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(TOKEN_KEY).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}
