//! Durable storage for the pairing session.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{domain::SessionData, Result};

/// Persists the opaque session bundle to a single JSON file.
///
/// Absent on first run; overwritten wholesale on each authentication. The
/// gateway never deletes it; remove the file out-of-band to force
/// re-pairing.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted session. A missing file and unreadable contents are
    /// both the "no prior session" case, not errors.
    pub fn load(&self) -> Result<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<SessionData>(&txt) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(
                    "stored session at {} is unreadable, ignoring: {e}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Overwrite the persisted session atomically: the payload goes to a
    /// sibling temp file, is flushed to disk, then renamed over the
    /// destination. A concurrent `load` sees either the old or the new value
    /// in full, never a partial write.
    pub fn save(&self, session: &SessionData) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("whatsapp-session.json"))
    }

    #[test]
    fn load_is_absent_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let session = SessionData(json!({"WABrowserId": "abc", "WAToken1": "t1"}));

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));
    }

    #[test]
    fn save_overwrites_the_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&SessionData(json!({"WAToken1": "old"}))).unwrap();
        let newer = SessionData(json!({"WAToken1": "new"}));
        store.save(&newer).unwrap();

        assert_eq!(store.load().unwrap(), Some(newer));
    }

    #[test]
    fn unreadable_contents_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn empty_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&SessionData(json!({"k": "v"}))).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["whatsapp-session.json".to_string()]);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("no-such-dir").join("session.json"));
        assert!(store.save(&SessionData(json!({}))).is_err());
    }
}
