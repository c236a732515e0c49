//! JSON artifact I/O with crash-safe writes.
//!
//! Writes go to a hidden `.<name>.tmp` sibling that is renamed over the
//! target, so readers never observe a half-written artifact.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Hidden temporary sibling used while writing `path`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `bytes` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    if let Err(e) = std::fs::write(&staging, bytes) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    std::fs::rename(&staging, path)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let mut json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Read a JSON document. A missing file is `Ok(None)`; malformed JSON is
/// `ErrorKind::InvalidData`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ledger {
        items: Vec<String>,
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("r1").join("ledger.json");
        let ledger = Ledger {
            items: vec!["ev_1".into(), "ev_2".into()],
        };
        write_json_atomic(&path, &ledger).unwrap();
        assert_eq!(read_json::<Ledger>(&path).unwrap(), Some(ledger));
        assert!(!dir.path().join("runs/r1/.ledger.json.tmp").exists());
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        write_json_atomic(&path, &Ledger { items: vec!["a".into()] }).unwrap();
        write_json_atomic(&path, &Ledger { items: vec![] }).unwrap();
        let loaded: Ledger = read_json(&path).unwrap().unwrap();
        assert!(loaded.items.is_empty());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Ledger> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_malformed_json_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        write_atomic(&path, b"{not json").unwrap();
        let err = read_json::<Ledger>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
