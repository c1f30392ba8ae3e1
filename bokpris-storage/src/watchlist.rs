//! Watchlist file: one identifier per line, append-only

use bokpris_core::{Isbn, PersistenceError};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identifiers under daily monitoring.
///
/// Membership is checked before appending, so each identifier appears once.
#[derive(Debug)]
pub struct WatchlistFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl WatchlistFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Members in file order. Blank and invalid lines are skipped.
    pub fn members(&self) -> Result<Vec<Isbn>, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(self.load()?.0)
    }

    pub fn contains(&self, isbn: &Isbn) -> Result<bool, PersistenceError> {
        Ok(self.members()?.contains(isbn))
    }

    /// Append `isbn` unless already listed. Returns whether it was added.
    pub fn add(&self, isbn: &Isbn) -> Result<bool, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        let (members, ends_with_newline) = self.load()?;
        if members.contains(isbn) {
            return Ok(false);
        }

        let mut line = String::new();
        if !ends_with_newline {
            line.push('\n');
        }
        line.push_str(isbn.as_str());
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, &e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, &e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| PersistenceError::io(&self.path, &e))?;

        tracing::info!(isbn = %isbn, "Added to watchlist");
        Ok(true)
    }

    /// Members plus whether the file is empty or ends with a newline.
    fn load(&self) -> Result<(Vec<Isbn>, bool), PersistenceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((Vec::new(), true)),
            Err(e) => return Err(PersistenceError::io(&self.path, &e)),
        };

        let mut members: Vec<Isbn> = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match Isbn::parse(line) {
                Ok(isbn) if !members.contains(&isbn) => members.push(isbn),
                Ok(_) => {}
                Err(e) => tracing::warn!(line, error = %e, "Skipping invalid watchlist entry"),
            }
        }
        Ok((members, text.is_empty() || text.ends_with('\n')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isbn(s: &str) -> Isbn {
        Isbn::parse(s).unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let watchlist = WatchlistFile::new(dir.path().join("bevakade_isbn.txt"));

        assert!(watchlist.add(&isbn("9789144156798")).unwrap());
        assert!(!watchlist.add(&isbn("978-91-44-15679-8")).unwrap());
        assert!(watchlist.add(&isbn("9780262046305")).unwrap());

        assert_eq!(
            watchlist.members().unwrap(),
            vec![isbn("9789144156798"), isbn("9780262046305")]
        );
        let text = std::fs::read_to_string(watchlist.path()).unwrap();
        assert_eq!(text, "9789144156798\n9780262046305\n");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let watchlist = WatchlistFile::new(dir.path().join("none.txt"));
        assert!(watchlist.members().unwrap().is_empty());
        assert!(!watchlist.contains(&isbn("9789144156798")).unwrap());
    }

    #[test]
    fn test_hand_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bevakade_isbn.txt");
        std::fs::write(&path, "978-91-44-15679-8\n\nnot-an-isbn\n9789144156798").unwrap();
        let watchlist = WatchlistFile::new(&path);

        assert_eq!(watchlist.members().unwrap(), vec![isbn("9789144156798")]);
        assert!(watchlist.add(&isbn("9780262046305")).unwrap());
        assert_eq!(watchlist.members().unwrap().len(), 2);
    }
}
