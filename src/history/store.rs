use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::HistoryError;

/// Speaker of one transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message exchange unit. Records are immutable once written; the only
/// ordering signal is append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub role: Role,
    pub content: String,
}

impl TurnRecord {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only per-identity JSONL logs under a single directory.
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name of an identity's log, relative to the store directory.
    pub fn file_name(identity: &str) -> String {
        format!("{identity}.jsonl")
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(Self::file_name(identity))
    }

    /// Append records in order, one JSON line each. Creates the log on first
    /// contact. Local file state only; publication is the publisher's job.
    pub fn append(&self, identity: &str, records: &[TurnRecord]) -> Result<(), HistoryError> {
        let path = self.path_for(identity);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Decode every line of the identity's log in file order. A missing log
    /// is the first-contact case and yields an empty transcript; a malformed
    /// line is an error.
    pub fn read(&self, identity: &str) -> Result<Vec<TurnRecord>, HistoryError> {
        let path = self.path_for(identity);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Delete the identity's log. Absence is not an error.
    pub fn clear(&self, identity: &str) -> Result<(), HistoryError> {
        match fs::remove_file(self.path_for(identity)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Whether a log exists for the identity.
    pub fn exists(&self, identity: &str) -> bool {
        self.path_for(identity).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TranscriptStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn read_of_unknown_identity_is_empty() {
        let (_dir, store) = store();
        assert_eq!(store.read("alice").unwrap(), Vec::new());
        // A read must not create the log as a side effect.
        assert!(!store.exists("alice"));
    }

    #[test]
    fn append_then_read_round_trip_preserves_order() {
        let (_dir, store) = store();
        let first = vec![TurnRecord::user("hello"), TurnRecord::assistant("hi there")];
        let second = vec![TurnRecord::user("again")];
        store.append("alice", &first).unwrap();
        store.append("alice", &second).unwrap();

        let all = store.read("alice").unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[..2], first[..]);
        assert_eq!(all[2], second[0]);
    }

    #[test]
    fn unicode_content_survives_round_trip() {
        let (_dir, store) = store();
        let records = vec![
            TurnRecord::user("Привет, как дела? 🦀"),
            TurnRecord::assistant("日本語のテキスト\nwith a newline"),
        ];
        store.append("дмитрий", &records).unwrap();
        assert_eq!(store.read("дмитрий").unwrap(), records);
    }

    #[test]
    fn clear_then_read_is_empty() {
        let (_dir, store) = store();
        store.append("alice", &[TurnRecord::user("hello")]).unwrap();
        store.clear("alice").unwrap();
        assert_eq!(store.read("alice").unwrap(), Vec::new());
    }

    #[test]
    fn clear_of_missing_log_succeeds() {
        let (_dir, store) = store();
        store.clear("nobody").unwrap();
    }

    #[test]
    fn malformed_line_is_a_decode_error() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("alice.jsonl"), "not json\n").unwrap();
        assert!(matches!(
            store.read("alice"),
            Err(HistoryError::Decode(_))
        ));
    }

    #[test]
    fn identities_are_isolated() {
        let (_dir, store) = store();
        store.append("alice", &[TurnRecord::user("a")]).unwrap();
        store.append("bob", &[TurnRecord::user("b")]).unwrap();
        store.clear("alice").unwrap();
        assert_eq!(store.read("bob").unwrap().len(), 1);
    }
}
