mod publisher;
mod store;

pub use publisher::GitPublisher;
pub use store::{Role, TranscriptStore, TurnRecord};

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed transcript record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Read/append/clear access to per-identity transcripts. Every mutation is
/// pushed to the Git remote before it returns; if publishing fails after a
/// successful local write, the working copy is left ahead of the remote and
/// the error propagates as-is.
pub struct History {
    store: TranscriptStore,
    publisher: GitPublisher,
}

impl History {
    /// Clone-or-open the transcript repository. This is the one fatal startup
    /// precondition of the whole process.
    pub fn open(remote_url: &str, token: &str, dir: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let dir = dir.as_ref();
        let publisher = GitPublisher::clone_or_open(remote_url, token, dir)?;
        Ok(Self {
            store: TranscriptStore::new(dir),
            publisher,
        })
    }

    /// Full replay of an identity's transcript, oldest first.
    pub fn load(&self, identity: &str) -> Result<Vec<TurnRecord>, HistoryError> {
        self.store.read(identity)
    }

    /// Append the records, then publish the touched log unconditionally.
    pub fn save(&self, identity: &str, records: &[TurnRecord]) -> Result<(), HistoryError> {
        self.store.append(identity, records)?;
        self.publisher.publish_append(identity)
    }

    /// Delete the identity's log, then publish the deletion unconditionally.
    pub fn clear(&self, identity: &str) -> Result<(), HistoryError> {
        self.store.clear(identity)?;
        self.publisher.publish_clear(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;

    fn open_history() -> (tempfile::TempDir, String, History) {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote_path = dir.path().join("remote.git");
        Repository::init_bare(&remote_path).expect("init bare remote");
        let remote = remote_path.to_string_lossy().into_owned();
        let history = History::open(&remote, "", dir.path().join("clone")).unwrap();
        (dir, remote, history)
    }

    fn remote_commit_count(remote_url: &str) -> usize {
        let remote = Repository::open(remote_url).unwrap();
        let mut walk = remote.revwalk().unwrap();
        walk.push_head().unwrap();
        walk.count()
    }

    #[test]
    fn save_then_load_replays_the_exchange() {
        let (_dir, remote, history) = open_history();

        let exchange = vec![TurnRecord::user("hello"), TurnRecord::assistant("hi alice")];
        history.save("alice", &exchange).unwrap();

        assert_eq!(history.load("alice").unwrap(), exchange);
        assert_eq!(remote_commit_count(&remote), 1);
    }

    #[test]
    fn each_save_is_exactly_one_remote_revision() {
        let (_dir, remote, history) = open_history();

        history.save("alice", &[TurnRecord::user("one")]).unwrap();
        history.save("alice", &[TurnRecord::user("two")]).unwrap();

        assert_eq!(remote_commit_count(&remote), 2);
        assert_eq!(history.load("alice").unwrap().len(), 2);
    }

    #[test]
    fn clear_empties_the_transcript_and_publishes() {
        let (_dir, remote, history) = open_history();

        history
            .save("alice", &[TurnRecord::user("hello"), TurnRecord::assistant("hi")])
            .unwrap();
        history.clear("alice").unwrap();

        assert_eq!(history.load("alice").unwrap(), Vec::new());
        assert_eq!(remote_commit_count(&remote), 2);

        let remote_repo = Repository::open(&remote).unwrap();
        let summary = remote_repo
            .head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .summary()
            .unwrap_or("")
            .to_string();
        assert_eq!(summary, "alice: history cleared");
    }

    #[test]
    fn load_of_unknown_identity_is_empty_and_has_no_side_effects() {
        let (_dir, remote, history) = open_history();

        assert_eq!(history.load("mallory").unwrap(), Vec::new());
        // No revision may exist: nothing was ever published.
        let remote_repo = Repository::open(&remote).unwrap();
        assert!(remote_repo.head().is_err());
    }
}
