use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{Cred, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks, Repository, Signature};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::HistoryError;
use super::store::TranscriptStore;

const COMMIT_NAME: &str = "gitscribe";
const COMMIT_EMAIL: &str = "gitscribe@localhost";

/// Process-wide handle on the transcript repository working copy.
///
/// Every transcript mutation becomes exactly one commit pushed to `origin`
/// before the mutation is considered complete. There is no retry policy and
/// no queue of unpublished revisions: a failed push propagates to the caller
/// and the working copy is left ahead of the remote.
pub struct GitPublisher {
    // git2 repository handles are Send but not Sync; the mutex serializes
    // the git operations themselves, not the surrounding read-append-publish
    // sequence (concurrent messages from one identity can still race).
    repo: Mutex<Repository>,
    token: String,
}

impl GitPublisher {
    /// Clone the remote into `dir` if no working copy exists there yet,
    /// otherwise open the existing one. Startup precondition: an unreachable
    /// remote or rejected credentials fail construction.
    pub fn clone_or_open(remote_url: &str, token: &str, dir: &Path) -> Result<Self, HistoryError> {
        let repo = if dir.join(".git").exists() {
            info!("Opening existing transcript working copy at {}", dir.display());
            Repository::open(dir)?
        } else {
            info!("Cloning transcript repository into {}", dir.display());
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(auth_callbacks(token.to_string()));
            RepoBuilder::new()
                .fetch_options(fetch)
                .clone(&embed_token(remote_url, token), dir)?
        };
        Ok(Self {
            repo: Mutex::new(repo),
            token: token.to_string(),
        })
    }

    /// Stage exactly the file that was appended to, commit `update <identity>`
    /// and push. Blocking from the caller's perspective: nothing that depends
    /// on the new state may proceed before the push has been observed.
    pub fn publish_append(&self, identity: &str) -> Result<(), HistoryError> {
        let repo = self.repo.lock();
        let rel = PathBuf::from(TranscriptStore::file_name(identity));
        let mut index = repo.index()?;
        index.add_path(&rel)?;
        index.write()?;
        commit(&repo, &format!("update {identity}"))?;
        self.push(&repo)?;
        debug!("Published append for {identity}");
        Ok(())
    }

    /// Publish the deletion of an identity's log. The deletion is explicitly
    /// staged when the log was tracked; clearing an identity that never
    /// reached the index still produces (and pushes) a marker revision.
    pub fn publish_clear(&self, identity: &str) -> Result<(), HistoryError> {
        let repo = self.repo.lock();
        let rel = PathBuf::from(TranscriptStore::file_name(identity));
        let mut index = repo.index()?;
        if index.get_path(&rel, 0).is_some() {
            index.remove_path(&rel)?;
            index.write()?;
        }
        commit(&repo, &format!("{identity}: history cleared"))?;
        self.push(&repo)?;
        debug!("Published clear for {identity}");
        Ok(())
    }

    fn push(&self, repo: &Repository) -> Result<(), git2::Error> {
        let head = repo.find_reference("HEAD")?;
        let target = head.symbolic_target().unwrap_or("refs/heads/master");
        let refspec = format!("{target}:{target}");
        let mut remote = repo.find_remote("origin")?;
        let mut opts = PushOptions::new();
        opts.remote_callbacks(auth_callbacks(self.token.clone()));
        remote.push(&[refspec.as_str()], Some(&mut opts))
    }
}

/// Fold the bearer token into an HTTPS remote URL as its userinfo part.
/// Non-HTTPS remotes (local paths in tests) are left untouched.
fn embed_token(url: &str, token: &str) -> String {
    if token.is_empty() {
        return url.to_string();
    }
    url.replacen("https://", &format!("https://{token}@"), 1)
}

fn auth_callbacks(token: String) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| {
        Cred::userpass_plaintext(username_from_url.unwrap_or(&token), "")
    });
    callbacks
}

/// Commit the current index onto HEAD. Handles the unborn-HEAD case of a
/// freshly cloned empty remote by creating a root commit.
fn commit(repo: &Repository, message: &str) -> Result<(), git2::Error> {
    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now(COMMIT_NAME, COMMIT_EMAIL)?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(err) if err.code() == ErrorCode::UnbornBranch || err.code() == ErrorCode::NotFound => {
            None
        }
        Err(err) => return Err(err),
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(())
}
