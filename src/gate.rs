use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::{
    snapshot::{Snapshot, SnapshotError, SnapshotKind},
    util,
};

#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("I/O error on hash file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not serialize snapshot")]
    SnapshotError(#[from] SnapshotError),
}

pub fn content_hash(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    let json = snapshot.canonical_json()?;
    Ok(hex::encode(Md5::digest(json.as_bytes())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Content changed; the new hash has been written.
    Changed,
    /// Content unchanged but a stream is about to start.
    Reminder,
    Unchanged,
}

impl Decision {
    pub fn should_send(&self) -> bool {
        !matches!(self, Decision::Unchanged)
    }
}

/// Persisted hash of the last notified snapshot of one kind.
pub struct ChangeGate {
    kind: SnapshotKind,
    path: PathBuf,
}

impl ChangeGate {
    pub fn new(state_dir: &Path, kind: SnapshotKind) -> Self {
        Self {
            kind,
            path: state_dir.join(kind.hash_file()),
        }
    }

    /// Reads the stored hash, creating an empty file when there is none.
    pub async fn previous_hash(&self) -> Result<String, GateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => Ok(s.lines().next().unwrap_or_default().trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating empty hash file {}", self.path.display());
                tokio::fs::write(&self.path, b"").await?;
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Compares `current` with the stored hash. When they differ the new hash
    /// is written before returning, so delivery happens after the state moved
    /// on. `imminent` only matters for the upcoming kind.
    pub async fn evaluate(&self, current: &Snapshot, imminent: usize) -> Result<Decision, GateError> {
        let prev_hash = self.previous_hash().await?;
        let curr_hash = content_hash(current)?;
        debug!("prev_{}_hash: {}", self.kind, prev_hash);
        debug!("curr_{}_hash: {}", self.kind, curr_hash);

        if prev_hash != curr_hash {
            util::write_atomic(&self.path, curr_hash.as_bytes()).await?;
            return Ok(Decision::Changed);
        }

        if self.kind == SnapshotKind::Upcoming && imminent > 0 {
            return Ok(Decision::Reminder);
        }

        Ok(Decision::Unchanged)
    }
}
