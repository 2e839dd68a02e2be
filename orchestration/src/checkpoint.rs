//! Checkpoint/resume: per-problem completion records.
//!
//! The orchestrator asks `is_complete` before starting a problem and calls
//! `persist` once the problem reaches a terminal phase. The store is a
//! trait so the backend is swappable without touching orchestration logic;
//! the filesystem implementation writes through a temp file and renames,
//! so a partially written transcript is never visible as complete.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::transcript::Transcript;

/// Error from transcript persistence.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("serialize failed for problem {problem_id}: {reason}")]
    Serialize { problem_id: u32, reason: String },
    #[error("write failed for problem {problem_id}: {source}")]
    Write {
        problem_id: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Per-problem completion state, keyed by problem id.
pub trait CheckpointStore: Send + Sync {
    /// Whether a complete transcript exists for this problem.
    fn is_complete(&self, problem_id: u32) -> bool;

    /// Persist a terminal transcript, all-or-nothing.
    fn persist(&self, transcript: &Transcript) -> Result<(), CheckpointError>;

    /// Load a persisted transcript, if one exists and parses.
    fn load(&self, problem_id: u32) -> Option<Transcript>;

    /// Ids of all completed problems, ascending.
    fn completed_ids(&self) -> Vec<u32>;
}

/// Filesystem store: one `problem_{id}.json` per transcript.
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, problem_id: u32) -> PathBuf {
        self.dir.join(format!("problem_{problem_id}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn is_complete(&self, problem_id: u32) -> bool {
        self.path_for(problem_id).exists()
    }

    fn persist(&self, transcript: &Transcript) -> Result<(), CheckpointError> {
        let problem_id = transcript.problem.id;
        let json = serde_json::to_string_pretty(transcript).map_err(|e| {
            CheckpointError::Serialize {
                problem_id,
                reason: e.to_string(),
            }
        })?;

        // Temp-file-then-rename: the final path only ever holds a complete
        // transcript.
        let tmp = self.dir.join(format!("problem_{problem_id}.json.tmp"));
        let write = |path: &Path| -> std::io::Result<()> {
            let mut file = fs::File::create(path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write(&tmp)
            .and_then(|()| fs::rename(&tmp, self.path_for(problem_id)))
            .map_err(|source| {
                let _ = fs::remove_file(&tmp);
                CheckpointError::Write { problem_id, source }
            })
    }

    fn load(&self, problem_id: u32) -> Option<Transcript> {
        let text = fs::read_to_string(self.path_for(problem_id)).ok()?;
        match serde_json::from_str(&text) {
            Ok(transcript) => Some(transcript),
            Err(e) => {
                warn!(problem = problem_id, error = %e, "unreadable transcript file");
                None
            }
        }
    }

    fn completed_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_prefix("problem_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    transcripts: Mutex<HashMap<u32, Transcript>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn is_complete(&self, problem_id: u32) -> bool {
        self.transcripts.lock().unwrap().contains_key(&problem_id)
    }

    fn persist(&self, transcript: &Transcript) -> Result<(), CheckpointError> {
        self.transcripts
            .lock()
            .unwrap()
            .insert(transcript.problem.id, transcript.clone());
        Ok(())
    }

    fn load(&self, problem_id: u32) -> Option<Transcript> {
        self.transcripts.lock().unwrap().get(&problem_id).cloned()
    }

    fn completed_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.transcripts.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
