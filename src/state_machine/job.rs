use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobState;
use crate::error::JobError;

/// One end-to-end request to convert one input document into one audio
/// artifact. Immutable once constructed; validated before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub voice: String,
    pub lang: String,
    pub speed: f32,
}

/// A single chapter extracted from the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub text: String,
}

/// The parser's output: ordered chapters plus per-chapter character
/// counts. Produced once, read-only afterward.
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub chapters: Vec<Chapter>,
    pub lengths: BTreeMap<String, usize>,
}

impl ParsedContent {
    pub fn new(chapters: Vec<Chapter>) -> Self {
        let lengths = chapters
            .iter()
            .map(|c| (c.id.clone(), c.text.chars().count()))
            .collect();
        Self { chapters, lengths }
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn total_chars(&self) -> usize {
        self.lengths.values().sum()
    }
}

/// The live job: current state plus the transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input: PathBuf,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(input: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            state: JobState::Init,
            state_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the job to `to`, enforcing the transition rules.
    pub fn transition(&mut self, to: JobState) -> Result<(), JobError> {
        if !self.state.can_transition(to) {
            return Err(JobError::Internal(format!(
                "illegal state transition {} -> {to}",
                self.state
            )));
        }
        self.state_history.push(self.state);
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Structured record of a completed job, printed with `--verbose`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub input: PathBuf,
    pub terminal_state: JobState,
    pub state_transitions: Vec<JobState>,
    pub chapters: usize,
    pub characters: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobSummary {
    /// Build a summary from a job that has reached a terminal state.
    pub fn from_job(job: &Job, chapters: usize, characters: usize) -> Self {
        let now = Utc::now();
        let duration = now - job.created_at;
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        Self {
            job_id: job.id.clone(),
            input: job.input.clone(),
            terminal_state: job.state,
            state_transitions: transitions,
            chapters,
            characters,
            started_at: job.created_at,
            completed_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }
}
