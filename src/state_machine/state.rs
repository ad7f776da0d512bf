use std::fmt;

use serde::{Deserialize, Serialize};

/// The states of the job lifecycle.
///
/// A job flows forward through:
/// INIT → VALIDATING → PARSING → PREPARING → LOADING_MODEL → CONVERTING
/// → FINISHED_OK. Any non-terminal state may divert to CANCELLING (which
/// always resolves to CANCELLED) or to FINISHED_ERROR. Terminal states
/// are absorbing.
///
/// CANCELLING and CANCELLED model the interrupt path. That path
/// terminates the process out-of-band from the signal thread, which has
/// no access to the live job, so at runtime these states are never
/// observed on a `Job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Init,
    Validating,
    Parsing,
    Preparing,
    LoadingModel,
    Converting,
    Cancelling,
    FinishedOk,
    FinishedError,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Init => "INIT",
            JobState::Validating => "VALIDATING",
            JobState::Parsing => "PARSING",
            JobState::Preparing => "PREPARING",
            JobState::LoadingModel => "LOADING_MODEL",
            JobState::Converting => "CONVERTING",
            JobState::Cancelling => "CANCELLING",
            JobState::FinishedOk => "FINISHED_OK",
            JobState::FinishedError => "FINISHED_ERROR",
            JobState::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

impl JobState {
    /// A terminal state permits no further transitions or engine calls.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::FinishedOk | JobState::FinishedError | JobState::Cancelled
        )
    }

    /// The next state on the happy path, if any.
    pub fn successor(&self) -> Option<JobState> {
        match self {
            JobState::Init => Some(JobState::Validating),
            JobState::Validating => Some(JobState::Parsing),
            JobState::Parsing => Some(JobState::Preparing),
            JobState::Preparing => Some(JobState::LoadingModel),
            JobState::LoadingModel => Some(JobState::Converting),
            JobState::Converting => Some(JobState::FinishedOk),
            JobState::Cancelling => Some(JobState::Cancelled),
            JobState::FinishedOk | JobState::FinishedError | JobState::Cancelled => None,
        }
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Transitions are strictly forward, except that any non-terminal state
    /// may move to `Cancelling` or `FinishedError`; `Cancelling` resolves
    /// only to `Cancelled`.
    pub fn can_transition(&self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == JobState::Cancelling {
            return to == JobState::Cancelled;
        }
        match to {
            JobState::Cancelling | JobState::FinishedError => true,
            _ => self.successor() == Some(to),
        }
    }

    /// Process exit status for a terminal state. Only a clean
    /// `FINISHED_OK` maps to success.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobState::FinishedOk => 0,
            _ => 1,
        }
    }
}
