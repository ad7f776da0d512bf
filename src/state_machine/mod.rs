mod job;
mod state;

pub use job::{Chapter, Job, JobRequest, JobSummary, ParsedContent};
pub use state::JobState;
