//! Job Lifecycle Controller.
//!
//! Owns the state machine and sequences validation, parsing, artifact
//! preparation, engine construction, the blocking conversion, and
//! finalization. Every stage returns a `Result`; nothing in here
//! terminates the process — the entry point maps the final outcome to an
//! exit status.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::engine::{ConversionEvents, EngineFactory, EngineSpec, OutcomeSlot, SynthesisEngine};
use crate::error::JobError;
use crate::parser::BookParser;
use crate::resources::ResourceManager;
use crate::state_machine::{Job, JobRequest, JobState, JobSummary, ParsedContent};

/// Shared per-job context: the engine-handle slot the interrupt handler
/// reads. The handle is `None` before engine construction and after the
/// blocking call returns.
#[derive(Default)]
pub struct JobContext {
    engine: Mutex<Option<Arc<dyn SynthesisEngine>>>,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, engine: Arc<dyn SynthesisEngine>) {
        if let Ok(mut slot) = self.engine.lock() {
            *slot = Some(engine);
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.engine.lock() {
            *slot = None;
        }
    }

    /// Request cancellation of the live engine, if any. Returns whether a
    /// live handle was cancelled; an absent handle is a safe no-op.
    pub fn cancel_engine(&self) -> bool {
        let handle = match self.engine.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match handle {
            Some(engine) => {
                engine.cancel();
                true
            }
            None => false,
        }
    }
}

/// The external collaborators and shared state one job is wired with.
pub struct Collaborators {
    pub parser: Box<dyn BookParser>,
    pub factory: Box<dyn EngineFactory>,
    pub events: Arc<dyn ConversionEvents>,
    pub outcome: Arc<OutcomeSlot>,
    pub resources: Arc<ResourceManager>,
    pub ctx: Arc<JobContext>,
}

/// Drives exactly one job from INIT to a terminal state.
pub struct JobController {
    request: JobRequest,
    parser: Box<dyn BookParser>,
    factory: Box<dyn EngineFactory>,
    events: Arc<dyn ConversionEvents>,
    outcome: Arc<OutcomeSlot>,
    resources: Arc<ResourceManager>,
    ctx: Arc<JobContext>,
    config: Config,
    job: Job,
    chapters: usize,
    characters: usize,
}

impl JobController {
    pub fn new(request: JobRequest, collaborators: Collaborators, config: Config) -> Self {
        let job = Job::new(request.input.clone());
        Self {
            request,
            parser: collaborators.parser,
            factory: collaborators.factory,
            events: collaborators.events,
            outcome: collaborators.outcome,
            resources: collaborators.resources,
            ctx: collaborators.ctx,
            config,
            job,
            chapters: 0,
            characters: 0,
        }
    }

    /// Run the job end to end. Resources are released exactly once on
    /// every terminal path; the summary carries the terminal state.
    pub fn run(&mut self) -> Result<JobSummary, JobError> {
        match self.execute() {
            Ok(()) => {
                self.finalize(JobState::FinishedOk)?;
                Ok(JobSummary::from_job(&self.job, self.chapters, self.characters))
            }
            Err(e) => {
                // Best effort: the terminal transition cannot fail here
                // (FINISHED_ERROR is reachable from any active state),
                // and release must not mask the original error.
                let _ = self.finalize(JobState::FinishedError);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<(), JobError> {
        self.job.transition(JobState::Validating)?;
        self.validate()?;

        self.job.transition(JobState::Parsing)?;
        self.events
            .on_log(format!("Processing: {}", self.request.input.display()).into());
        let (content, formatted) = self.parse()?;
        self.chapters = content.chapter_count();
        self.characters = content.total_chars();
        self.events.on_log(
            format!(
                "Found {} chapters, {} characters.",
                self.chapters, self.characters
            )
            .into(),
        );

        self.job.transition(JobState::Preparing)?;
        let artifact = self.prepare(&formatted)?;
        self.events.on_log(
            format!(
                "Prepared temporary processing file: {}",
                artifact.display()
            )
            .into(),
        );

        self.job.transition(JobState::LoadingModel)?;
        self.events.on_log("Loading AI models...".into());
        let engine = self
            .factory
            .build(self.engine_spec(artifact), self.events.clone())
            .map_err(|e| JobError::EngineStartup(e.to_string()))?;
        self.ctx.publish(engine.clone());

        self.job.transition(JobState::Converting)?;
        self.convert(engine)
    }

    /// Check the input exists and the output directory is usable,
    /// creating the latter if absent.
    fn validate(&self) -> Result<(), JobError> {
        if !self.request.input.exists() {
            return Err(JobError::InputNotFound(self.request.input.clone()));
        }
        std::fs::create_dir_all(&self.request.output_dir).map_err(|source| {
            JobError::OutputUnavailable {
                path: self.request.output_dir.clone(),
                source,
            }
        })?;
        Ok(())
    }

    fn parse(&mut self) -> Result<(ParsedContent, String), JobError> {
        let content = self
            .parser
            .process_content()
            .map_err(|e| JobError::Parse(e.to_string()))?;
        let formatted = self.parser.formatted_text();
        Ok((content, formatted))
    }

    fn prepare(&self, formatted: &str) -> Result<PathBuf, JobError> {
        self.resources.acquire_artifact(formatted)
    }

    /// Block on the engine. Sleep inhibition spans exactly this phase and
    /// is released on every exit path; the finished callback's report is
    /// the sole authority on success.
    fn convert(&mut self, engine: Arc<dyn SynthesisEngine>) -> Result<(), JobError> {
        self.resources.acquire_sleep_inhibition();
        let run_result = engine.run();
        self.ctx.clear();
        self.resources.release_sleep_inhibition();

        run_result.map_err(|e| JobError::Internal(e.to_string()))?;
        match self.outcome.take() {
            Some(outcome) if outcome.succeeded() => Ok(()),
            _ => Err(JobError::EngineFailure),
        }
    }

    /// Enter the terminal state and release everything exactly once.
    fn finalize(&mut self, terminal: JobState) -> Result<(), JobError> {
        self.job.transition(terminal)?;
        self.resources.release_all();
        Ok(())
    }

    fn engine_spec(&self, artifact: PathBuf) -> EngineSpec {
        EngineSpec {
            artifact_path: artifact,
            output_folder: self.request.output_dir.clone(),
            voice: self.request.voice.clone(),
            lang_code: self.request.lang.clone(),
            speed: self.request.speed,
            output_format: self.config.output_format.clone(),
            save_option: self.config.save_option.clone(),
            subtitle_mode: self.config.subtitle_mode.clone(),
            total_char_count: self.characters,
            use_gpu: self.config.use_gpu,
            source_path: self.request.input.clone(),
        }
    }
}
