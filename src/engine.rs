//! Speech-synthesis seam.
//!
//! The conversion itself is an external collaborator. The controller talks
//! to it through three narrow traits: [`EngineFactory`] (construction,
//! which covers model loading), [`SynthesisEngine`] (blocking `run` plus
//! cooperative `cancel`), and [`ConversionEvents`] (log/progress/finished
//! callbacks delivered while `run` blocks).
//!
//! [`CommandEngine`] is the built-in implementation: it spawns a
//! configured backend command and forwards its newline-delimited JSON
//! events to the adapter.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// A log message emitted by the engine: plain text, or text with an
/// auxiliary detail the renderer ignores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Plain(String),
    WithDetail { message: String, detail: String },
}

impl LogLine {
    /// The primary text, which is all the adapter renders.
    pub fn text(&self) -> &str {
        match self {
            LogLine::Plain(message) => message,
            LogLine::WithDetail { message, .. } => message,
        }
    }
}

impl From<String> for LogLine {
    fn from(message: String) -> Self {
        LogLine::Plain(message)
    }
}

impl From<&str> for LogLine {
    fn from(message: &str) -> Self {
        LogLine::Plain(message.to_string())
    }
}

/// Callbacks the engine drives during a blocking `run`.
///
/// Implementations must never panic: a rendering failure must not abort
/// an in-progress conversion.
pub trait ConversionEvents: Send + Sync {
    fn on_log(&self, line: LogLine);

    /// Progress is not guaranteed monotonic; render whatever arrives.
    fn on_progress(&self, percent: u8, etr: Option<String>);

    /// Invoked exactly once per job. An empty or absent `output_path`
    /// signals failure; this is the sole authoritative success signal.
    fn on_finished(&self, message: String, output_path: Option<PathBuf>);
}

/// Terminal report from the finished callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub message: String,
    pub output_path: Option<PathBuf>,
}

impl ConversionOutcome {
    pub fn succeeded(&self) -> bool {
        self.output_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }
}

/// Shared slot the finished callback fills and the controller reads after
/// the engine's blocking call returns. Only the first report is kept.
#[derive(Debug, Default)]
pub struct OutcomeSlot(Mutex<Option<ConversionOutcome>>);

impl OutcomeSlot {
    pub fn record(&self, outcome: ConversionOutcome) {
        if let Ok(mut slot) = self.0.lock()
            && slot.is_none()
        {
            *slot = Some(outcome);
        }
    }

    pub fn take(&self) -> Option<ConversionOutcome> {
        self.0.lock().ok()?.take()
    }
}

/// Everything the engine needs for one conversion.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    /// Path to the temporary artifact holding the formatted text.
    pub artifact_path: PathBuf,
    pub output_folder: PathBuf,
    pub voice: String,
    pub lang_code: String,
    pub speed: f32,
    pub output_format: String,
    pub save_option: String,
    pub subtitle_mode: String,
    pub total_char_count: usize,
    pub use_gpu: bool,
    /// The original source document, used by the backend for naming.
    pub source_path: PathBuf,
}

/// A running conversion. `run` blocks the calling thread and drives the
/// callbacks; `cancel` is cooperative and safe before, during, or after
/// `run`, and idempotent.
pub trait SynthesisEngine: Send + Sync {
    fn run(&self) -> Result<()>;
    fn cancel(&self);
}

/// Builds an engine for one job. Construction covers backend/model
/// loading; a failure here is an unrecoverable startup error.
pub trait EngineFactory: Send {
    fn build(
        &self,
        spec: EngineSpec,
        events: Arc<dyn ConversionEvents>,
    ) -> Result<Arc<dyn SynthesisEngine>>;
}

/// One event on the backend's stdout, one JSON object per line.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EngineEvent {
    Log {
        message: String,
        detail: Option<String>,
    },
    Progress {
        percent: u8,
        etr: Option<String>,
    },
    Finished {
        message: String,
        output_path: Option<PathBuf>,
    },
}

/// Factory for [`CommandEngine`]. The backend command is resolved at
/// `build` time, which is the model-loading step of the job.
pub struct CommandEngineFactory {
    command: String,
}

impl CommandEngineFactory {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl EngineFactory for CommandEngineFactory {
    fn build(
        &self,
        spec: EngineSpec,
        events: Arc<dyn ConversionEvents>,
    ) -> Result<Arc<dyn SynthesisEngine>> {
        // Resolve against PATH, or verify directly when given as a path.
        // A missing backend is an unrecoverable startup error.
        let Some(command) = resolve_command(&self.command) else {
            bail!("synthesis backend not found: {}", self.command);
        };
        Ok(Arc::new(CommandEngine {
            command,
            spec,
            events,
            child: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }))
    }
}

/// Subprocess bridge to the synthesis backend.
pub struct CommandEngine {
    command: PathBuf,
    spec: EngineSpec,
    events: Arc<dyn ConversionEvents>,
    child: Mutex<Option<Child>>,
    cancelled: AtomicBool,
}

impl CommandEngine {
    fn dispatch(&self, line: &str) -> bool {
        match serde_json::from_str::<EngineEvent>(line) {
            Ok(EngineEvent::Log { message, detail }) => {
                let log = match detail {
                    Some(detail) => LogLine::WithDetail { message, detail },
                    None => LogLine::Plain(message),
                };
                self.events.on_log(log);
                false
            }
            Ok(EngineEvent::Progress { percent, etr }) => {
                self.events.on_progress(percent, etr);
                false
            }
            Ok(EngineEvent::Finished {
                message,
                output_path,
            }) => {
                self.events.on_finished(message, output_path);
                true
            }
            // Anything the backend prints outside the protocol is relayed
            // as a plain log line.
            Err(_) => {
                if !line.trim().is_empty() {
                    self.events.on_log(line.into());
                }
                false
            }
        }
    }
}

impl SynthesisEngine for CommandEngine {
    fn run(&self) -> Result<()> {
        // A cancel that lands before spawn must still produce the one
        // finished report, without ever starting the backend.
        if self.cancelled.load(Ordering::SeqCst) {
            self.events
                .on_finished("conversion cancelled".to_string(), None);
            return Ok(());
        }

        let mut cmd = Command::new(&self.command);
        cmd.arg("--input")
            .arg(&self.spec.artifact_path)
            .arg("--output")
            .arg(&self.spec.output_folder)
            .arg("--voice")
            .arg(&self.spec.voice)
            .arg("--lang")
            .arg(&self.spec.lang_code)
            .arg("--speed")
            .arg(self.spec.speed.to_string())
            .arg("--format")
            .arg(&self.spec.output_format)
            .arg("--save-option")
            .arg(&self.spec.save_option)
            .arg("--subtitle-mode")
            .arg(&self.spec.subtitle_mode)
            .arg("--total-chars")
            .arg(self.spec.total_char_count.to_string())
            .arg("--source")
            .arg(&self.spec.source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped());
        if self.spec.use_gpu {
            cmd.arg("--gpu");
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.command.display()))?;
        let stdout = child
            .stdout
            .take()
            .context("backend stdout not captured")?;
        {
            let mut guard = self.child.lock().expect("engine child lock poisoned");
            *guard = Some(child);
            // Re-check: a cancel may have raced the spawn, finding no
            // child to kill. The flag is set first on that path, so one
            // of the two sides always sees the other.
            if self.cancelled.load(Ordering::SeqCst)
                && let Some(child) = guard.as_mut()
            {
                let _ = child.kill();
            }
        }

        let mut finished = false;
        let mut lines = BufReader::new(stdout).lines();
        for line in &mut lines {
            // A read error here means the pipe broke (typically because
            // cancel killed the child); stop relaying and reap below.
            let Ok(line) = line else { break };
            if self.dispatch(&line) {
                finished = true;
                break;
            }
        }
        // Close our end of the pipe before reaping: a backend that keeps
        // writing after its terminal event gets EPIPE instead of blocking
        // on a full pipe, which would in turn block wait().
        drop(lines);

        let status = {
            let mut guard = self.child.lock().expect("engine child lock poisoned");
            guard.take().map(|mut child| child.wait())
        };

        // The finished callback fires exactly once per job: if the backend
        // died without reporting, synthesize the failure report here.
        if !finished {
            let message = if self.cancelled.load(Ordering::SeqCst) {
                "conversion cancelled".to_string()
            } else {
                match status {
                    Some(Ok(status)) => {
                        format!("synthesis backend exited without a result ({status})")
                    }
                    _ => "synthesis backend exited without a result".to_string(),
                }
            };
            self.events.on_finished(message, None);
        }

        Ok(())
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.child.lock()
            && let Some(child) = guard.as_mut()
        {
            let _ = child.kill();
        }
    }
}

fn resolve_command(command: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(command);
    if direct.components().count() > 1 {
        return direct.is_file().then_some(direct);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEvents {
        logs: Mutex<Vec<String>>,
        progress: Mutex<Vec<(u8, Option<String>)>>,
        finished: Mutex<Vec<ConversionOutcome>>,
    }

    impl ConversionEvents for RecordingEvents {
        fn on_log(&self, line: LogLine) {
            self.logs.lock().unwrap().push(line.text().to_string());
        }
        fn on_progress(&self, percent: u8, etr: Option<String>) {
            self.progress.lock().unwrap().push((percent, etr));
        }
        fn on_finished(&self, message: String, output_path: Option<PathBuf>) {
            self.finished.lock().unwrap().push(ConversionOutcome {
                message,
                output_path,
            });
        }
    }

    #[test]
    fn decode_log_event() {
        let event: EngineEvent =
            serde_json::from_str(r#"{"event":"log","message":"hello"}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::Log {
                message: "hello".into(),
                detail: None
            }
        );
    }

    #[test]
    fn decode_log_event_with_detail() {
        let event: EngineEvent =
            serde_json::from_str(r#"{"event":"log","message":"hello","detail":"aux"}"#)
                .unwrap();
        assert_eq!(
            event,
            EngineEvent::Log {
                message: "hello".into(),
                detail: Some("aux".into())
            }
        );
    }

    #[test]
    fn decode_progress_event() {
        let event: EngineEvent =
            serde_json::from_str(r#"{"event":"progress","percent":42,"etr":"2m"}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::Progress {
                percent: 42,
                etr: Some("2m".into())
            }
        );
    }

    #[test]
    fn decode_finished_event() {
        let event: EngineEvent = serde_json::from_str(
            r#"{"event":"finished","message":"ok","output_path":"/out/book.m4b"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            EngineEvent::Finished {
                message: "ok".into(),
                output_path: Some(PathBuf::from("/out/book.m4b"))
            }
        );
    }

    #[test]
    fn log_line_text_ignores_detail() {
        let line = LogLine::WithDetail {
            message: "primary".into(),
            detail: "aux".into(),
        };
        assert_eq!(line.text(), "primary");
        assert_eq!(LogLine::from("plain").text(), "plain");
    }

    #[test]
    fn outcome_success_requires_non_empty_path() {
        let ok = ConversionOutcome {
            message: "done".into(),
            output_path: Some(PathBuf::from("/out")),
        };
        assert!(ok.succeeded());

        let empty = ConversionOutcome {
            message: "done".into(),
            output_path: Some(PathBuf::new()),
        };
        assert!(!empty.succeeded());

        let absent = ConversionOutcome {
            message: "failed".into(),
            output_path: None,
        };
        assert!(!absent.succeeded());
    }

    #[test]
    fn outcome_slot_keeps_only_first_report() {
        let slot = OutcomeSlot::default();
        slot.record(ConversionOutcome {
            message: "first".into(),
            output_path: Some(PathBuf::from("/out")),
        });
        slot.record(ConversionOutcome {
            message: "second".into(),
            output_path: None,
        });
        let outcome = slot.take().unwrap();
        assert_eq!(outcome.message, "first");
        assert!(slot.take().is_none());
    }

    fn dummy_spec() -> EngineSpec {
        EngineSpec {
            artifact_path: PathBuf::from("artifact.txt"),
            output_folder: PathBuf::from("out"),
            voice: "af_heart".into(),
            lang_code: "a".into(),
            speed: 1.0,
            output_format: "m4b".into(),
            save_option: "Create a folder".into(),
            subtitle_mode: "Sentence".into(),
            total_char_count: 0,
            use_gpu: false,
            source_path: PathBuf::from("book.md"),
        }
    }

    #[test]
    fn build_rejects_missing_backend() {
        let factory = CommandEngineFactory::new("definitely-not-a-real-backend-xyz");
        let err = factory
            .build(dummy_spec(), Arc::new(RecordingEvents::default()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("synthesis backend not found"));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn write_script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-backend.sh");
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            f.write_all(body.as_bytes()).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn spec(dir: &TempDir) -> EngineSpec {
            EngineSpec {
                artifact_path: dir.path().join("artifact.txt"),
                output_folder: dir.path().join("out"),
                voice: "af_heart".into(),
                lang_code: "a".into(),
                speed: 1.0,
                output_format: "m4b".into(),
                save_option: "Create a folder".into(),
                subtitle_mode: "Sentence".into(),
                total_char_count: 9000,
                use_gpu: false,
                source_path: dir.path().join("book.md"),
            }
        }

        #[test]
        fn relays_events_from_backend_stdout() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                &dir,
                concat!(
                    "echo '{\"event\":\"log\",\"message\":\"warming up\"}'\n",
                    "echo '{\"event\":\"progress\",\"percent\":50,\"etr\":\"1m\"}'\n",
                    "echo '{\"event\":\"finished\",\"message\":\"ok\",\"output_path\":\"/out/book.m4b\"}'\n",
                ),
            );

            let events = Arc::new(RecordingEvents::default());
            let factory = CommandEngineFactory::new(script.to_str().unwrap());
            let engine = factory.build(spec(&dir), events.clone()).unwrap();
            engine.run().unwrap();

            assert_eq!(*events.logs.lock().unwrap(), vec!["warming up"]);
            assert_eq!(
                *events.progress.lock().unwrap(),
                vec![(50, Some("1m".into()))]
            );
            let finished = events.finished.lock().unwrap();
            assert_eq!(finished.len(), 1);
            assert!(finished[0].succeeded());
        }

        #[test]
        fn missing_finished_event_is_synthesized_as_failure() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                &dir,
                "echo '{\"event\":\"log\",\"message\":\"started\"}'\nexit 3\n",
            );

            let events = Arc::new(RecordingEvents::default());
            let factory = CommandEngineFactory::new(script.to_str().unwrap());
            let engine = factory.build(spec(&dir), events.clone()).unwrap();
            engine.run().unwrap();

            let finished = events.finished.lock().unwrap();
            assert_eq!(finished.len(), 1);
            assert!(!finished[0].succeeded());
        }

        #[test]
        fn non_protocol_output_is_relayed_as_log() {
            let dir = TempDir::new().unwrap();
            let script = write_script(
                &dir,
                concat!(
                    "echo 'plain backend chatter'\n",
                    "echo '{\"event\":\"finished\",\"message\":\"ok\",\"output_path\":\"/out\"}'\n",
                ),
            );

            let events = Arc::new(RecordingEvents::default());
            let factory = CommandEngineFactory::new(script.to_str().unwrap());
            let engine = factory.build(spec(&dir), events.clone()).unwrap();
            engine.run().unwrap();

            assert_eq!(*events.logs.lock().unwrap(), vec!["plain backend chatter"]);
        }

        #[test]
        fn output_after_the_terminal_event_does_not_block_reaping() {
            let dir = TempDir::new().unwrap();
            // 256 KiB after the terminal event, well past the pipe buffer.
            let script = write_script(
                &dir,
                concat!(
                    "echo '{\"event\":\"finished\",\"message\":\"ok\",\"output_path\":\"/out\"}'\n",
                    "head -c 262144 /dev/zero\n",
                ),
            );

            let events = Arc::new(RecordingEvents::default());
            let factory = CommandEngineFactory::new(script.to_str().unwrap());
            let engine = factory.build(spec(&dir), events.clone()).unwrap();
            engine.run().unwrap();

            let finished = events.finished.lock().unwrap();
            assert_eq!(finished.len(), 1);
            assert!(finished[0].succeeded());
        }

        #[test]
        fn cancel_before_run_is_reported_as_cancelled() {
            let dir = TempDir::new().unwrap();
            let script = write_script(&dir, "sleep 5\n");

            let events = Arc::new(RecordingEvents::default());
            let factory = CommandEngineFactory::new(script.to_str().unwrap());
            let engine = factory.build(spec(&dir), events.clone()).unwrap();

            // Cancel twice: must be idempotent and safe before run.
            engine.cancel();
            engine.cancel();

            engine.run().unwrap();
            let finished = events.finished.lock().unwrap();
            assert_eq!(finished.len(), 1);
            assert!(finished[0].message.contains("cancelled"));
        }
    }
}
