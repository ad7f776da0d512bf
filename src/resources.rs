//! Scoped acquisition and release of per-job resources: the temporary
//! processing artifact and the sleep-inhibition token.
//!
//! `release_all` is the single idempotent teardown funnel. It is reachable
//! from the finished callback, from finalize, and from the interrupt
//! handler; a cancel racing a natural completion releases exactly once.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::JobError;

/// OS-level suspend prevention around the conversion phase. The actual
/// primitives are an external concern; [`NoopInhibitor`] is the default.
pub trait SleepInhibitor: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

pub struct NoopInhibitor;

impl SleepInhibitor for NoopInhibitor {
    fn acquire(&self) {}
    fn release(&self) {}
}

#[derive(Default)]
struct Inner {
    artifact: Option<PathBuf>,
    inhibited: bool,
    released: bool,
}

pub struct ResourceManager {
    inner: Mutex<Inner>,
    inhibitor: Box<dyn SleepInhibitor>,
}

impl ResourceManager {
    pub fn new(inhibitor: Box<dyn SleepInhibitor>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            inhibitor,
        }
    }

    /// Materialize the temporary artifact: a uniquely named file holding
    /// the full formatted text, closed for writing. At most one live
    /// artifact per job.
    pub fn acquire_artifact(&self, text: &str) -> Result<PathBuf, JobError> {
        let mut file = tempfile::Builder::new()
            .prefix("bookvox-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        let (_handle, path) = file.keep().map_err(|e| JobError::Artifact(e.error))?;

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| JobError::Internal("resource lock poisoned".into()))?;
        guard.artifact = Some(path.clone());
        Ok(path)
    }

    /// The live artifact path, if one exists.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.inner.lock().ok()?.artifact.clone()
    }

    pub fn acquire_sleep_inhibition(&self) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        if !guard.inhibited {
            guard.inhibited = true;
            drop(guard);
            self.inhibitor.acquire();
        }
    }

    pub fn release_sleep_inhibition(&self) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        if guard.inhibited {
            guard.inhibited = false;
            drop(guard);
            self.inhibitor.release();
        }
    }

    /// Release everything exactly once, regardless of how many paths
    /// reach this. Deletion failure is logged, never escalated: a
    /// leftover temp file must not turn a finished job into a crash.
    pub fn release_all(&self) {
        let (artifact, inhibited) = {
            let Ok(mut guard) = self.inner.lock() else {
                return;
            };
            if guard.released {
                return;
            }
            guard.released = true;
            let inhibited = guard.inhibited;
            guard.inhibited = false;
            (guard.artifact.take(), inhibited)
        };

        if inhibited {
            self.inhibitor.release();
        }
        if let Some(path) = artifact
            && path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            eprintln!(
                "warning: could not remove temporary file {}: {e}",
                path.display()
            );
        }
    }
}
