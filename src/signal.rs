//! Interrupt handling.
//!
//! Ctrl-C requests cooperative cancellation of the live engine, releases
//! all resources through the idempotent path, and exits with a failure
//! status without waiting for the engine to acknowledge. A second
//! interrupt lands on the same idempotent path.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::controller::JobContext;
use crate::error::JobError;
use crate::resources::ResourceManager;

/// Install the process-lifetime interrupt handler.
pub fn install_interrupt_handler(
    ctx: Arc<JobContext>,
    resources: Arc<ResourceManager>,
) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\n{} Stopping...", JobError::Cancelled);
        ctx.cancel_engine();
        resources.release_all();
        std::process::exit(1);
    })
    .context("failed to install interrupt handler")
}
