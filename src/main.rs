mod cli;
mod config;
mod controller;
mod engine;
mod error;
mod parser;
mod resources;
mod signal;
mod state_machine;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cli::Cli;
use config::Config;
use controller::{Collaborators, JobContext, JobController};
use engine::{CommandEngineFactory, OutcomeSlot};
use parser::TextParser;
use resources::{NoopInhibitor, ResourceManager};
use ui::ConsoleEvents;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let request = cli.to_request();
    let resources = Arc::new(ResourceManager::new(Box::new(NoopInhibitor)));
    let outcome = Arc::new(OutcomeSlot::default());
    let events = Arc::new(ConsoleEvents::new(resources.clone(), outcome.clone()));
    let ctx = Arc::new(JobContext::new());

    if let Err(e) = signal::install_interrupt_handler(ctx.clone(), resources.clone()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let collaborators = Collaborators {
        parser: Box::new(TextParser::new(request.input.clone())),
        factory: Box::new(CommandEngineFactory::new(config.engine_command.clone())),
        events: events.clone(),
        outcome,
        resources,
        ctx,
    };

    let mut controller = JobController::new(request, collaborators, config);
    match controller.run() {
        Ok(summary) => {
            if cli.verbose {
                events.print_summary(&summary);
            }
            ExitCode::from(summary.terminal_state.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
