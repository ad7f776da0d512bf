//! Command-line interface, based on clap.

use std::path::PathBuf;

use clap::Parser;

use crate::state_machine::JobRequest;

/// bookvox — headless audiobook conversion.
#[derive(Debug, Parser)]
#[command(name = "bookvox", version, about)]
pub struct Cli {
    /// Source document to convert.
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Destination directory, created if missing.
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Voice selector, passed opaquely to the synthesis engine.
    #[arg(long, short = 'v', default_value = "af_heart")]
    pub voice: String,

    /// Language code, passed opaquely to the synthesis engine.
    #[arg(long, short = 'l', default_value = "a")]
    pub lang: String,

    /// Speed multiplier.
    #[arg(long, short = 's', default_value_t = 1.0)]
    pub speed: f32,

    /// Print the structured job summary after the run.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn to_request(&self) -> JobRequest {
        JobRequest {
            input: self.input.clone(),
            output_dir: self.output.clone(),
            voice: self.voice.clone(),
            lang: self.lang.clone(),
            speed: self.speed,
        }
    }
}
