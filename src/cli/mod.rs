//! CLI Module
//!
//! Command-line interface for the Resonera engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::synth::TransitionStyle;

/// Resonera - neural entrainment session generator
#[derive(Parser, Debug)]
#[command(name = "resonera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a session to a WAV file
    #[command(name = "generate")]
    Generate {
        /// Session spec (JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output bit depth: 16, 24 or 32 (float). Defaults to the config's
        /// output.bit_depth
        #[arg(short, long)]
        bit_depth: Option<u16>,

        /// Write session metadata (JSON) here
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Write segment by segment instead of holding the session in memory
        #[arg(long)]
        stream: bool,
    },

    /// Check a session spec against the safety limits
    #[command(name = "validate")]
    Validate {
        /// Session spec (JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Plan a frequency transition and print its control points
    #[command(name = "plan")]
    Plan {
        /// Starting frequency in Hz
        #[arg(long)]
        from: f64,

        /// Ending frequency in Hz
        #[arg(long)]
        to: f64,

        /// Transition length in seconds
        #[arg(short, long)]
        duration: f64,

        /// Curve shape (linear, exponential, sigmoid)
        #[arg(long, default_value_t = TransitionStyle::Linear)]
        style: TransitionStyle,
    },

    /// List the brainwave bands and their transition minimums
    #[command(name = "bands")]
    Bands,
}
