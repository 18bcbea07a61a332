//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use log::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{Engine, SessionSpec};
use crate::error::{EngineError, Result};
use crate::safety::BrainwaveBand;
use crate::synth::{TransitionController, TransitionStyle};

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            info!("Loading engine config: {}", path.display());
            EngineConfig::from_json_file(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Render a session spec to a WAV file.
pub fn generate(
    spec_path: &Path,
    output: &Path,
    config_path: Option<&Path>,
    bit_depth: Option<u16>,
    metadata_path: Option<&Path>,
    stream: bool,
) -> Result<()> {
    let engine = Engine::new(load_config(config_path)?)?;
    let spec = SessionSpec::from_json_file(spec_path)?;

    if stream {
        if metadata_path.is_some() {
            warn!("Metadata is not written for streamed output");
        }
        let frames = engine.export_streamed(&spec, output, bit_depth)?;
        println!("Wrote {} frames to {}", frames, output.display());
        return Ok(());
    }

    let metadata = match engine.export(&spec, output, bit_depth) {
        Ok(metadata) => metadata,
        Err(e) => {
            for suggestion in e.recovery_suggestions() {
                println!("  hint: {}", suggestion);
            }
            return Err(e);
        }
    };
    println!("Session: {}", metadata.session_id);
    println!(
        "  {:.2} Hz -> {:.2} Hz, carrier {:.1} Hz, {:.1}s",
        metadata.base_frequency_hz,
        metadata.target_frequency_hz,
        metadata.carrier_hz,
        metadata.duration_secs
    );
    println!("  Peak: {:.3}  SHA-256: {}", metadata.peak, metadata.checksum);
    for warning in &metadata.warnings {
        println!("  warning: {}: {}", warning.parameter, warning.reason);
    }
    println!("Wrote {}", output.display());

    if let Some(path) = metadata_path {
        metadata.write_json(path)?;
        println!("Metadata: {}", path.display());
    }
    Ok(())
}

/// Validate a session spec and print the safety report.
pub fn validate(spec_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let engine = Engine::new(load_config(config_path)?)?;
    let spec = SessionSpec::from_json_file(spec_path)?;
    let report = engine.validate(&spec);

    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);

    if report.is_safe {
        Ok(())
    } else {
        Err(EngineError::SafetyViolation { report })
    }
}

/// Plan a transition and print its control points.
pub fn plan(from: f64, to: f64, duration: f64, style: TransitionStyle) -> Result<()> {
    let config = EngineConfig::default();
    let controller = TransitionController::new(&config);

    let envelope = match controller.plan(from, to, duration, style) {
        Ok(envelope) => envelope,
        Err(e @ EngineError::TransitionTooFast { .. }) => {
            println!(
                "Recommended duration: {:.1}s",
                controller.recommended_duration(from, to, style)
            );
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    println!(
        "{} transition {:.2} Hz -> {:.2} Hz over {:.1}s",
        style, from, to, duration
    );
    println!("{:-<32}", "");
    for point in envelope.points() {
        println!("{:>10.3}s  {:>10.4} Hz", point.time_secs, point.frequency_hz);
    }
    println!("{:-<32}", "");
    println!(
        "{} control points, max slope {:.4} Hz/s",
        envelope.points().len(),
        envelope.max_slope()
    );
    Ok(())
}

/// List the brainwave bands.
pub fn bands() -> Result<()> {
    let config = EngineConfig::default();
    let minimums = &config.safety.band_minimums;

    println!("Brainwave Bands:");
    println!("{:-<60}", "");
    for band in BrainwaveBand::ALL {
        let (low, high) = band.range();
        println!(
            "{:<6} {:>5.1}-{:<5.1} Hz  canonical {:>4.1} Hz  {}",
            band.name(),
            low,
            high,
            band.canonical_frequency(),
            band.description()
        );
    }
    println!("{:-<60}", "");
    println!("Minimum transition durations:");
    for band in BrainwaveBand::ALL {
        if let Some(next) = band.higher() {
            println!(
                "  {} -> {}: {:.0}s   {} -> {}: {:.0}s",
                band,
                next,
                minimums.minimum(band, next),
                next,
                band,
                minimums.minimum(next, band)
            );
        }
    }
    Ok(())
}
