//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments for the patch renderer driver.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "terra", about = "Planetary terrain patch renderer")]
pub struct CliArgs {
    /// Water animation step per drawn frame.
    #[arg(long)]
    pub water_time_step: Option<f32>,

    /// Per-draw uniform capacity of the GPU backend.
    #[arg(long)]
    pub max_draws: Option<u32>,

    /// Planet radius in meters.
    #[arg(long)]
    pub planet_radius: Option<f64>,

    /// Number of frames to run.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Patches per cube-face edge.
    #[arg(long)]
    pub patches: Option<u32>,

    /// Offscreen target width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Offscreen target height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(step) = args.water_time_step {
            self.render.water_time_step = step;
        }
        if let Some(max) = args.max_draws {
            self.render.max_draws_per_pass = max;
        }
        if let Some(radius) = args.planet_radius {
            self.render.planet_radius = radius;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(patches) = args.patches {
            self.demo.patches_per_side = patches;
        }
        if let Some(w) = args.width {
            self.demo.width = w;
        }
        if let Some(h) = args.height {
            self.demo.height = h;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
