use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use monosink_ports::storage::SinkSettings;
use monosink_ports::types::FeedStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Driver {
    /// System audio through cpal.
    Cpal,
    /// Headless clock, nothing audible.
    Null,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "monosink")]
#[command(about = "Play a mono 16-bit tone through a low-latency sink")]
pub struct Cli {
    /// Output device name, or "default".
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Upper bound on one device buffer, in milliseconds.
    #[arg(long)]
    pub max_latency_ms: Option<u64>,

    /// Feed strategy: pull (driver callback) or push (driver queue).
    #[arg(long)]
    pub feed: Option<FeedStrategy>,

    #[arg(long, value_enum, default_value_t = Driver::Cpal)]
    pub driver: Driver,

    /// Tone frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    pub frequency: f32,

    #[arg(long, default_value_t = 0.5)]
    pub amplitude: f32,

    #[arg(long, default_value_t = 2.0)]
    pub duration_secs: f64,

    /// Print output devices and exit.
    #[arg(long)]
    pub list_devices: bool,

    /// Persist the effective settings before playing.
    #[arg(long)]
    pub save_settings: bool,

    /// Override the settings directory.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

impl Cli {
    /// Flags win over persisted settings.
    pub fn apply(&self, settings: &mut SinkSettings) {
        if let Some(device) = &self.device {
            settings.device = Some(device.clone());
        }
        if let Some(rate) = self.sample_rate {
            settings.sample_rate_hz = Some(rate);
        }
        if let Some(ms) = self.max_latency_ms {
            settings.max_latency_ms = Some(ms);
            settings.max_latency_us = None;
        }
        if let Some(feed) = self.feed {
            settings.feed = feed;
        }
    }
}
