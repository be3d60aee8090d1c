mod cli;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use monosink_core::{Sink, SinkConfig};
use monosink_infra_audio_cpal::CpalAudioOutputPort;
use monosink_infra_audio_null::NullAudioOutputPort;
use monosink_infra_source_tone::ToneSource;
use monosink_infra_storage_fs::FsStorage;
use monosink_ports::audio::AudioOutputPort;
use monosink_ports::storage::StoragePort;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Driver};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let storage = match &cli.config_dir {
        Some(dir) => FsStorage::new(dir.clone()),
        None => FsStorage::default(),
    };
    let mut settings = storage.load_settings().context("load settings")?;
    cli.apply(&mut settings);
    if cli.save_settings {
        storage
            .save_settings(&settings)
            .with_context(|| format!("save {}", storage.settings_path().display()))?;
    }

    let port: Box<dyn AudioOutputPort> = match cli.driver {
        Driver::Cpal => Box::new(CpalAudioOutputPort::new()),
        Driver::Null => Box::new(NullAudioOutputPort::realtime()),
    };

    if cli.list_devices {
        for device in port.list_outputs().context("list output devices")? {
            let marker = if device.is_default { "*" } else { " " };
            let rate = device
                .default_sample_rate_hz
                .map_or_else(|| "-".to_string(), |hz| format!("{hz} Hz"));
            println!("{marker} {} ({rate})", device.name);
        }
        return Ok(());
    }

    if !cli.duration_secs.is_finite() || cli.duration_secs <= 0.0 {
        bail!("--duration-secs must be positive");
    }
    let duration = Duration::from_secs_f64(cli.duration_secs);

    let config = SinkConfig::from(&settings);
    let mut sink = Sink::open(port.as_ref(), config).context("open sink")?;
    let latency = sink.spec().buffer_latency();

    let mut tone = ToneSource::new(cli.frequency, cli.amplitude).with_duration(duration);
    sink.start().context("start sink")?;
    let report = sink.play(&mut tone, Some(duration)).context("play tone")?;

    if !sink.drain(latency * 8 + Duration::from_millis(100)) {
        warn!("output did not drain before close");
    }
    let stats = sink.stats();
    sink.close();

    info!(
        samples = report.samples,
        end = ?report.end,
        callbacks = stats.callbacks,
        underruns = stats.underruns,
        chunks = stats.chunks_submitted,
        deferrals = stats.deferrals,
        "playback finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
