//! v4l-grab
//!
//! Captures a handful of still frames from a video4linux device and writes them to disk.
//!
//! ## Usage
//!
//! ```bash
//! # ten MJPEG frames from /dev/video0 into the current directory
//! v4l-grab
//!
//! # 25 frames from /dev/video2, 200 ms apart
//! v4l-grab -d 2 -c 25 --interval-ms 200 -o /tmp/shots
//!
//! # settings from a file, verbose driver logging
//! RUST_LOG=v4l_grab=debug v4l-grab --config grab.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use v4l_grab::capture::{self, CaptureReport};
use v4l_grab::config::Config;
use v4l_grab::storage::FileSink;
use v4l_grab::Session;

#[derive(Parser, Debug)]
#[command(name = "v4l-grab")]
#[command(about = "Capture still frames from a video4linux device")]
#[command(version)]
struct Cli {
    /// JSON configuration file, flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device node or index (e.g. /dev/video0 or 0)
    #[arg(short, long)]
    device: Option<String>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Requested pixel format (four character code)
    #[arg(long)]
    fourcc: Option<String>,

    /// Number of frames to capture
    #[arg(short, long)]
    count: Option<u32>,

    /// Number of mapped buffers
    #[arg(short, long)]
    buffers: Option<u32>,

    /// Delay between frames in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Per-frame timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File name pattern, {n} is the frame number
    #[arg(long)]
    pattern: Option<String>,

    /// Decode every frame before writing it
    #[arg(long)]
    decode: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fourcc) = self.fourcc {
            config.fourcc = fourcc;
        }
        if let Some(count) = self.count {
            config.frames = count;
        }
        if let Some(buffers) = self.buffers {
            config.buffers = buffers;
        }
        if let Some(interval) = self.interval_ms {
            config.interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout_ms = timeout;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(pattern) = self.pattern {
            config.pattern = pattern;
        }
        config.decode |= self.decode;

        config.validate()?;
        Ok(config)
    }
}

fn grab(config: &Config) -> Result<CaptureReport> {
    let path = config.device_path();
    let mut session = Session::open(&path, config.session())
        .with_context(|| format!("failed to open {}", path.display()))?;

    let format = session
        .configure(config.width, config.height, config.fourcc()?)
        .context("failed to configure the capture format")?;
    info!(%format, "capturing");

    session.start().context("failed to start streaming")?;

    let mut sink = FileSink::new(config.output_dir.clone(), config.pattern.as_str());
    let result = capture::run(&mut session, &config.plan(), &mut sink);

    // Teardown runs regardless of how the capture went.
    let stopped = session.stop();
    match result {
        Ok(report) => {
            stopped.context("teardown failed")?;
            Ok(report)
        }
        Err(e) => {
            if let Err(teardown) = stopped {
                warn!("teardown incomplete: {}", teardown);
            }
            Err(e).context("capture aborted")
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("v4l_grab=info")),
        )
        .with_target(false)
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(2);
        }
    };

    match grab(&config) {
        Ok(report) => {
            info!(
                persisted = report.persisted,
                timeouts = report.timeouts,
                skipped = ?report.skipped,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
