//! Loads a `.lif` capture, drives the raycaster, and exposes an
//! HTTP+WebSocket demo surface for it (§11).

use std::{path::PathBuf, time::Duration};

use app::App;
use clap::{Parser, Subcommand};
use ldi_core::Capture;

pub mod app;
pub mod log;
pub mod proto;
pub mod util;

#[tokio::main]
pub async fn main() {
    log::initialize(format!(
        "{}=debug,tower_http=debug,ldi_core=debug,ldi_gpu=debug",
        env!("CARGO_CRATE_NAME")
    ));
    if let Err(err) = Args::parse().run().await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: ArgCommand,
}

impl Args {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.cmd {
            ArgCommand::Serve { capture, cfg_path, host, port, asset_dir, timeout, log_delta, metrics_file } => {
                let app = match cfg_path {
                    Some(p) => App::from_toml_cfg(p).await?,
                    None => {
                        let capture = capture.ok_or_else(|| anyhow::anyhow!("either --cfg-path or a capture path is required"))?;
                        App::from_capture_path(&capture, host, port, asset_dir).await?
                    }
                };

                let monitoring_handle = (log_delta >= 0).then(|| {
                    util::spawn_metrics_logger(Duration::from_secs(log_delta as u64), metrics_file.map(Into::into))
                });

                match timeout {
                    Some(secs) => app.listen_and_serve_until(tokio::time::sleep(Duration::from_secs(secs))).await?,
                    None => app.listen_and_serve().await?,
                }

                if let Some(h) = monitoring_handle {
                    h.abort();
                }
            }
            ArgCommand::Inspect { capture } => {
                let bytes = std::fs::read(&capture)?;
                let parsed = Capture::parse(&bytes)?;
                let summary = parsed.summarize();
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Subcommand)]
pub enum ArgCommand {
    /// Serves the renderer and demo client over HTTP+WebSocket.
    Serve {
        /// Path to a `.lif` capture, when not using `--cfg-path`.
        capture: Option<PathBuf>,
        #[arg(long)]
        cfg_path: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "assets")]
        asset_dir: PathBuf,
        /// Exits after this many seconds, for scripted test runs.
        #[arg(long)]
        timeout: Option<u64>,
        /// Seconds between metrics log lines; negative disables.
        #[arg(long, default_value_t = -1)]
        log_delta: i64,
        #[arg(long)]
        metrics_file: Option<String>,
    },
    /// Parses a `.lif` capture and prints its summary without rendering
    /// (§11 "CLI capture inspection").
    Inspect { capture: PathBuf },
}
