use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use studiolive_pcap_replay::capture::CaptureReader;
use studiolive_pcap_replay::client::codec::{ClientEvent, FaderPositions, MessageCode};
use studiolive_pcap_replay::{ReplayConfig, ReplaySession};

#[derive(Parser, Debug)]
#[command(name = "studiolive-pcap-replay")]
#[command(about = "Replay a recorded StudioLive console session into the protocol client")]
#[command(version)]
struct Args {
    /// Capture file (pcap) of a console session
    file: Option<PathBuf>,

    /// Console IP address, dotted decimal
    console_ip: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout is reserved for decoded console events.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match ReplayConfig::from_args(args.file.as_deref(), args.console_ip.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match replay(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn replay(config: ReplayConfig) -> Result<()> {
    info!("Starting StudioLive capture replay");
    info!("Console IP: {}", config.target);
    info!("Capture file: {}", config.file.display());

    let mut reader = CaptureReader::open(&config.file, &config.bpf_filter)?;
    info!("Loaded capture file {}", reader.file_path().display());

    let mut session = ReplaySession::new(config);

    session.client().on(MessageCode::FaderPosition, |event| {
        if let ClientEvent::FaderPosition(positions) = event {
            match render_fader_positions(positions) {
                Ok(text) => println!("{}", text.green()),
                Err(e) => warn!("Failed to render fader positions: {}", e),
            }
        }
    });

    session.run(&mut reader).await?;
    session.drain().await;

    // Nothing ends a replay on its own; heartbeats keep the client alive until interrupted.
    info!("Replay finished, press Ctrl+C to exit");
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = session.client().closed() => {
            warn!("Console connection lost, press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }
    info!("Received Ctrl+C, shutting down");

    Ok(())
}

/// Text printed (in green) for every fader update.
fn render_fader_positions(positions: &FaderPositions) -> serde_json::Result<String> {
    serde_json::to_string_pretty(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fader_positions_pretty_json() {
        let positions = FaderPositions {
            channels: 2,
            levels: vec![1000, 2000],
        };

        let expected = "{\n  \"channels\": 2,\n  \"levels\": [\n    1000,\n    2000\n  ]\n}";
        assert_eq!(render_fader_positions(&positions).unwrap(), expected);
    }

    #[test]
    fn test_render_empty_fader_block() {
        let positions = FaderPositions {
            channels: 0,
            levels: vec![],
        };

        let expected = "{\n  \"channels\": 0,\n  \"levels\": []\n}";
        assert_eq!(render_fader_positions(&positions).unwrap(), expected);
    }
}
