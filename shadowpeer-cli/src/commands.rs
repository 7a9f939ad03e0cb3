//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use shadowpeer_core::config::{HeartbeatEvent, ShadowpeerConfig};
use shadowpeer_core::engine::{AnnounceEngineHandle, EngineSnapshot, EngineState};
use shadowpeer_core::torrent::{ClientProfile, ClientSignature, TorrentMetadata};
use shadowpeer_core::tracing_setup::{CliLogLevel, init_tracing};
use shadowpeer_core::tracker::percent_encode_bytes;
use shadowpeer_core::{ShadowpeerError, TcpAnnounceTransport, spawn_announce_engine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Announce a torrent to its tracker until stopped
    Announce {
        /// Path to the .torrent file
        torrent: PathBuf,
        /// Announce URL override
        #[arg(long)]
        announce_url: Option<String>,
        /// Passkey inserted into the announce path
        #[arg(long)]
        passkey: Option<String>,
        /// Client to emulate
        #[arg(long, value_enum, default_value = "utorrent")]
        client: ClientProfile,
        /// Listen port advertised to the tracker
        #[arg(short, long)]
        port: Option<u16>,
        /// Minimum simulated upload speed in bytes per second
        #[arg(long)]
        min_speed: Option<u64>,
        /// Maximum simulated upload speed in bytes per second
        #[arg(long)]
        max_speed: Option<u64>,
        /// Stop after this many simulated bytes
        #[arg(long)]
        target_bytes: Option<u64>,
        /// Seed for reproducible simulated speeds
        #[arg(long)]
        seed: Option<u64>,
        /// Event handling for periodic announces
        #[arg(long, value_enum)]
        heartbeat_event: Option<HeartbeatEvent>,
        /// Console log level
        #[arg(long, value_enum, default_value = "info")]
        log_level: CliLogLevel,
        /// Print status as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show announce details of a torrent file
    Inspect {
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

/// Keyboard commands read from stdin during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Heartbeat,
    Quit,
}

/// Options of the `announce` command after parsing.
struct AnnounceOptions {
    torrent: PathBuf,
    announce_url: Option<String>,
    passkey: Option<String>,
    client: ClientProfile,
    json: bool,
}

/// Configuration values given on the command line.
#[derive(Default)]
struct ConfigOverrides {
    port: Option<u16>,
    min_speed: Option<u64>,
    max_speed: Option<u64>,
    target_bytes: Option<u64>,
    seed: Option<u64>,
    heartbeat_event: Option<HeartbeatEvent>,
}

impl ConfigOverrides {
    /// Writes the given values over `config`.
    ///
    /// # Errors
    /// - `ShadowpeerError::Configuration` - Port is zero, or the resulting speed range is empty
    fn apply(self, config: &mut ShadowpeerConfig) -> Result<(), ShadowpeerError> {
        if let Some(port) = self.port {
            if port == 0 {
                return Err(ShadowpeerError::Configuration {
                    reason: "--port must be in 1..=65535".to_string(),
                });
            }
            config.announce.port = port;
        }
        if let Some(speed) = self.min_speed {
            config.simulation.min_upload_speed = speed;
        }
        if let Some(speed) = self.max_speed {
            config.simulation.max_upload_speed = speed;
        }
        if self.target_bytes.is_some() {
            config.simulation.target_upload_bytes = self.target_bytes;
        }
        if self.seed.is_some() {
            config.simulation.seed = self.seed;
        }
        if let Some(event) = self.heartbeat_event {
            config.announce.heartbeat_event = event;
        }

        let simulation = &config.simulation;
        if simulation.min_upload_speed == 0
            || simulation.min_upload_speed > simulation.max_upload_speed
        {
            return Err(ShadowpeerError::Configuration {
                reason: format!(
                    "upload speed range {}..={} is empty or zero",
                    simulation.min_upload_speed, simulation.max_upload_speed
                ),
            });
        }
        Ok(())
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Announce {
            torrent,
            announce_url,
            passkey,
            client,
            port,
            min_speed,
            max_speed,
            target_bytes,
            seed,
            heartbeat_event,
            log_level,
            json,
        } => {
            init_tracing(log_level.as_tracing_level(), None)
                .context("Failed to initialize logging")?;

            let mut config = ShadowpeerConfig::from_env();
            ConfigOverrides {
                port,
                min_speed,
                max_speed,
                target_bytes,
                seed,
                heartbeat_event,
            }
            .apply(&mut config)
            .map_err(report)?;

            let options = AnnounceOptions {
                torrent,
                announce_url,
                passkey,
                client,
                json,
            };
            run_announce(config, options).await
        }
        Commands::Inspect { torrent } => inspect_torrent(&torrent),
    }
}

/// Loads the torrent and applies the announce URL and passkey overrides.
fn load_metadata(
    path: &Path,
    announce_url: Option<&str>,
    passkey: Option<&str>,
) -> Result<TorrentMetadata, ShadowpeerError> {
    let mut metadata = TorrentMetadata::from_file(path)?;
    if let Some(url) = announce_url {
        metadata = metadata.with_announce_url(url)?;
    }
    if let Some(passkey) = passkey {
        metadata = metadata.with_passkey(passkey);
    }
    Ok(metadata)
}

/// Runs one announce session until it stops, fails, or the user quits.
///
/// # Errors
/// - `ShadowpeerError::Metadata` - Torrent cannot be loaded
/// - `ShadowpeerError::Announce` - Engine rejected the configuration or an announce failed
async fn run_announce(config: ShadowpeerConfig, options: AnnounceOptions) -> anyhow::Result<()> {
    let metadata = load_metadata(
        &options.torrent,
        options.announce_url.as_deref(),
        options.passkey.as_deref(),
    )
    .map_err(report)?;

    let signature = ClientSignature::emulate(options.client);
    println!("Announcing: {}", metadata.name);
    println!("  Tracker: {}:{}", metadata.tracker_host, metadata.tracker_port);
    println!("  Client: {} ({})", signature.user_agent, signature.peer_id);

    let transport = TcpAnnounceTransport::new(&config.network);
    let handle = spawn_announce_engine(config, metadata, signature, transport)
        .map_err(|e| report(e.into()))?;

    if let Err(e) = handle.start().await {
        let _ = handle.shutdown().await;
        return Err(report(e.into()));
    }
    println!("Session started. Enter 'h' to force a heartbeat, 'q' to stop.");

    let outcome = drive_session(&handle, options.json).await;
    let _ = handle.shutdown().await;
    outcome
}

/// Prints status updates and reacts to keys and Ctrl-C until the session ends.
async fn drive_session(handle: &AnnounceEngineHandle, json: bool) -> anyhow::Result<()> {
    let mut keys = spawn_key_listener();
    let mut updates = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping session");
                handle.stop().await?;
            }

            Some(key) = keys.recv() => match key {
                KeyCommand::Heartbeat => {
                    if let Err(e) = handle.force_heartbeat().await {
                        tracing::error!("Forced heartbeat failed: {}", e);
                    }
                }
                KeyCommand::Quit => handle.stop().await?,
            },

            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_status(&snapshot, json)?;

                match snapshot.state {
                    EngineState::Stopped => {
                        println!("Session stopped after {} announces", snapshot.announces_sent);
                        break;
                    }
                    EngineState::Error => {
                        if let Some(failure) = handle.take_failure().await? {
                            return Err(report(failure.into()));
                        }
                        let reason = snapshot.last_error.unwrap_or_default();
                        anyhow::bail!("Session failed: {reason}");
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// Reads `h`/`q` lines from stdin on a separate task.
fn spawn_key_listener() -> mpsc::Receiver<KeyCommand> {
    let (sender, receiver) = mpsc::channel(8);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(command) = parse_key_command(&line) else {
                continue;
            };
            if sender.send(command).await.is_err() {
                break;
            }
        }
    });

    receiver
}

fn parse_key_command(line: &str) -> Option<KeyCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "h" => Some(KeyCommand::Heartbeat),
        "q" => Some(KeyCommand::Quit),
        _ => None,
    }
}

fn print_status(snapshot: &EngineSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", format_status(snapshot));
    }
    Ok(())
}

/// One-line human readable status.
fn format_status(snapshot: &EngineSnapshot) -> String {
    let swarm = snapshot
        .last_response
        .as_ref()
        .map(|response| {
            format!(
                "seeders {} leechers {}",
                response.seeders.unwrap_or(0),
                response.leechers.unwrap_or(0)
            )
        })
        .unwrap_or_else(|| "no tracker reply".to_string());

    format!(
        "[{}] uploaded {} @ {}/s | next announce in {}s | {}",
        snapshot.state,
        format_bytes(snapshot.counters.uploaded_bytes),
        format_bytes(snapshot.current_speed),
        snapshot.counters.next_announce_in.as_secs(),
        swarm
    )
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Logs the friendly message and turns the error into an `anyhow` error.
fn report(error: ShadowpeerError) -> anyhow::Error {
    eprintln!("Error: {}", error.user_message());
    anyhow::Error::new(error)
}

/// Print announce details of a torrent file
///
/// # Errors
/// - `ShadowpeerError::Metadata` - Failed to read or parse the torrent
fn inspect_torrent(path: &Path) -> anyhow::Result<()> {
    let metadata = TorrentMetadata::from_file(path).map_err(|e| report(e.into()))?;

    println!("Name: {}", metadata.name);
    println!(
        "Size: {} ({} bytes)",
        format_bytes(metadata.total_size),
        metadata.total_size
    );
    println!("Info hash: {}", metadata.info_hash);
    println!(
        "Info hash (encoded): {}",
        percent_encode_bytes(metadata.info_hash.as_bytes())
    );
    println!("Announce URL: {}", metadata.announce_url);
    println!(
        "Passkey: {}",
        metadata
            .discovered_passkey()
            .unwrap_or_else(|| "none".to_string())
    );
    if let Some(comment) = &metadata.comment {
        println!("Comment: {comment}");
    }
    if let Some(created_by) = &metadata.created_by {
        println!("Created by: {created_by}");
    }

    Ok(())
}
