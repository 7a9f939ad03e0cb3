//! Actor implementation for the announce engine.

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::commands::{AnnounceEngineCommand, EngineSnapshot, EngineState};
use super::core::AnnounceEngine;
use super::handle::AnnounceEngineHandle;
use crate::config::ShadowpeerConfig;
use crate::torrent::{ClientSignature, TorrentMetadata};
use crate::tracker::{AnnounceError, AnnounceTransport};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Spawns the announce engine actor and returns its handle.
///
/// The actor owns all session state. It applies commands in arrival order and
/// ticks on the configured interval while the session is running.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use shadowpeer_core::config::ShadowpeerConfig;
/// use shadowpeer_core::engine::spawn_announce_engine;
/// use shadowpeer_core::torrent::{ClientProfile, ClientSignature, TorrentMetadata};
/// use shadowpeer_core::tracker::TcpAnnounceTransport;
///
/// let config = ShadowpeerConfig::default();
/// let metadata = TorrentMetadata::from_file("ubuntu.torrent".as_ref())?;
/// let signature = ClientSignature::emulate(ClientProfile::UTorrent);
/// let transport = TcpAnnounceTransport::new(&config.network);
///
/// let handle = spawn_announce_engine(config, metadata, signature, transport)?;
/// handle.start().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `AnnounceError::InvalidConfiguration` - Simulation or tick settings rejected
pub fn spawn_announce_engine<T>(
    config: ShadowpeerConfig,
    metadata: TorrentMetadata,
    signature: ClientSignature,
    transport: T,
) -> Result<AnnounceEngineHandle, AnnounceError>
where
    T: AnnounceTransport + 'static,
{
    let engine = AnnounceEngine::new(&config, metadata, signature, transport)?;
    let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (snapshot_sender, snapshot_receiver) = watch::channel(engine.snapshot());

    tokio::spawn(async move {
        run_actor_loop(engine, receiver, snapshot_sender).await;
    });

    Ok(AnnounceEngineHandle::new(sender, snapshot_receiver))
}

/// Runs the main actor loop.
///
/// Commands take priority over ticks. The tick branch is only polled while
/// the session is running, and the snapshot is republished after every
/// command and tick.
async fn run_actor_loop<T>(
    mut engine: AnnounceEngine<T>,
    mut receiver: mpsc::Receiver<AnnounceEngineCommand>,
    snapshots: watch::Sender<EngineSnapshot>,
) where
    T: AnnounceTransport + 'static,
{
    tracing::debug!("Announce engine actor started");

    let mut ticker = tokio::time::interval(engine.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let running = engine.state() == EngineState::Running;

        tokio::select! {
            biased;

            command = receiver.recv() => {
                let Some(command) = command else {
                    tracing::debug!("All engine handles dropped, stopping session");
                    engine.stop().await;
                    snapshots.send_replace(engine.snapshot());
                    break;
                };

                let keep_running = handle_command(&mut engine, command).await;
                snapshots.send_replace(engine.snapshot());
                if !keep_running {
                    break;
                }

                // Start the tick schedule from the moment the session began
                if !running && engine.state() == EngineState::Running {
                    ticker.reset();
                }
            }

            instant = ticker.tick(), if running => {
                engine.on_tick(instant).await;
                snapshots.send_replace(engine.snapshot());
            }
        }
    }

    tracing::debug!("Announce engine actor stopped");
}

/// Handles a single command for the announce engine.
/// Returns true to continue processing, false to shutdown.
async fn handle_command<T>(engine: &mut AnnounceEngine<T>, command: AnnounceEngineCommand) -> bool
where
    T: AnnounceTransport + 'static,
{
    match command {
        AnnounceEngineCommand::Start { responder } => {
            let result = engine.start(Instant::now()).await;
            let _ = responder.send(result);
        }

        AnnounceEngineCommand::ForceHeartbeat { responder } => {
            let result = engine.force_heartbeat(Instant::now()).await;
            let _ = responder.send(result);
        }

        AnnounceEngineCommand::Stop { responder } => {
            engine.stop().await;
            let _ = responder.send(Ok(()));
        }

        AnnounceEngineCommand::Reset { responder } => {
            let _ = responder.send(engine.reset());
        }

        AnnounceEngineCommand::GetSnapshot { responder } => {
            let _ = responder.send(engine.snapshot());
        }

        AnnounceEngineCommand::TakeFailure { responder } => {
            let _ = responder.send(engine.take_failure());
        }

        AnnounceEngineCommand::Shutdown { responder } => {
            tracing::debug!("Announce engine actor shutting down");
            engine.stop().await;
            let _ = responder.send(());
            return false;
        }
    }

    true
}
