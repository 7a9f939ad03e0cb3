//! Handle for communicating with the announce engine actor.

use tokio::sync::{mpsc, oneshot, watch};

use super::commands::{AnnounceEngineCommand, EngineSnapshot, EngineState};
use crate::tracker::AnnounceError;

/// Handle for communicating with the announce engine actor.
///
/// Cheap to clone. Once the actor has shut down every call fails with
/// `AnnounceError::EngineDisposed`.
#[derive(Clone)]
pub struct AnnounceEngineHandle {
    sender: mpsc::Sender<AnnounceEngineCommand>,
    snapshots: watch::Receiver<EngineSnapshot>,
}

impl AnnounceEngineHandle {
    /// Creates a new handle with the given command sender and snapshot feed.
    pub fn new(
        sender: mpsc::Sender<AnnounceEngineCommand>,
        snapshots: watch::Receiver<EngineSnapshot>,
    ) -> Self {
        Self { sender, snapshots }
    }

    /// Sends the `started` announce and begins periodic heartbeats.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Session is not `Ready`
    /// - `AnnounceError::MissingInterval` - Tracker reply had no interval
    /// - Transport, decode or rejection errors of the first announce
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn start(&self) -> Result<(), AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::Start { responder })
            .await?
    }

    /// Heartbeats now and restarts the interval timer.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Session is not `Running`
    /// - Any announce error, which also ends the session in `Error`
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn force_heartbeat(&self) -> Result<(), AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::ForceHeartbeat { responder })
            .await?
    }

    /// Ends the session with a best-effort `stopped` announce.
    ///
    /// A no-op unless the session is running.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn stop(&self) -> Result<(), AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::Stop { responder })
            .await?
    }

    /// Returns a stopped or failed session to `Ready`.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Session is still running
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn reset(&self) -> Result<(), AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::Reset { responder })
            .await?
    }

    /// Gets the current engine snapshot.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn snapshot(&self) -> Result<EngineSnapshot, AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::GetSnapshot { responder })
            .await
    }

    /// Checks whether periodic heartbeats are active.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn is_running(&self) -> Result<bool, AnnounceError> {
        Ok(self.snapshot().await?.state == EngineState::Running)
    }

    /// Takes the error that ended the session from the tick loop.
    ///
    /// Errors from `start` and `force_heartbeat` are returned to their caller
    /// and are not kept here.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor has shut down
    pub async fn take_failure(&self) -> Result<Option<AnnounceError>, AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::TakeFailure { responder })
            .await
    }

    /// Stops the session if running and terminates the actor.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor had already shut down
    pub async fn shutdown(&self) -> Result<(), AnnounceError> {
        self.request(|responder| AnnounceEngineCommand::Shutdown { responder })
            .await
    }

    /// Receiver that sees a fresh snapshot after every tick and command.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until the session ends in `Stopped` or `Error`.
    ///
    /// Never resolves for a session that is not started.
    ///
    /// # Errors
    /// - `AnnounceError::EngineDisposed` - Actor shut down before the session ended
    pub async fn wait_for_exit(&self) -> Result<EngineSnapshot, AnnounceError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| {
                matches!(snapshot.state, EngineState::Stopped | EngineState::Error)
            })
            .await
            .map_err(|_| AnnounceError::EngineDisposed)?;
        Ok(snapshot.clone())
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> AnnounceEngineCommand,
    ) -> Result<R, AnnounceError> {
        let (responder, rx) = oneshot::channel();

        self.sender
            .send(command(responder))
            .await
            .map_err(|_| AnnounceError::EngineDisposed)?;

        rx.await.map_err(|_| AnnounceError::EngineDisposed)
    }
}
