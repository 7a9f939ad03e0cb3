//! Announce session state machine.

use std::time::Duration;

use tokio::time::Instant;

use super::commands::{EngineSnapshot, EngineState, SessionCounters};
use crate::config::{AnnounceConfig, HeartbeatEvent, ShadowpeerConfig, UploadReporting};
use crate::simulation::TrafficSimulator;
use crate::torrent::{ClientSignature, TorrentMetadata};
use crate::tracker::{
    AnnounceError, AnnounceEvent, AnnounceRequestBuilder, AnnounceTransport, TrackerResponse,
    decode_tracker_response,
};

/// Drives one torrent's announce lifecycle.
///
/// `Ready -> Starting -> Running -> Stopped`, with `Error` reachable from
/// `Starting` and `Running`. Only the actor task touches an engine, so every
/// method takes `&mut self` and announces are strictly sequential.
pub struct AnnounceEngine<T: AnnounceTransport> {
    config: AnnounceConfig,
    metadata: TorrentMetadata,
    signature: ClientSignature,
    transport: T,
    simulator: TrafficSimulator,
    state: EngineState,
    counters: SessionCounters,
    tracker_interval: Duration,
    last_announce_at: Option<Instant>,
    last_response: Option<TrackerResponse>,
    tracker_id: Option<String>,
    last_error: Option<String>,
    failure: Option<AnnounceError>,
    announces_sent: u64,
}

impl<T: AnnounceTransport> AnnounceEngine<T> {
    /// Creates an engine in the `Ready` state.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidConfiguration` - Simulation settings rejected
    pub fn new(
        config: &ShadowpeerConfig,
        metadata: TorrentMetadata,
        signature: ClientSignature,
        transport: T,
    ) -> Result<Self, AnnounceError> {
        let simulator = TrafficSimulator::from_config(&config.simulation)?;
        if config.announce.tick_interval.is_zero() {
            return Err(AnnounceError::InvalidConfiguration {
                reason: "tick interval must be non-zero".to_string(),
            });
        }

        Ok(Self {
            tracker_interval: config.announce.default_interval,
            config: config.announce.clone(),
            metadata,
            signature,
            transport,
            simulator,
            state: EngineState::Ready,
            counters: SessionCounters::default(),
            last_announce_at: None,
            last_response: None,
            tracker_id: None,
            last_error: None,
            failure: None,
            announces_sent: 0,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    /// Sends the `started` announce and enters `Running`.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Engine is not `Ready`
    /// - `AnnounceError::MissingInterval` - Tracker reply had no interval
    /// - Any transport, decode or tracker rejection error of the announce
    pub async fn start(&mut self, now: Instant) -> Result<(), AnnounceError> {
        if self.state != EngineState::Ready {
            return Err(AnnounceError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        self.state = EngineState::Starting;
        tracing::info!(
            "Starting announce session for '{}' on {}:{}",
            self.metadata.name,
            self.metadata.tracker_host,
            self.metadata.tracker_port
        );

        let response = match self.announce(Some(AnnounceEvent::Started), 0).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(interval) = response.announce_interval() else {
            return Err(self.fail(AnnounceError::MissingInterval));
        };

        self.tracker_interval = interval;
        self.simulator.reset();
        self.simulator.tick(now.into_std());
        self.record_success(response, 0, now);
        self.state = EngineState::Running;

        tracing::info!("Announce session running, next heartbeat in {:?}", interval);
        Ok(())
    }

    /// Heartbeats immediately and restarts the interval timer.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Engine is not `Running`
    /// - Any announce error, which also moves the engine to `Error`
    pub async fn force_heartbeat(&mut self, now: Instant) -> Result<(), AnnounceError> {
        if self.state != EngineState::Running {
            return Err(AnnounceError::InvalidState {
                operation: "force heartbeat",
                state: self.state,
            });
        }

        tracing::info!("Forced heartbeat requested");
        self.advance(now);
        self.heartbeat(now).await
    }

    /// Advances one tick: feeds the simulator, refreshes counters and
    /// heartbeats when the interval has elapsed.
    ///
    /// A heartbeat failure is kept for [`AnnounceEngine::take_failure`].
    pub async fn on_tick(&mut self, now: Instant) {
        if self.state != EngineState::Running {
            return;
        }

        self.advance(now);

        if self.simulator.take_completion() && self.config.stop_on_upload_target {
            tracing::info!("Upload target reached, ending session");
            self.stop().await;
            return;
        }

        if self.counters.next_announce_in.is_zero() {
            if let Err(e) = self.heartbeat(now).await {
                self.failure = Some(e);
            }
        }
    }

    /// Sends the `stopped` announce and enters `Stopped`.
    ///
    /// Does nothing unless the session is `Starting` or `Running`. A failed
    /// stop announce is logged and otherwise ignored.
    pub async fn stop(&mut self) {
        if !matches!(self.state, EngineState::Starting | EngineState::Running) {
            tracing::debug!("Stop ignored while {}", self.state);
            return;
        }

        let uploaded = self.simulator.total_uploaded();
        let reported = self.reported_upload(uploaded);
        match self.announce(Some(AnnounceEvent::Stopped), reported).await {
            Ok(response) => {
                self.counters.last_announced_bytes = uploaded;
                self.last_response = Some(response);
            }
            Err(e) => tracing::warn!("Stop announce failed: {}", e),
        }

        self.state = EngineState::Stopped;
        self.counters.next_announce_in = Duration::ZERO;
        tracing::info!(
            "Announce session stopped after {} bytes uploaded",
            self.counters.uploaded_bytes
        );
    }

    /// Returns a terminated engine to `Ready` with fresh counters.
    ///
    /// # Errors
    /// - `AnnounceError::InvalidState` - Session is not `Stopped` or `Error`
    pub fn reset(&mut self) -> Result<(), AnnounceError> {
        if !matches!(self.state, EngineState::Stopped | EngineState::Error) {
            return Err(AnnounceError::InvalidState {
                operation: "reset",
                state: self.state,
            });
        }

        self.simulator.reset();
        self.counters = SessionCounters::default();
        self.tracker_interval = self.config.default_interval;
        self.last_announce_at = None;
        self.last_response = None;
        self.tracker_id = None;
        self.last_error = None;
        self.failure = None;
        self.announces_sent = 0;
        self.state = EngineState::Ready;
        tracing::debug!("Announce engine reset");
        Ok(())
    }

    pub fn take_failure(&mut self) -> Option<AnnounceError> {
        self.failure.take()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state,
            counters: self.counters,
            current_speed: self.simulator.current_speed(),
            upload_target_reached: self.simulator.is_completed(),
            tracker_interval: self.tracker_interval,
            last_response: self.last_response.clone(),
            last_error: self.last_error.clone(),
            announces_sent: self.announces_sent,
        }
    }

    fn advance(&mut self, now: Instant) {
        self.simulator.tick(now.into_std());
        self.counters.uploaded_bytes = self.simulator.total_uploaded();

        let elapsed = self
            .last_announce_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        self.counters.elapsed = elapsed;
        self.counters.next_announce_in = self.tracker_interval.saturating_sub(elapsed);
    }

    async fn heartbeat(&mut self, now: Instant) -> Result<(), AnnounceError> {
        let uploaded = self.simulator.total_uploaded();
        let reported = self.reported_upload(uploaded);
        let event = match self.config.heartbeat_event {
            HeartbeatEvent::Omit => None,
            HeartbeatEvent::Empty => Some(AnnounceEvent::Empty),
        };

        let response = match self.announce(event, reported).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e)),
        };

        // Keep the previous interval when the tracker omits it on a heartbeat
        if let Some(interval) = response.announce_interval() {
            self.tracker_interval = interval;
        }
        self.record_success(response, uploaded, now);

        tracing::info!(
            "Heartbeat sent: uploaded={} (reported {}), next in {:?}",
            uploaded,
            reported,
            self.tracker_interval
        );
        Ok(())
    }

    fn reported_upload(&self, uploaded: u64) -> u64 {
        match self.config.upload_reporting {
            UploadReporting::Delta => uploaded.saturating_sub(self.counters.last_announced_bytes),
            UploadReporting::Cumulative => uploaded,
        }
    }

    fn record_success(&mut self, response: TrackerResponse, uploaded: u64, now: Instant) {
        self.last_announce_at = Some(now);
        self.last_response = Some(response);
        self.counters.uploaded_bytes = uploaded;
        self.counters.last_announced_bytes = uploaded;
        self.counters.elapsed = Duration::ZERO;
        self.counters.next_announce_in = self.tracker_interval;
    }

    fn fail(&mut self, error: AnnounceError) -> AnnounceError {
        tracing::error!("Announce failed while {}: {}", self.state, error);
        self.state = EngineState::Error;
        self.last_error = Some(error.to_string());
        error
    }

    /// One request/response round-trip. Counts the announce and remembers the
    /// tracker id once a reply decodes.
    async fn announce(
        &mut self,
        event: Option<AnnounceEvent>,
        uploaded: u64,
    ) -> Result<TrackerResponse, AnnounceError> {
        let mut builder = AnnounceRequestBuilder::for_torrent(&self.metadata)
            .peer_id(self.signature.peer_id.as_bytes())
            .port(self.config.port)
            .stats(uploaded, 0, 0)
            .numwant(self.config.numwant)
            .key(self.signature.key.clone());
        if let Some(event) = event {
            builder = builder.event(event);
        }
        if let Some(tracker_id) = &self.tracker_id {
            builder = builder.tracker_id(tracker_id.clone());
        }
        if let Some(ip) = &self.config.ip {
            builder = builder.ip(ip.clone());
        }
        if let Some(ipv6) = &self.config.ipv6 {
            builder = builder.ipv6(ipv6.clone());
        }

        let request = builder.build()?;
        tracing::debug!(
            "Announcing event={:?} uploaded={} to {}",
            event,
            uploaded,
            self.metadata.tracker_host
        );

        let raw = self
            .transport
            .send_announce(
                &self.metadata.tracker_host,
                self.metadata.tracker_port,
                &request.target(),
                &self.signature.user_agent,
            )
            .await?;
        let response = decode_tracker_response(&raw)?;
        self.announces_sent += 1;

        if let Some(tracker_id) = &response.tracker_id {
            self.tracker_id = Some(tracker_id.clone());
        }
        if let Some(warning) = &response.warning_message {
            tracing::warn!("Tracker warning: {}", warning);
        }
        if let Some(reason) = &response.failure_reason {
            return Err(AnnounceError::TrackerRejected {
                reason: reason.clone(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_mocks::{
        MockTransport, interval_response, test_metadata, test_signature,
    };
    use crate::tracker::MIN_ANNOUNCE_INTERVAL;
    use super::*;

    fn engine(transport: MockTransport) -> AnnounceEngine<MockTransport> {
        engine_with(ShadowpeerConfig::for_testing(), transport)
    }

    fn engine_with(
        config: ShadowpeerConfig,
        transport: MockTransport,
    ) -> AnnounceEngine<MockTransport> {
        AnnounceEngine::new(&config, test_metadata(), test_signature(), transport).unwrap()
    }

    #[tokio::test]
    async fn test_start_sends_started_with_zero_counters() {
        let transport = MockTransport::new();
        transport.push_response(interval_response(900)).await;
        let mut engine = engine(transport.clone());

        engine.start(Instant::now()).await.unwrap();

        assert_eq!(engine.state(), EngineState::Running);
        let requests = transport.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].target.contains("&uploaded=0&downloaded=0&left=0&event=started&"));
        assert_eq!(requests[0].host, "tracker.example.com");
        assert_eq!(requests[0].port, 80);
        assert_eq!(requests[0].user_agent, test_signature().user_agent);
        assert_eq!(engine.snapshot().tracker_interval, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_zero_interval_on_first_announce_still_runs() {
        let transport = MockTransport::new();
        transport
            .push_response(b"HTTP/1.1 200 OK\r\n\r\nd8:intervali0ee".to_vec())
            .await;
        let mut engine = engine(transport);

        engine.start(Instant::now()).await.unwrap();

        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.snapshot().tracker_interval, MIN_ANNOUNCE_INTERVAL);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let mut engine = engine(MockTransport::new());
        engine.start(Instant::now()).await.unwrap();

        let result = engine.start(Instant::now()).await;
        assert!(matches!(
            result,
            Err(AnnounceError::InvalidState {
                operation: "start",
                state: EngineState::Running
            })
        ));
    }

    #[tokio::test]
    async fn test_force_heartbeat_requires_running() {
        let mut engine = engine(MockTransport::new());
        let result = engine.force_heartbeat(Instant::now()).await;
        assert!(matches!(
            result,
            Err(AnnounceError::InvalidState {
                state: EngineState::Ready,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_interval_on_first_announce_is_fatal() {
        let transport = MockTransport::new();
        transport.push_response(b"HTTP/1.1 200 OK\r\n\r\nd8:completei1ee".to_vec()).await;
        let mut engine = engine(transport);

        let result = engine.start(Instant::now()).await;

        assert!(matches!(result, Err(AnnounceError::MissingInterval)));
        assert_eq!(engine.state(), EngineState::Error);
        assert!(engine.snapshot().last_error.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_on_start_moves_to_error() {
        let transport = MockTransport::new();
        transport
            .push_error(AnnounceError::ConnectTimeout {
                address: "tracker.example.com:80".to_string(),
                timeout: Duration::from_secs(1),
            })
            .await;
        let mut engine = engine(transport);

        assert!(engine.start(Instant::now()).await.is_err());
        assert_eq!(engine.state(), EngineState::Error);
    }

    #[tokio::test]
    async fn test_tracker_rejection_is_surfaced() {
        let transport = MockTransport::new();
        transport
            .push_response(b"HTTP/1.1 200 OK\r\n\r\nd14:failure reason6:bannede".to_vec())
            .await;
        let mut engine = engine(transport);

        let result = engine.start(Instant::now()).await;
        assert!(matches!(result, Err(AnnounceError::TrackerRejected { reason }) if reason == "banned"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_heartbeats_after_interval_with_delta() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.push_response(interval_response(2)).await;
        }
        let mut engine = engine(transport.clone());
        let start = Instant::now();
        engine.start(start).await.unwrap();

        engine.on_tick(start + Duration::from_secs(1)).await;
        assert_eq!(transport.requests().await.len(), 1);
        assert_eq!(engine.snapshot().counters.next_announce_in, Duration::from_secs(1));

        engine.on_tick(start + Duration::from_secs(2)).await;
        let requests = transport.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(!requests[1].target.contains("event="));

        let first_total = engine.snapshot().counters.last_announced_bytes;
        assert!(first_total > 0);
        assert!(requests[1].target.contains(&format!("&uploaded={first_total}&")));

        engine.on_tick(start + Duration::from_secs(3)).await;
        engine.on_tick(start + Duration::from_secs(4)).await;
        let requests = transport.requests().await;
        assert_eq!(requests.len(), 3);
        let second_total = engine.snapshot().counters.last_announced_bytes;
        let delta = second_total - first_total;
        assert!(requests[2].target.contains(&format!("&uploaded={delta}&")));
    }

    #[tokio::test]
    async fn test_heartbeat_failure_moves_to_error_and_is_kept() {
        let transport = MockTransport::new();
        transport.push_response(interval_response(1)).await;
        transport
            .push_response(b"HTTP/1.1 500 Internal Server Error\r\n\r\n<html>".to_vec())
            .await;
        let mut engine = engine(transport);
        let start = Instant::now();
        engine.start(start).await.unwrap();

        engine.on_tick(start + Duration::from_secs(1)).await;

        assert_eq!(engine.state(), EngineState::Error);
        assert!(matches!(
            engine.take_failure(),
            Some(AnnounceError::MalformedResponse { .. })
        ));
        assert!(engine.take_failure().is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_without_interval_keeps_previous() {
        let transport = MockTransport::new();
        transport.push_response(interval_response(60)).await;
        transport.push_response(b"HTTP/1.1 200 OK\r\n\r\nde".to_vec()).await;
        let mut engine = engine(transport);
        engine.start(Instant::now()).await.unwrap();

        engine.force_heartbeat(Instant::now()).await.unwrap();

        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.snapshot().tracker_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_empty_heartbeat_event_and_tracker_id_echo() {
        let transport = MockTransport::new();
        transport
            .push_response(b"HTTP/1.1 200 OK\r\n\r\nd8:intervali60e10:tracker id4:T-42e".to_vec())
            .await;
        let mut config = ShadowpeerConfig::for_testing();
        config.announce.heartbeat_event = HeartbeatEvent::Empty;
        let mut engine = engine_with(config, transport.clone());
        engine.start(Instant::now()).await.unwrap();

        engine.force_heartbeat(Instant::now()).await.unwrap();

        let requests = transport.requests().await;
        assert!(requests[1].target.contains("&event=&"));
        assert!(requests[1].target.contains("&trackerid=T-42"));
    }

    #[tokio::test]
    async fn test_stop_sends_stopped_and_is_idempotent() {
        let transport = MockTransport::new();
        let mut engine = engine(transport.clone());
        engine.start(Instant::now()).await.unwrap();

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);
        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);

        let requests = transport.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[1].target.contains("event=stopped"));
    }

    #[tokio::test]
    async fn test_stop_announce_failure_is_swallowed() {
        let transport = MockTransport::new();
        transport.push_response(interval_response(60)).await;
        transport
            .push_error(AnnounceError::ReadTimeout {
                address: "t:80".to_string(),
                timeout: Duration::from_secs(1),
            })
            .await;
        let mut engine = engine(transport);
        engine.start(Instant::now()).await.unwrap();

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_target_triggers_stop() {
        let mut config = ShadowpeerConfig::for_testing();
        config.simulation.min_upload_speed = 1_000;
        config.simulation.max_upload_speed = 1_000;
        config.simulation.target_upload_bytes = Some(1_500);
        let transport = MockTransport::new();
        let mut engine = engine_with(config, transport.clone());
        let start = Instant::now();
        engine.start(start).await.unwrap();

        engine.on_tick(start + Duration::from_secs(1)).await;
        assert_eq!(engine.state(), EngineState::Running);
        engine.on_tick(start + Duration::from_secs(2)).await;

        assert_eq!(engine.state(), EngineState::Stopped);
        let snapshot = engine.snapshot();
        assert!(snapshot.upload_target_reached);
        assert_eq!(snapshot.counters.uploaded_bytes, 1_500);
        let requests = transport.requests().await;
        assert!(requests.last().unwrap().target.contains("uploaded=1500&"));
        assert!(requests.last().unwrap().target.contains("event=stopped"));
    }

    #[tokio::test]
    async fn test_reset_rules() {
        let mut engine = engine(MockTransport::new());
        assert!(matches!(
            engine.reset(),
            Err(AnnounceError::InvalidState {
                operation: "reset",
                state: EngineState::Ready
            })
        ));

        engine.start(Instant::now()).await.unwrap();
        assert!(matches!(
            engine.reset(),
            Err(AnnounceError::InvalidState { operation: "reset", .. })
        ));

        engine.stop().await;
        engine.reset().unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, EngineState::Ready);
        assert_eq!(snapshot.announces_sent, 0);
        assert_eq!(snapshot.counters, SessionCounters::default());
        assert!(snapshot.last_response.is_none());
        engine.start(Instant::now()).await.unwrap();
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let mut config = ShadowpeerConfig::for_testing();
        config.announce.tick_interval = Duration::ZERO;
        let result = AnnounceEngine::new(
            &config,
            test_metadata(),
            test_signature(),
            MockTransport::new(),
        );
        assert!(matches!(result, Err(AnnounceError::InvalidConfiguration { .. })));
    }
}
