/// Sync session orchestrator.
///
/// Owns the single active channel, wires the heartbeat monitor and the
/// batch transfer controller to it, and re-creates everything on
/// reconnection per the reconnection policy. All failure paths (transport
/// error, close, heartbeat death, ping timeout, stall-recovery failure,
/// batch-start silence) funnel through one `begin_reconnect` entry point.
///
/// Everything interleaves on one `tokio::select!` loop; every deadline is
/// an `Option<Instant>` field cleared when it fires or is superseded, so a
/// stale timer can never act against a state it no longer describes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use apiary_types::{ClientMessage, Record, ServerMessage};

use crate::batch::{BatchOutcome, BatchTransfer, CompleteOutcome, TransferPhase};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::heartbeat::{HeartbeatMonitor, Liveness};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::status::SyncObserver;
use crate::transport::{Channel, ChannelEvent};

/// External controls for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// External wake trigger (window focus, network back online): issue a
    /// lightweight ping if the channel has been idle.
    Probe,
    /// Manual "reconnect now": clears the terminal-failure state, resets
    /// the attempt counter and opens immediately, bypassing backoff.
    ReconnectNow,
    /// Stop the session loop.
    Shutdown,
}

/// Snapshot of the session published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    /// No bulk transfer in progress, or all batches already received.
    pub settled: bool,
    pub reconnect_attempts: u32,
    /// Sticky terminal failure; cleared only by `ReconnectNow`.
    pub exhausted: bool,
    pub record_count: usize,
}

/// Cheap handle for collaborators: commands in, state snapshots out.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn probe(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Probe);
    }

    pub fn reconnect_now(&self) {
        let _ = self.cmd_tx.send(SessionCommand::ReconnectNow);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }

    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for state changes (e.g. to await settlement).
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// Internal wakeup sources, dispatched through a single typed match.
enum Wakeup {
    Channel(ChannelEvent),
    HeartbeatTick,
    StallTimeout,
    RecoveryTimeout,
    PingTimeout,
    BatchStartTimeout,
    ReconnectTimer,
    Command(Option<SessionCommand>),
}

pub struct SyncSession {
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,

    /// The single channel handle; exclusively owned here.
    channel: Option<Channel>,
    transfer: BatchTransfer,
    monitor: HeartbeatMonitor,
    policy: ReconnectPolicy,

    /// Current full record set: replaced wholesale on each completed bulk
    /// load, appended to by live attempts.
    records: Vec<Record>,

    heartbeat_ticker: time::Interval,
    stall_at: Option<Instant>,
    recovery_at: Option<Instant>,
    ping_at: Option<Instant>,
    batch_start_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    batch_start_retried: bool,

    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    state_tx: watch::Sender<SessionState>,
}

impl SyncSession {
    pub fn new(config: SyncConfig, observer: Arc<dyn SyncObserver>) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());

        let mut heartbeat_ticker = time::interval(config.heartbeat_interval);
        heartbeat_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let session = Self {
            monitor: HeartbeatMonitor::new(&config, Instant::now()),
            policy: ReconnectPolicy::new(&config),
            config,
            observer,
            channel: None,
            transfer: BatchTransfer::new(),
            records: Vec::new(),
            heartbeat_ticker,
            stall_at: None,
            recovery_at: None,
            ping_at: None,
            batch_start_at: None,
            reconnect_at: None,
            batch_start_retried: false,
            cmd_rx,
            state_tx,
        };
        (session, SessionHandle { cmd_tx, state_rx })
    }

    /// Run until shutdown. Terminal reconnect exhaustion does not end the
    /// loop: the session idles awaiting a manual `ReconnectNow`.
    pub async fn run(mut self) -> Result<(), SyncError> {
        self.connect().await;
        self.publish_state();

        loop {
            let connected = self.channel.is_some();
            let (stall_at, recovery_at) = (self.stall_at, self.recovery_at);
            let (ping_at, batch_start_at) = (self.ping_at, self.batch_start_at);
            let reconnect_at = self.reconnect_at;

            let wakeup = tokio::select! {
                ev = next_event(self.channel.as_mut()), if connected => Wakeup::Channel(ev),
                _ = self.heartbeat_ticker.tick(), if connected => Wakeup::HeartbeatTick,
                _ = sleep_opt(stall_at) => Wakeup::StallTimeout,
                _ = sleep_opt(recovery_at) => Wakeup::RecoveryTimeout,
                _ = sleep_opt(ping_at) => Wakeup::PingTimeout,
                _ = sleep_opt(batch_start_at) => Wakeup::BatchStartTimeout,
                _ = sleep_opt(reconnect_at) => Wakeup::ReconnectTimer,
                cmd = self.cmd_rx.recv() => Wakeup::Command(cmd),
            };

            match wakeup {
                Wakeup::Channel(ev) => self.on_channel_event(ev).await,
                Wakeup::HeartbeatTick => self.on_heartbeat_tick().await,
                Wakeup::StallTimeout => {
                    self.stall_at = None;
                    if let Some(missing) = self.transfer.on_stall() {
                        self.request_missing(missing).await;
                    }
                }
                Wakeup::RecoveryTimeout => {
                    self.recovery_at = None;
                    self.on_recovery_timeout().await;
                }
                Wakeup::PingTimeout => {
                    self.ping_at = None;
                    self.observer.status("Connection unresponsive", true);
                    self.channel_down("ping timeout").await;
                }
                Wakeup::BatchStartTimeout => {
                    self.batch_start_at = None;
                    self.on_batch_start_timeout().await;
                }
                Wakeup::ReconnectTimer => {
                    self.reconnect_at = None;
                    self.policy.fire();
                    self.connect().await;
                }
                Wakeup::Command(Some(SessionCommand::Probe)) => self.on_probe().await,
                Wakeup::Command(Some(SessionCommand::ReconnectNow)) => {
                    self.on_manual_reconnect().await;
                }
                Wakeup::Command(Some(SessionCommand::Shutdown)) | Wakeup::Command(None) => {
                    if let Some(ch) = self.channel.take() {
                        ch.close().await;
                    }
                    self.publish_state();
                    info!("sync session stopped");
                    return Ok(());
                }
            }

            self.publish_state();
        }
    }

    // ── Channel lifecycle ──────────────────────────────────────────────

    async fn connect(&mut self) {
        self.observer.status("Connecting...", false);
        match Channel::open(&self.config.url).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.policy.on_open();
                self.monitor = HeartbeatMonitor::new(&self.config, Instant::now());
                self.heartbeat_ticker.reset();
                info!(url = %self.config.url, "connected to collector");
                self.observer.status("Connected", false);

                self.batch_start_retried = false;
                if self.send(ClientMessage::RequestDataBatches {}).await {
                    self.batch_start_at = Some(Instant::now() + self.config.batch_start_timeout);
                } else {
                    self.channel_down("history request failed").await;
                }
            }
            Err(e) => {
                warn!("connect failed: {e}");
                self.begin_reconnect("connection failed");
            }
        }
    }

    /// Tear the channel down and route into the reconnection policy.
    /// Clears every timer tied to the dead channel first.
    async fn channel_down(&mut self, reason: &str) {
        if let Some(ch) = self.channel.take() {
            ch.close().await;
        }
        self.stall_at = None;
        self.recovery_at = None;
        self.ping_at = None;
        self.batch_start_at = None;
        if !self.transfer.is_settled() {
            self.transfer.abandon();
        }
        self.begin_reconnect(reason);
    }

    fn begin_reconnect(&mut self, reason: &str) {
        match self.policy.begin() {
            ReconnectDecision::Schedule { attempt, delay } => {
                let secs = delay.as_secs_f64();
                let text = match attempt {
                    Some(n) => format!(
                        "{reason} — reconnecting in {secs:.1}s (attempt {n}/{})",
                        self.policy.max_attempts()
                    ),
                    None => format!("{reason} — retrying in {secs:.1}s"),
                };
                self.observer.status(&text, true);
                self.reconnect_at = Some(Instant::now() + delay);
            }
            ReconnectDecision::Busy => debug!("reconnection already in flight"),
            ReconnectDecision::Exhausted => {
                warn!(
                    attempts = self.policy.attempts(),
                    "automatic reconnection attempts exhausted"
                );
                self.observer.status(
                    "Connection lost — automatic retries exhausted; reconnect manually or reload",
                    true,
                );
            }
        }
    }

    async fn on_manual_reconnect(&mut self) {
        info!("manual reconnect requested");
        self.policy.reset();
        self.reconnect_at = None;
        self.stall_at = None;
        self.recovery_at = None;
        self.ping_at = None;
        self.batch_start_at = None;
        if !self.transfer.is_settled() {
            self.transfer.abandon();
        }
        if let Some(ch) = self.channel.take() {
            ch.close().await;
        }
        self.connect().await;
    }

    // ── Inbound traffic ────────────────────────────────────────────────

    async fn on_channel_event(&mut self, ev: ChannelEvent) {
        match ev {
            ChannelEvent::Message(msg) => {
                self.monitor.on_activity(Instant::now());
                self.ping_at = None;
                self.on_message(msg).await;
            }
            ChannelEvent::Activity => {
                self.monitor.on_activity(Instant::now());
                self.ping_at = None;
            }
            ChannelEvent::Malformed(detail) => {
                // Still traffic: the peer is alive, the frame is garbage.
                self.monitor.on_activity(Instant::now());
                self.ping_at = None;
                warn!("discarding malformed frame: {detail}");
            }
            ChannelEvent::Closed => {
                info!("collector closed the channel");
                self.channel_down("connection closed").await;
            }
            ChannelEvent::Failed(e) => {
                warn!("transport error: {e}");
                self.channel_down("connection error").await;
            }
        }
    }

    async fn on_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::BatchStart { total_batches } => {
                debug!(total_batches, "bulk load announced");
                self.batch_start_at = None;
                self.transfer.on_start(total_batches);
                self.observer.progress(0.0, "Loading attack history...");
                self.stall_at = Some(Instant::now() + self.config.stall_timeout);
            }

            ServerMessage::BatchData {
                batch_number,
                attempts,
            } => {
                let was_recovering = matches!(
                    self.transfer.phase(),
                    TransferPhase::Stalled | TransferPhase::Recovering
                );
                match self.transfer.on_batch(batch_number, attempts) {
                    BatchOutcome::Accepted { all_received, .. } => {
                        // Ack synchronously within the handler for this batch.
                        if !self.send(ClientMessage::BatchAck { batch_number }).await {
                            self.channel_down("batch ack failed").await;
                            return;
                        }
                        if let Some((fraction, label)) = self.transfer.progress() {
                            self.observer.progress(fraction, &label);
                        }
                        if all_received {
                            self.stall_at = None;
                            self.recovery_at = None;
                            // During recovery there is no batch_complete
                            // left to consume; the final missing batch
                            // settles the transfer.
                            if was_recovering {
                                self.finalize().await;
                            }
                        } else {
                            self.stall_at = Some(Instant::now() + self.config.stall_timeout);
                        }
                    }
                    BatchOutcome::Duplicate => {
                        // Index durably accepted already; re-ack, never
                        // double-count.
                        let _ = self.send(ClientMessage::BatchAck { batch_number }).await;
                    }
                    BatchOutcome::OutOfRange => {
                        warn!(batch_number, "batch index out of range, ignoring");
                    }
                    BatchOutcome::NoTransfer => {
                        warn!(batch_number, "batch_data with no transfer active, ignoring");
                    }
                }
            }

            ServerMessage::BatchComplete {} => self.finalize().await,

            ServerMessage::BatchError { error, message } => {
                warn!(%error, ?message, "collector aborted the bulk load");
                self.observer.status("History load failed, reconnecting", true);
                self.transfer.abandon();
                self.channel_down("bulk load error").await;
            }

            ServerMessage::HeartbeatResponse {} | ServerMessage::Pong {} => {
                // Liveness already recorded on receipt.
            }

            ServerMessage::ServerHeartbeat { uptime } => {
                debug!(uptime, "collector heartbeat");
            }

            ServerMessage::LoginAttempt { attempt } => {
                self.observer.record_added(&attempt);
                self.records.push(attempt);
            }

            ServerMessage::Unknown => {
                debug!("ignoring dashboard-only message type");
            }
        }
    }

    // ── Bulk-load completion and recovery ──────────────────────────────

    async fn finalize(&mut self) {
        match self.transfer.on_complete() {
            CompleteOutcome::Finalized(records) => {
                self.stall_at = None;
                self.recovery_at = None;
                info!(count = records.len(), "bulk load complete");
                self.records = records;
                self.observer.progress(1.0, "History loaded");
                self.observer.records_ready(&self.records);
                self.observer.status("Live", false);
            }
            CompleteOutcome::Mismatch(missing) => {
                warn!(
                    pending = missing.len(),
                    "batch_complete with batches still pending"
                );
                self.request_missing(missing).await;
            }
            CompleteOutcome::NoTransfer => {
                debug!("batch_complete with no transfer active");
            }
        }
    }

    /// Request retransmission of exactly the missing set — never the whole
    /// transfer. Failure to even send the request is a channel failure.
    async fn request_missing(&mut self, missing: Vec<u32>) {
        self.observer.status(
            &format!("Transfer stalled, requesting {} missing batches", missing.len()),
            true,
        );
        let count = missing.len();
        if self
            .send(ClientMessage::RequestMissingBatches {
                batch_numbers: missing,
            })
            .await
        {
            debug!(count, "recovery request sent");
            self.transfer.mark_recovering();
            self.stall_at = None;
            self.recovery_at = Some(Instant::now() + self.config.recovery_timeout);
        } else {
            self.channel_down("recovery request failed").await;
        }
    }

    async fn on_recovery_timeout(&mut self) {
        if self.transfer.is_settled() {
            return; // stale deadline for an already-settled transfer
        }
        self.observer.status("Missing batches never arrived", true);
        self.transfer.abandon();
        self.channel_down("recovery timeout").await;
    }

    async fn on_batch_start_timeout(&mut self) {
        if !self.batch_start_retried {
            warn!("no bulk load announced, retrying request once");
            self.batch_start_retried = true;
            if self.send(ClientMessage::RequestDataBatches {}).await {
                self.batch_start_at = Some(Instant::now() + self.config.batch_start_timeout);
            } else {
                self.channel_down("history request failed").await;
            }
        } else {
            self.observer.status("Collector never offered history", true);
            self.channel_down("no bulk load announced").await;
        }
    }

    // ── Liveness ───────────────────────────────────────────────────────

    async fn on_heartbeat_tick(&mut self) {
        let now = Instant::now();
        if self.monitor.probe_overdue(now) {
            debug!(silence = ?self.monitor.silence(now), "heartbeat response overdue");
        }
        match self.monitor.assess(now) {
            Liveness::Dead => {
                self.observer.status("Connection dead (no heartbeat)", true);
                self.channel_down("heartbeat timeout").await;
                return;
            }
            Liveness::Unstable => {
                self.observer.status("Connection unstable", true);
            }
            Liveness::Healthy => {}
        }
        let timestamp = Utc::now().timestamp_millis();
        if self.send(ClientMessage::Heartbeat { timestamp }).await {
            self.monitor.on_probe_sent(now);
        } else {
            self.channel_down("heartbeat send failed").await;
        }
    }

    async fn on_probe(&mut self) {
        let now = Instant::now();
        if self.channel.is_none() || !self.monitor.should_ping(now) {
            return;
        }
        let timestamp = Utc::now().timestamp_millis();
        if self.send(ClientMessage::Ping { timestamp }).await {
            self.ping_at = Some(now + self.config.ping_deadline);
        } else {
            self.channel_down("ping send failed").await;
        }
    }

    // ── Plumbing ───────────────────────────────────────────────────────

    async fn send(&mut self, msg: ClientMessage) -> bool {
        match self.channel.as_mut() {
            Some(ch) => ch.send(&msg).await,
            None => false,
        }
    }

    fn publish_state(&self) {
        let state = SessionState {
            connected: self.channel.is_some(),
            settled: self.transfer.is_settled(),
            reconnect_attempts: self.policy.attempts(),
            exhausted: self.policy.is_exhausted(),
            record_count: self.records.len(),
        };
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

async fn next_event(channel: Option<&mut Channel>) -> ChannelEvent {
    match channel {
        Some(ch) => ch.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
