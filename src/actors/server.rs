//! OutageServer - raises and resolves outage alerts
//!
//! The main actor. It consumes a typed command channel, the decoded bus
//! stream and the poller's liveness events, runs the dead-device scan on the
//! polling cadence, owns the alert table and persists it on the save cadence
//! and at shutdown.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → dead-device scan → ACTIVE alerts ───────────→ bus
//! Asset / tombstone / mailbox / liveness → resolve paths → RESOLVED alerts
//!     ↑
//!     └─── Commands (CONNECT, CONSUMER, STATE_FILE, ..., $TERM)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::actors::messages::{PollerEvent, ServerCommand};
use crate::alert_table::AlertTable;
use crate::bus::{BusClient, BusMessage};
use crate::store::{SharedAssetStore, Touch};
use crate::util::now_sec;
use crate::{Alert, AlertState, AssetOp, Metric, NotifyChannel, Severity, ASSET_AGENT};

/// Persist the alert table this often.
const SAVE_INTERVAL: Duration = Duration::from_secs(45 * 60);

/// Deadline for mailbox sends.
const MAILBOX_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for bus connects.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Actor that tracks asset liveness and emits outage alerts
pub struct OutageServerActor {
    /// Bus client for outbound alerts and mailbox replies
    bus: Arc<dyn BusClient>,

    /// Asset store shared with the metric poller
    store: SharedAssetStore,

    /// Assets with a currently ACTIVE outage alert; owned by this actor only
    alerts: AlertTable,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<ServerCommand>,

    /// Decoded inbound bus traffic
    bus_rx: mpsc::Receiver<BusMessage>,

    /// Liveness events from the poller
    event_rx: mpsc::Receiver<PollerEvent>,

    /// Where the alert table is persisted, once configured
    state_file: Option<PathBuf>,

    /// Maintenance TTL applied when a request carries none
    default_maintenance_sec: u64,

    /// Dead-device scan cadence; also sizes the alert TTL
    poll_interval: Duration,

    verbose: bool,

    /// Set after the first successful connect (gates the REPUBLISH request)
    connected: bool,
}

impl OutageServerActor {
    pub fn new(
        bus: Arc<dyn BusClient>,
        store: SharedAssetStore,
        command_rx: mpsc::Receiver<ServerCommand>,
        bus_rx: mpsc::Receiver<BusMessage>,
        event_rx: mpsc::Receiver<PollerEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bus,
            store,
            alerts: AlertTable::new(),
            command_rx,
            bus_rx,
            event_rx,
            state_file: None,
            default_maintenance_sec: 0,
            poll_interval,
            verbose: false,
            connected: false,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a `$TERM` command arrives or every inbound channel closes.
    /// The alert table is saved one final time on the way out.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!("outage server started");

        let mut scan_ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        let mut save_ticker = interval_at(Instant::now() + SAVE_INTERVAL, SAVE_INTERVAL);

        loop {
            tokio::select! {
                // Timer tick - check for devices that stopped reporting
                _ = scan_ticker.tick() => {
                    self.check_dead_devices().await;
                }

                // Periodic state persistence
                _ = save_ticker.tick() => {
                    if let Err(e) = self.save_state() {
                        error!("failed to save state: {e:#}");
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ServerCommand::Term => {
                            debug!("got $TERM");
                            break;
                        }

                        ServerCommand::Timeout { timeout_ms } if timeout_ms > 0 => {
                            debug!("timeout: {timeout_ms} ms");
                            self.poll_interval = Duration::from_millis(timeout_ms);
                            scan_ticker = interval_at(
                                Instant::now() + self.poll_interval,
                                self.poll_interval,
                            );
                        }

                        ServerCommand::Timeout { timeout_ms } => {
                            warn!("ignoring zero timeout: {timeout_ms} ms");
                        }

                        ServerCommand::ScanNow { respond_to } => {
                            self.check_dead_devices().await;
                            let _ = respond_to.send(());
                        }

                        other => self.handle_command(other).await,
                    }
                }

                // React on decoded bus traffic
                Some(msg) = self.bus_rx.recv() => {
                    self.handle_bus_message(msg).await;
                }

                // Liveness reported by the poller
                Some(event) = self.event_rx.recv() => {
                    let PollerEvent::Alive { asset } = event;
                    self.resolve_alert(&asset).await;
                }

                // All channels closed - exit
                else => {
                    warn!("all channels closed, shutting down");
                    break;
                }
            }
        }

        if let Err(e) = self.save_state() {
            error!("failed to save state: {e:#}");
        }
        info!("outage server stopped");
    }

    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { endpoint, address } => {
                match timeout(CONNECT_TIMEOUT, self.bus.connect(&endpoint, &address)).await {
                    Ok(Ok(())) => {
                        debug!("connected to {endpoint} as {address}");
                        if !self.connected {
                            self.connected = true;
                            self.republish_assets().await;
                        }
                    }
                    Ok(Err(e)) => error!("bus connect failed: {e}"),
                    Err(_) => error!("bus connect timed out"),
                }
            }

            ServerCommand::Consumer { stream, pattern } => {
                debug!("consumer: {stream}/{pattern}");
                if let Err(e) = self.bus.set_consumer(&stream, &pattern).await {
                    error!("set_consumer failed: {e}");
                }
            }

            ServerCommand::Producer { stream } => {
                debug!("producer: {stream}");
                if let Err(e) = self.bus.set_producer(&stream).await {
                    error!("set_producer failed: {e}");
                }
            }

            ServerCommand::StateFile { path } => {
                debug!("state file: {}", path.display());
                match AlertTable::load(&path) {
                    Ok(table) => self.alerts = table,
                    Err(e) => error!("failed to load state file {}: {e:#}", path.display()),
                }
                self.state_file = Some(path);
            }

            ServerCommand::AssetExpirySec { expiry_sec } => {
                debug!("asset expiry: {expiry_sec} s");
                self.lock_store().set_default_expiry(expiry_sec);
            }

            ServerCommand::DefaultMaintenanceExpirationSec { expiration_sec } => {
                debug!("default maintenance expiration: {expiration_sec} s");
                self.default_maintenance_sec = expiration_sec;
            }

            ServerCommand::Verbose => {
                self.verbose = true;
            }

            ServerCommand::SaveNow { respond_to } => {
                let _ = respond_to.send(self.save_state());
            }

            // handled in the select loop
            ServerCommand::Term | ServerCommand::Timeout { .. } | ServerCommand::ScanNow { .. } => {
                unreachable!("handled by the main loop")
            }
        }
    }

    /// Ask the asset service to replay assets created before startup.
    async fn republish_assets(&self) {
        let frames = vec!["$all".to_string()];
        match timeout(MAILBOX_TIMEOUT, self.bus.request(ASSET_AGENT, "REPUBLISH", frames)).await {
            Ok(Ok(())) => debug!("asked {ASSET_AGENT} to republish assets"),
            Ok(Err(e)) => error!("REPUBLISH request failed: {e}"),
            Err(_) => error!("REPUBLISH request timed out"),
        }
    }

    async fn handle_bus_message(&mut self, msg: BusMessage) {
        if self.verbose {
            trace!("bus message: {msg:?}");
        }

        match msg {
            BusMessage::Asset(event) => {
                // a deleted or deactivated asset can no longer be in outage
                if event.operation == AssetOp::Delete || event.status != "active" {
                    self.resolve_alert(&event.name).await;
                }
                let now = now_sec();
                self.lock_store().apply_asset_event(&event, now);
            }

            BusMessage::MetricUnavailable { topic } => {
                let Some((_, source)) = topic.split_once('@') else {
                    warn!("malformed tombstone topic: {topic}");
                    return;
                };
                let source = source.to_string();
                self.resolve_alert(&source).await;
                self.lock_store().delete(&source);
            }

            BusMessage::Metric(metric) => {
                self.handle_metric(metric).await;
            }

            BusMessage::Mailbox {
                sender,
                subject,
                frames,
            } => {
                self.handle_mailbox(sender, subject, frames).await;
            }
        }
    }

    /// Legacy metric-stream path; mirrors what the poller does with a
    /// shared-memory snapshot.
    async fn handle_metric(&mut self, metric: Metric) {
        if metric.is_computed() {
            // not coming from the device itself, says nothing about liveness
            return;
        }

        let source = if metric.sensor_port().is_some() {
            match metric.sensor_name() {
                Some(sname) => sname.to_string(),
                None => {
                    error!(
                        "sensor metric malformed: port present but sname missing ({})",
                        metric.topic()
                    );
                    return;
                }
            }
        } else {
            metric.asset.clone()
        };

        self.resolve_alert(&source).await;

        let now = now_sec();
        let outcome = self
            .lock_store()
            .touch(&source, metric.time_sec, metric.ttl_sec.into(), now);
        if outcome == Touch::FromFuture {
            warn!("{}: metric is from the future, ignored", metric.topic());
        }
    }

    /// Handle a direct mailbox request; the message model always enforces a
    /// reply.
    async fn handle_mailbox(&mut self, sender: String, subject: String, frames: Vec<String>) {
        if self.verbose {
            debug!("mailbox from {sender}: {frames:?}");
        }

        let mut it = frames.into_iter();
        let Some(message_type) = it.next() else {
            warn!("expected message of type REQUEST");
            return;
        };
        let Some(uuid) = it.next() else {
            warn!("expected correlation id");
            return;
        };
        let rest: Vec<String> = it.collect();

        let mut reply = vec![uuid, "REPLY".to_string()];

        if message_type != "REQUEST" {
            warn!("'{message_type}': invalid message type");
            reply.push("ERROR".to_string());
            reply.push("Invalid message type".to_string());
        } else {
            match rest.split_first() {
                None => {
                    warn!("expected command");
                    reply.push("ERROR".to_string());
                    reply.push("Missing command".to_string());
                }

                Some((command, args)) if command == "MAINTENANCE_MODE" => {
                    match self.handle_maintenance_mode(args).await {
                        Ok(()) => reply.push("OK".to_string()),
                        Err(reason) => {
                            reply.push("ERROR".to_string());
                            reply.push(reason.to_string());
                        }
                    }
                }

                Some((command, _)) => {
                    warn!("'{command}': invalid command");
                    reply.push("ERROR".to_string());
                    reply.push("Invalid command".to_string());
                }
            }
        }

        if self.verbose {
            debug!("mailbox reply to {sender}: {reply:?}");
        }

        match timeout(MAILBOX_TIMEOUT, self.bus.request(&sender, &subject, reply)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("could not send reply to {sender}: {e}"),
            Err(_) => error!("reply to {sender} timed out"),
        }
    }

    /// Switch assets in or out of maintenance mode.
    ///
    /// `args` is `<mode>`, one or more asset names, optionally a trailing
    /// TTL in seconds. A frame with no hyphen is the TTL: deployed asset
    /// names always carry one.
    async fn handle_maintenance_mode(&mut self, args: &[String]) -> Result<(), &'static str> {
        let Some((mode_str, assets)) = args.split_first() else {
            warn!("expected maintenance mode");
            return Err("Missing maintenance mode");
        };

        let enable = match mode_str.as_str() {
            "enable" => true,
            "disable" => false,
            other => {
                warn!("'{other}': unsupported maintenance mode");
                return Err("Unsupported maintenance mode");
            }
        };

        let mut ttl = self.default_maintenance_sec;
        if let Some(last) = assets.last() {
            if !last.contains('-') {
                ttl = last.parse().unwrap_or(0);
            }
        }

        debug!("maintenance mode: {mode_str}, ttl: {ttl} s");

        let now = now_sec();
        let mut applied = false;

        for asset in assets.iter().filter(|a| a.contains('-')) {
            applied = true;

            let until = if enable { now + ttl } else { 0 };
            let known = self.lock_store().set_maintenance(asset, until);

            if known {
                info!("maintenance mode {mode_str}d for asset '{asset}' with TTL {ttl}");
            } else {
                // not declared yet; track it so the deadline is honoured
                debug!("maintenance mode: asset '{asset}' not found, creating it");
                let create_ttl = if enable {
                    ttl
                } else {
                    self.lock_store().default_expiry()
                };
                self.lock_store().insert(asset, create_ttl, now);
            }

            // maintenance implies no outage
            self.resolve_alert(asset).await;
        }

        if applied {
            Ok(())
        } else {
            warn!("maintenance mode: no asset names in request");
            Err("Command failed")
        }
    }

    /// Emit ACTIVE for every dead device. Already-active alerts are
    /// re-emitted: downstream evaluators time alerts out against their TTL
    /// and expect periodic reassertion.
    async fn check_dead_devices(&mut self) {
        let now = now_sec();
        let dead = self.lock_store().dead_devices(now);
        debug!("dead devices: {}", dead.len());

        for source in dead {
            self.activate_alert(&source).await;
        }
    }

    async fn activate_alert(&mut self, source: &str) {
        if self.alerts.is_active(source) {
            debug!("alert already active for source={source} (sending anyway)");
            self.send_alert(source, AlertState::Active).await;
        } else {
            info!("send ACTIVE alert for source={source}");
            self.send_alert(source, AlertState::Active).await;
            self.alerts.mark_active(source);
        }
    }

    /// Publish RESOLVED and drop the table entry, if an alert is tracked
    /// for `source`.
    async fn resolve_alert(&mut self, source: &str) {
        if self.alerts.is_active(source) {
            info!("send RESOLVED alert for source={source}");
            self.send_alert(source, AlertState::Resolved).await;
            self.alerts.mark_resolved(source);
        }
    }

    async fn send_alert(&self, source: &str, state: AlertState) {
        let ename = self.lock_store().friendly_name(source).to_string();

        let alert = Alert {
            rule: format!("outage@{source}"),
            asset: source.to_string(),
            state,
            severity: Severity::Critical,
            time_sec: now_sec(),
            ttl_sec: (self.poll_interval.as_secs() * 3) as u32,
            description: format!(
                "Device {ename} does not provide expected data. \
                 It may be offline or not correctly configured."
            ),
            actions: vec![NotifyChannel::Email, NotifyChannel::Sms],
        };

        let subject = alert.subject();
        debug!("alert '{subject}' is '{state}'");
        if let Err(e) = self.bus.publish(&subject, &alert).await {
            error!("cannot send alert on '{source}': {e}");
        }
    }

    fn save_state(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            warn!("there is no state path set up, cannot store the state");
            return Ok(());
        };
        self.alerts.save(path)
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, crate::store::AssetStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle for controlling the OutageServer actor
#[derive(Clone)]
pub struct OutageServerHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl OutageServerHandle {
    /// Spawn the server actor.
    ///
    /// The caller keeps the sending sides of `bus_rx` (transport adapter)
    /// and `event_rx` (poller).
    pub fn spawn(
        bus: Arc<dyn BusClient>,
        store: SharedAssetStore,
        bus_rx: mpsc::Receiver<BusMessage>,
        event_rx: mpsc::Receiver<PollerEvent>,
        poll_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = OutageServerActor::new(bus, store, cmd_rx, bus_rx, event_rx, poll_interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Drive the server through the string-token grammar.
    ///
    /// Malformed frames are logged and discarded, as on the wire.
    pub async fn send_frames(&self, frames: &[&str]) {
        let frames: Vec<String> = frames.iter().map(|s| s.to_string()).collect();
        match ServerCommand::parse(&frames) {
            Ok(cmd) => {
                let _ = self.sender.send(cmd).await;
            }
            Err(e) => warn!("{e:#}"),
        }
    }

    pub async fn connect(&self, endpoint: &str, address: &str) {
        let _ = self
            .sender
            .send(ServerCommand::Connect {
                endpoint: endpoint.to_string(),
                address: address.to_string(),
            })
            .await;
    }

    pub async fn consumer(&self, stream: &str, pattern: &str) {
        let _ = self
            .sender
            .send(ServerCommand::Consumer {
                stream: stream.to_string(),
                pattern: pattern.to_string(),
            })
            .await;
    }

    pub async fn producer(&self, stream: &str) {
        let _ = self
            .sender
            .send(ServerCommand::Producer {
                stream: stream.to_string(),
            })
            .await;
    }

    pub async fn state_file(&self, path: impl Into<PathBuf>) {
        let _ = self
            .sender
            .send(ServerCommand::StateFile { path: path.into() })
            .await;
    }

    pub async fn asset_expiry_sec(&self, expiry_sec: u64) {
        let _ = self
            .sender
            .send(ServerCommand::AssetExpirySec { expiry_sec })
            .await;
    }

    pub async fn default_maintenance_expiration_sec(&self, expiration_sec: u64) {
        let _ = self
            .sender
            .send(ServerCommand::DefaultMaintenanceExpirationSec { expiration_sec })
            .await;
    }

    pub async fn timeout_ms(&self, timeout_ms: u64) {
        let _ = self.sender.send(ServerCommand::Timeout { timeout_ms }).await;
    }

    pub async fn verbose(&self) {
        let _ = self.sender.send(ServerCommand::Verbose).await;
    }

    /// Run one dead-device scan and wait for it to finish.
    pub async fn scan_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ServerCommand::ScanNow { respond_to: tx })
            .await?;
        rx.await?;
        Ok(())
    }

    /// Persist the alert table and wait for the result.
    pub async fn save_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ServerCommand::SaveNow { respond_to: tx })
            .await?;
        rx.await?
    }

    /// Graceful shutdown: save state and exit.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(ServerCommand::Term).await;
    }
}
