//! Cross-process bus
//!
//! Extends the in-process bus by composition: the IpcBus embeds a
//! [`MessageBus`] and adds a remote endpoint map, a pending-ack table, and a
//! sequence counter, all guarded as a single critical region. Child stdio
//! carries one JSON envelope per line.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::core::MessageBus;
use super::envelope::{EnvelopeKind, IpcEnvelope};
use super::message::{BusMessage, BROADCAST};

/// Default cap on unacknowledged outbound messages
pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

/// Default ack timeout
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sender identity stamped on envelopes the bus originates (acks, pongs)
const BUS_SENDER: &str = "ipc-bus";

/// IPC settings
#[derive(Debug, Clone)]
pub struct IpcConfig {
    pub max_in_flight: usize,
    pub message_timeout: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
        }
    }
}

/// Counters exposed for observability and tests
#[derive(Debug, Clone, Default)]
pub struct IpcStats {
    pub registered: usize,
    pub in_flight: usize,
    pub ack_timeouts: u64,
    pub backpressure_drops: u64,
}

struct Endpoint {
    writer_tx: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

struct Pending {
    agent_id: String,
    timeout_task: JoinHandle<()>,
}

struct IpcInner {
    endpoints: HashMap<String, Endpoint>,
    next_seq: u64,
    in_flight: usize,
    pending: HashMap<u64, Pending>,
    ack_timeouts: u64,
    backpressure_drops: u64,
}

/// Bus with child-process endpoints
#[derive(Clone)]
pub struct IpcBus {
    local: Arc<MessageBus>,
    max_in_flight: usize,
    message_timeout: Duration,
    inner: Arc<Mutex<IpcInner>>,
}

impl IpcBus {
    pub fn new(local: Arc<MessageBus>, config: IpcConfig) -> Self {
        Self {
            local,
            max_in_flight: config.max_in_flight.max(1),
            message_timeout: config.message_timeout,
            inner: Arc::new(Mutex::new(IpcInner {
                endpoints: HashMap::new(),
                next_seq: 0,
                in_flight: 0,
                pending: HashMap::new(),
                ack_timeouts: 0,
                backpressure_drops: 0,
            })),
        }
    }

    /// The embedded in-process bus
    pub fn local(&self) -> &Arc<MessageBus> {
        &self.local
    }

    fn lock(&self) -> MutexGuard<'_, IpcInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a spawned child process as an endpoint
    ///
    /// Takes over the child's stdin/stdout; the endpoint is deregistered
    /// when the child exits.
    pub fn register_process(&self, agent_id: &str, mut child: tokio::process::Child) -> eyre::Result<()> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| eyre::eyre!("child process for {} has no piped stdin", agent_id))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("child process for {} has no piped stdout", agent_id))?;

        self.connect_io(agent_id, stdin, stdout);

        // Watch for exit and deregister
        let bus = self.clone();
        let agent = agent_id.to_string();
        let waiter = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(agent_id = %agent, ?status, "child process exited"),
                Err(e) => warn!(agent_id = %agent, error = %e, "failed to wait on child process"),
            }
            bus.deregister_process(&agent);
        });

        if let Some(endpoint) = self.lock().endpoints.get_mut(agent_id) {
            endpoint.tasks.push(waiter);
        }
        Ok(())
    }

    /// Register an endpoint over arbitrary byte streams
    ///
    /// `register_process` builds on this; tests connect duplex pipes.
    pub fn connect_io<W, R>(&self, agent_id: &str, writer: W, reader: R)
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

        let write_agent = agent_id.to_string();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = writer_rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    debug!(agent_id = %write_agent, "endpoint writer closed");
                    break;
                }
            }
        });

        let bus = self.clone();
        let read_agent = agent_id.to_string();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match IpcEnvelope::parse_line(&line) {
                    Ok(envelope) => bus.handle_envelope(&read_agent, envelope),
                    Err(e) => warn!(agent_id = %read_agent, error = %e, "dropping malformed IPC line"),
                }
            }
            debug!(agent_id = %read_agent, "endpoint reader closed");
        });

        let mut inner = self.lock();
        if let Some(old) = inner.endpoints.insert(
            agent_id.to_string(),
            Endpoint {
                writer_tx,
                tasks: vec![writer_task, reader_task],
            },
        ) {
            warn!(agent_id, "replacing existing endpoint registration");
            for task in old.tasks {
                task.abort();
            }
        }
        debug!(agent_id, "endpoint registered");
    }

    /// Remove an endpoint and settle its pending sends
    pub fn deregister_process(&self, agent_id: &str) {
        let mut inner = self.lock();
        if let Some(endpoint) = inner.endpoints.remove(agent_id) {
            for task in endpoint.tasks {
                task.abort();
            }
            debug!(agent_id, "endpoint deregistered");
        }

        // Pending sends to a dead endpoint can never be acked
        let stale: Vec<u64> = inner
            .pending
            .iter()
            .filter(|(_, p)| p.agent_id == agent_id)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in stale {
            if let Some(pending) = inner.pending.remove(&seq) {
                pending.timeout_task.abort();
                inner.in_flight -= 1;
                debug!(agent_id, seq, "dropped pending send for deregistered endpoint");
            }
        }
    }

    pub fn is_connected(&self, agent_id: &str) -> bool {
        self.lock().endpoints.contains_key(agent_id)
    }

    pub fn registered_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.lock().endpoints.keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn stats(&self) -> IpcStats {
        let inner = self.lock();
        IpcStats {
            registered: inner.endpoints.len(),
            in_flight: inner.in_flight,
            ack_timeouts: inner.ack_timeouts,
            backpressure_drops: inner.backpressure_drops,
        }
    }

    /// Send on the local bus and forward to remote endpoints
    ///
    /// Local subscribers observe the message first; remote delivery is best
    /// effort, bounded by the ack timeout.
    pub fn send(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        msg_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> BusMessage {
        let message = self.local.send(from, to, msg_type, payload);
        self.forward_remote(&message);
        message
    }

    fn forward_remote(&self, message: &BusMessage) {
        let targets: Vec<String> = {
            let inner = self.lock();
            if message.to == BROADCAST {
                inner
                    .endpoints
                    .keys()
                    .filter(|id| **id != message.from)
                    .cloned()
                    .collect()
            } else if inner.endpoints.contains_key(&message.to) {
                vec![message.to.clone()]
            } else {
                Vec::new()
            }
        };

        for target in targets {
            self.forward_to(&target, message);
        }
    }

    fn forward_to(&self, agent_id: &str, message: &BusMessage) {
        let payload = match serde_json::to_value(message) {
            Ok(p) => p,
            Err(e) => {
                warn!(agent_id, error = %e, "failed to encode message for IPC");
                return;
            }
        };

        let mut inner = self.lock();

        if inner.in_flight >= self.max_in_flight {
            inner.backpressure_drops += 1;
            warn!(
                agent_id,
                in_flight = inner.in_flight,
                max = self.max_in_flight,
                "backpressure: dropping IPC send"
            );
            return;
        }

        let Some(endpoint) = inner.endpoints.get(agent_id) else {
            return;
        };

        let seq = inner.next_seq;
        let envelope = IpcEnvelope::agent_message(&message.from, seq, payload);
        let line = match envelope.to_line() {
            Ok(l) => l,
            Err(e) => {
                warn!(agent_id, error = %e, "failed to serialize IPC envelope");
                return;
            }
        };

        if endpoint.writer_tx.send(line).is_err() {
            warn!(agent_id, "endpoint writer gone, dropping send");
            return;
        }

        inner.next_seq += 1;
        inner.in_flight += 1;

        let bus = self.clone();
        let timeout = self.message_timeout;
        let timeout_agent = agent_id.to_string();
        let timeout_task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut inner = bus.lock();
            if inner.pending.remove(&seq).is_some() {
                inner.in_flight -= 1;
                inner.ack_timeouts += 1;
                warn!(agent_id = %timeout_agent, seq, "no ack within timeout, message considered lost");
            }
        });

        inner.pending.insert(
            seq,
            Pending {
                agent_id: agent_id.to_string(),
                timeout_task,
            },
        );
        debug!(agent_id, seq, "forwarded message to endpoint");
    }

    fn send_line_to(&self, agent_id: &str, envelope: IpcEnvelope) {
        let inner = self.lock();
        let Some(endpoint) = inner.endpoints.get(agent_id) else {
            return;
        };
        match envelope.to_line() {
            Ok(line) => {
                let _ = endpoint.writer_tx.send(line);
            }
            Err(e) => warn!(agent_id, error = %e, "failed to serialize envelope"),
        }
    }

    /// Handle an inbound envelope from a child endpoint
    fn handle_envelope(&self, agent_id: &str, envelope: IpcEnvelope) {
        match envelope.kind {
            EnvelopeKind::Ack => {
                let mut inner = self.lock();
                if let Some(pending) = inner.pending.remove(&envelope.seq) {
                    pending.timeout_task.abort();
                    inner.in_flight -= 1;
                    debug!(agent_id, seq = envelope.seq, "ack received");
                } else {
                    debug!(agent_id, seq = envelope.seq, "late ack ignored");
                }
            }
            EnvelopeKind::Ping => {
                debug!(agent_id, seq = envelope.seq, "ping received, answering pong");
                self.send_line_to(agent_id, IpcEnvelope::pong(BUS_SENDER, envelope.seq));
            }
            EnvelopeKind::Pong => {
                debug!(agent_id, seq = envelope.seq, "pong received");
            }
            EnvelopeKind::AgentMessage => {
                // Ack before re-emitting so the sender's timer clears even if
                // a local handler is slow.
                self.send_line_to(agent_id, IpcEnvelope::ack(BUS_SENDER, envelope.seq));

                let Some(payload) = envelope.payload else {
                    warn!(agent_id, seq = envelope.seq, "agent_message without payload");
                    return;
                };
                match serde_json::from_value::<BusMessage>(payload) {
                    Ok(message) => {
                        debug!(agent_id, msg_type = %message.msg_type, "re-emitting remote message locally");
                        self.local.send(message.from, message.to, message.msg_type, message.payload);
                    }
                    Err(e) => warn!(agent_id, error = %e, "agent_message payload is not a bus message"),
                }
            }
        }
    }

    /// Deregister every endpoint
    pub fn shutdown(&self) {
        let agents = self.registered_agents();
        for agent in agents {
            self.deregister_process(&agent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    struct FakeChild {
        /// Read side of the child's stdin (what the bus wrote to the child)
        from_bus: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        /// Write side of the child's stdout (what the child sends to the bus)
        to_bus: tokio::io::WriteHalf<DuplexStream>,
    }

    impl FakeChild {
        /// Connect a fake child endpoint to the bus
        fn connect(bus: &IpcBus, agent_id: &str) -> Self {
            let (stdin_bus_end, stdin_child_end) = tokio::io::duplex(4096);
            let (stdout_child_end, stdout_bus_end) = tokio::io::duplex(4096);

            let (_, stdin_writer) = tokio::io::split(stdin_bus_end);
            let (stdout_reader, _) = tokio::io::split(stdout_bus_end);
            bus.connect_io(agent_id, stdin_writer, stdout_reader);

            let (child_stdin_read, _) = tokio::io::split(stdin_child_end);
            let (_, child_stdout_write) = tokio::io::split(stdout_child_end);

            Self {
                from_bus: BufReader::new(child_stdin_read).lines(),
                to_bus: child_stdout_write,
            }
        }

        async fn recv(&mut self) -> IpcEnvelope {
            let line = tokio::time::timeout(Duration::from_secs(2), self.from_bus.next_line())
                .await
                .expect("timed out waiting for envelope")
                .expect("read failed")
                .expect("stream closed");
            IpcEnvelope::parse_line(&line).expect("bad envelope")
        }

        async fn send(&mut self, envelope: IpcEnvelope) {
            let line = envelope.to_line().unwrap();
            self.to_bus.write_all(line.as_bytes()).await.unwrap();
            self.to_bus.write_all(b"\n").await.unwrap();
            self.to_bus.flush().await.unwrap();
        }
    }

    fn test_bus(max_in_flight: usize, timeout: Duration) -> IpcBus {
        IpcBus::new(
            Arc::new(MessageBus::with_default_capacity()),
            IpcConfig {
                max_in_flight,
                message_timeout: timeout,
            },
        )
    }

    async fn wait_until(bus: &IpcBus, predicate: impl Fn(&IpcStats) -> bool) {
        for _ in 0..100 {
            if predicate(&bus.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached, stats: {:?}", bus.stats());
    }

    #[tokio::test]
    async fn test_send_wraps_in_envelope_with_sequence() {
        let bus = test_bus(100, Duration::from_secs(5));
        let mut child = FakeChild::connect(&bus, "child-1");

        bus.send("engine", "child-1", "work", serde_json::json!({"n": 1}));
        bus.send("engine", "child-1", "work", serde_json::json!({"n": 2}));

        let first = child.recv().await;
        let second = child.recv().await;
        assert_eq!(first.kind, EnvelopeKind::AgentMessage);
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(first.sender, "engine");

        let inner: BusMessage = serde_json::from_value(first.payload.unwrap()).unwrap();
        assert_eq!(inner.msg_type, "work");
        assert_eq!(inner.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_ack_clears_in_flight() {
        let bus = test_bus(100, Duration::from_secs(5));
        let mut child = FakeChild::connect(&bus, "child-1");

        bus.send("engine", "child-1", "work", serde_json::json!({}));
        assert_eq!(bus.stats().in_flight, 1);

        let envelope = child.recv().await;
        child.send(IpcEnvelope::ack("child-1", envelope.seq)).await;

        wait_until(&bus, |s| s.in_flight == 0).await;
        assert_eq!(bus.stats().ack_timeouts, 0);
    }

    #[tokio::test]
    async fn test_ack_timeout_decrements_and_warns() {
        let bus = test_bus(100, Duration::from_millis(50));
        let mut child = FakeChild::connect(&bus, "child-1");

        bus.send("engine", "child-1", "work", serde_json::json!({}));
        let _ = child.recv().await; // child reads but never acks

        wait_until(&bus, |s| s.in_flight == 0 && s.ack_timeouts == 1).await;

        // Subsequent sends continue to work
        bus.send("engine", "child-1", "work", serde_json::json!({}));
        assert_eq!(bus.stats().in_flight, 1);
    }

    #[tokio::test]
    async fn test_backpressure_drops_over_cap() {
        let bus = test_bus(1, Duration::from_secs(5));
        let mut child = FakeChild::connect(&bus, "child-1");

        bus.send("engine", "child-1", "work", serde_json::json!({"n": 1}));
        bus.send("engine", "child-1", "work", serde_json::json!({"n": 2}));

        let stats = bus.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.backpressure_drops, 1);

        // Only the first message reached the child
        let envelope = child.recv().await;
        let inner: BusMessage = serde_json::from_value(envelope.payload.unwrap()).unwrap();
        assert_eq!(inner.payload["n"], 1);
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong_same_seq() {
        let bus = test_bus(100, Duration::from_secs(5));
        let mut child = FakeChild::connect(&bus, "child-1");

        child.send(IpcEnvelope::ping("child-1", 77)).await;
        let reply = child.recv().await;
        assert_eq!(reply.kind, EnvelopeKind::Pong);
        assert_eq!(reply.seq, 77);
    }

    #[tokio::test]
    async fn test_inbound_agent_message_reemitted_and_acked() {
        let bus = test_bus(100, Duration::from_secs(5));
        let mut child = FakeChild::connect(&bus, "child-1");

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.local().subscribe("status", move |msg| {
            assert_eq!(msg.from, "child-1");
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let inner = BusMessage::new("child-1", "engine", "status", serde_json::json!({"ok": true}));
        child
            .send(IpcEnvelope::agent_message(
                "child-1",
                5,
                serde_json::to_value(&inner).unwrap(),
            ))
            .await;

        // The bus acks the inbound message
        let reply = child.recv().await;
        assert_eq!(reply.kind, EnvelopeKind::Ack);
        assert_eq!(reply.seq, 5);

        for _ in 0..100 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_forwards_to_all_but_sender() {
        let bus = test_bus(100, Duration::from_secs(5));
        let mut alpha = FakeChild::connect(&bus, "alpha");
        let mut beta = FakeChild::connect(&bus, "beta");

        bus.send("alpha", BROADCAST, "announce", serde_json::json!({}));

        // beta receives, alpha must not
        let envelope = beta.recv().await;
        assert_eq!(envelope.kind, EnvelopeKind::AgentMessage);

        let nothing = tokio::time::timeout(Duration::from_millis(100), alpha.from_bus.next_line()).await;
        assert!(nothing.is_err(), "sender should not receive its own broadcast");
    }

    #[tokio::test]
    async fn test_register_deregister_roundtrip() {
        let bus = test_bus(100, Duration::from_secs(5));
        let before = bus.registered_agents();

        let _child = FakeChild::connect(&bus, "temp");
        assert!(bus.is_connected("temp"));

        bus.deregister_process("temp");
        assert!(!bus.is_connected("temp"));
        assert_eq!(bus.registered_agents(), before);
    }

    #[tokio::test]
    async fn test_deregister_settles_pending() {
        let bus = test_bus(100, Duration::from_secs(60));
        let mut child = FakeChild::connect(&bus, "child-1");

        bus.send("engine", "child-1", "work", serde_json::json!({}));
        let _ = child.recv().await;
        assert_eq!(bus.stats().in_flight, 1);

        bus.deregister_process("child-1");
        assert_eq!(bus.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_send_to_unregistered_is_local_only() {
        let bus = test_bus(100, Duration::from_secs(5));
        bus.send("engine", "ghost", "work", serde_json::json!({}));
        assert_eq!(bus.stats().in_flight, 0);
        assert_eq!(bus.local().history_len(), 1);
    }
}
