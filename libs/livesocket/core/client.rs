use crate::config::ClientConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::correlation::ReplyTable;
use crate::dispatch::EventHub;
use crate::packet::{EventPacket, MethodPacket, ReplyPacket, WebSocketPacket};
use crate::packet_id::PacketIdAllocator;
use crate::receive::receive_loop;
use crate::traits::*;
use crossbeam_channel::Receiver;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound for the close handshake on a socket that may be stalled
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half together with the connection it belongs to
struct ActiveWriter {
    epoch: u64,
    sink: Box<dyn FrameSink>,
}

/// Handles owned by one running connection
struct ReceiveHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    connector: Arc<dyn Connector>,
    pub(crate) state: AtomicConnectionState,
    pub(crate) metrics: AtomicMetrics,
    pub(crate) replies: ReplyTable,
    pub(crate) hub: EventHub,
    ids: PacketIdAllocator,
    /// Send gate: at most one frame write in flight
    writer: Mutex<Option<ActiveWriter>>,
    /// Wakes a write in flight when its connection ends
    write_cancel: Notify,
    receiver: parking_lot::Mutex<Option<ReceiveHandle>>,
}

impl ClientInner {
    /// Clear the connection flags and notify subscribers, once per epoch
    pub(crate) fn signal_disconnect(&self, epoch: u64, reason: DisconnectReason) {
        if !self.state.end_connection(epoch) {
            debug!("Disconnect for stale connection {} ignored ({})", epoch, reason);
            return;
        }

        self.write_cancel.notify_waiters();

        let abandoned = self.replies.abandon_all();
        if abandoned > 0 {
            debug!("Abandoned {} pending replies", abandoned);
        }

        match reason {
            DisconnectReason::NormalClosure => info!("Disconnected: {}", reason),
            _ => warn!("Disconnected: {}", reason),
        }
        self.hub.disconnects.publish(reason);
    }

    /// Close and drop the write half if it still belongs to `epoch`
    pub(crate) async fn release_writer(&self, epoch: u64) {
        let released = {
            let mut writer = self.writer.lock().await;
            if writer.as_ref().map(|w| w.epoch) == Some(epoch) {
                writer.take()
            } else {
                None
            }
        };

        if let Some(mut active) = released {
            close_sink(active.sink.as_mut()).await;
        }
    }
}

/// Best-effort close handshake; errors and timeouts are only logged
async fn close_sink(sink: &mut dyn FrameSink) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error while closing socket: {}", e),
        Err(_) => debug!("Close handshake timed out after {:?}", CLOSE_TIMEOUT),
    }
}

/// WebSocket protocol client
///
/// Owns one socket at a time. Outbound packets go through a single send
/// gate; a background receive loop decodes inbound messages, completes
/// pending requests and fans notifications out to subscribers.
///
/// ```text
/// send / send_and_listen ──> id assignment ──> send gate ──> FrameSink
///                                   │
///                              ReplyTable <── receive loop <── FrameSource
///                                                  │
///                        methods / replies / events / disconnects ──> subscribers
/// ```
///
/// The handle is cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<ClientInner>,
}

impl WebSocketClient {
    /// Create a client from configuration
    ///
    /// Use `livesocket::builder()` to create a client.
    pub(crate) fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                state: AtomicConnectionState::new(),
                metrics: AtomicMetrics::new(),
                replies: ReplyTable::new(),
                hub: EventHub::new(),
                ids: PacketIdAllocator::new(),
                writer: Mutex::new(None),
                write_cancel: Notify::new(),
                receiver: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Open the socket and start the receive loop in the background
    ///
    /// Returns as soon as the connection is established. Handshake failures,
    /// including HTTP-level rejections, are returned to the caller.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.inner.state.is_connected() {
            return Err(LiveSocketError::InvalidState("client is already connected".into()));
        }

        let headers = match &self.inner.config.headers {
            Some(provider) => provider.get_headers().await,
            None => Headers::new(),
        };

        let (sink, source) = match self.inner.connector.connect(endpoint, &headers).await {
            Ok(halves) => halves,
            Err(e) => {
                warn!("Failed to connect to {}: {}", endpoint, e);
                return Err(e);
            }
        };

        let epoch = {
            let mut writer = self.inner.writer.lock().await;
            if self.inner.state.is_connected() {
                return Err(LiveSocketError::InvalidState(
                    "client connected concurrently".into(),
                ));
            }
            let epoch = self.inner.state.begin_connection();
            *writer = Some(ActiveWriter { epoch, sink });
            epoch
        };

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(receive_loop(
            Arc::clone(&self.inner),
            source,
            epoch,
            Arc::clone(&shutdown),
        ));

        if let Some(previous) = self.inner.receiver.lock().replace(ReceiveHandle { shutdown, task }) {
            // Loop of an earlier connection that already ended on its own
            previous.shutdown.notify_one();
        }

        info!("Connected to {}", endpoint);
        Ok(())
    }

    /// Close the connection
    ///
    /// Best effort: close errors are logged and swallowed, the socket is
    /// released unconditionally, and calling this more than once is harmless.
    /// A write stuck on the socket is abandoned with
    /// [`LiveSocketError::ConnectionClosed`]. Subscribers see the disconnect
    /// before this returns.
    pub async fn disconnect(&self) {
        let state = self.inner.state.get();
        if state.connected {
            self.inner.signal_disconnect(state.epoch, DisconnectReason::NormalClosure);
        }

        let active = self.inner.writer.lock().await.take();
        if let Some(mut active) = active {
            close_sink(active.sink.as_mut()).await;
        }

        let receiver = self.inner.receiver.lock().take();
        if let Some(receiver) = receiver {
            receiver.shutdown.notify_one();
            if let Err(e) = receiver.task.await {
                debug!("Receive loop ended abnormally: {}", e);
            }
        }
    }

    /// Send a packet
    ///
    /// Assigns a correlation id if the packet has none and returns it. Fails
    /// with [`LiveSocketError::NotConnected`] / [`LiveSocketError::NotAuthenticated`]
    /// before any I/O when the preconditions do not hold.
    ///
    /// A write that finds the socket unusable is reported as a disconnect and
    /// is not returned as an error.
    pub async fn send(&self, packet: &mut WebSocketPacket, require_authenticated: bool) -> Result<u32> {
        self.check_ready(require_authenticated)?;
        self.assign_id(packet);

        let text = packet.to_json()?;

        let mut writer = self.inner.writer.lock().await;
        let Some(active) = writer.as_mut() else {
            return Err(LiveSocketError::NotConnected);
        };

        // Registered before the state check so a disconnect in between still wakes us
        let cancelled = self.inner.write_cancel.notified();
        tokio::pin!(cancelled);
        let state = self.inner.state.get();
        if !state.connected || state.epoch != active.epoch {
            return Err(LiveSocketError::NotConnected);
        }

        let outcome = tokio::select! {
            result = active.sink.send_text(text) => result,
            _ = &mut cancelled => Err(LiveSocketError::ConnectionClosed(
                "connection ended while writing".into(),
            )),
        };

        match outcome {
            Ok(()) => {}
            Err(LiveSocketError::SocketUnusable(cause)) => {
                let epoch = active.epoch;
                *writer = None;
                drop(writer);
                warn!("Socket unusable while sending packet {}: {}", packet.id, cause);
                self.inner.signal_disconnect(epoch, DisconnectReason::Unknown);
                return Ok(packet.id);
            }
            Err(e) => return Err(e),
        }
        drop(writer);

        self.inner.metrics.increment_sent();
        debug!("Sent packet {}", packet.id);
        self.inner.hub.packet_sent.publish(packet.clone());

        Ok(packet.id)
    }

    /// Send a packet and wait for the reply carrying its id
    ///
    /// Waits up to the configured reply timeout (5 s by default). `Ok(None)`
    /// means the server never answered; an answer is always returned as-is,
    /// error payload included.
    pub async fn send_and_listen(
        &self,
        packet: &mut WebSocketPacket,
        require_authenticated: bool,
    ) -> Result<Option<ReplyPacket>> {
        let timeout = self.inner.config.reply_timeout;
        self.send_and_listen_with_timeout(packet, require_authenticated, timeout)
            .await
    }

    /// [`send_and_listen`](Self::send_and_listen) with an explicit wait ceiling
    pub async fn send_and_listen_with_timeout(
        &self,
        packet: &mut WebSocketPacket,
        require_authenticated: bool,
        timeout: Duration,
    ) -> Result<Option<ReplyPacket>> {
        self.check_ready(require_authenticated)?;
        self.assign_id(packet);
        let pending = self.inner.replies.register(packet.id)?;

        if let Err(e) = self.send(packet, require_authenticated).await {
            self.inner.replies.remove(packet.id);
            return Err(e);
        }

        Ok(self.inner.replies.wait(pending, timeout).await)
    }

    /// Send a packet and decode the reply's `result` (or `data`) into `T`
    ///
    /// An error reply becomes [`LiveSocketError::Reply`]; it is never turned
    /// into a value. No reply, or a reply without payload, is `Ok(None)`.
    pub async fn send_and_listen_as<T: DeserializeOwned>(
        &self,
        packet: &mut WebSocketPacket,
        require_authenticated: bool,
    ) -> Result<Option<T>> {
        match self.send_and_listen(packet, require_authenticated).await? {
            Some(reply) => reply.into_result(),
            None => Ok(None),
        }
    }

    /// Record the outcome of the caller's authentication handshake
    ///
    /// Ignored while disconnected; every disconnect clears it again.
    pub fn set_authenticated(&self, authenticated: bool) -> bool {
        self.inner.state.set_authenticated(authenticated)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.is_authenticated()
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Number of requests currently waiting for a reply
    pub fn pending_replies(&self) -> usize {
        self.inner.replies.len()
    }

    pub fn subscribe_packet_sent(&self) -> Receiver<WebSocketPacket> {
        self.inner.hub.packet_sent.subscribe()
    }

    pub fn subscribe_methods(&self) -> Receiver<MethodPacket> {
        self.inner.hub.methods.subscribe()
    }

    /// Every inbound reply, matched or not
    pub fn subscribe_replies(&self) -> Receiver<ReplyPacket> {
        self.inner.hub.replies.subscribe()
    }

    pub fn subscribe_events(&self) -> Receiver<EventPacket> {
        self.inner.hub.events.subscribe()
    }

    pub fn subscribe_disconnects(&self) -> Receiver<DisconnectReason> {
        self.inner.hub.disconnects.subscribe()
    }

    fn check_ready(&self, require_authenticated: bool) -> Result<()> {
        let state = self.inner.state.get();
        if !state.connected {
            return Err(LiveSocketError::NotConnected);
        }
        if require_authenticated && !state.authenticated {
            return Err(LiveSocketError::NotAuthenticated);
        }
        Ok(())
    }

    fn assign_id(&self, packet: &mut WebSocketPacket) {
        if packet.id == 0 {
            let replies = &self.inner.replies;
            packet.id = self.inner.ids.allocate(|id| replies.contains(id));
        }
    }
}
