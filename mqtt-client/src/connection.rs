//! Connection FSM (component D): owns the transport, drives CONNECT /
//! keep-alive / reconnect / DISCONNECT, and dispatches inbound packets to
//! the request tracker or the topic tree. Runs as a single `tokio` task;
//! every public operation reaches it by sending a `Command` over an `mpsc`
//! channel, so the FSM itself never needs a lock — it's the only place that
//! touches its own state, the literal Rust analogue of the teacher's
//! "single event-loop thread owns the channel" model.

use std::collections::HashMap;
use std::time::Duration;

use bytes::BytesMut;
use futures::future::{pending, FutureExt};
use log::{debug, error, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

use mqtt_core::codec::{
    ConnAckPacket, ConnectPacket, Decode, Encode, MqttPacket, PingReqPacket, PubAckPacket, PubCompPacket,
    PubRecPacket, PubRelPacket, PublishPacket, SubAckPacket, SubscribePacket, UnsubAckPacket, UnsubscribePacket,
};
use mqtt_core::qos::QosLevel;
use mqtt_core::topic::{TopicFilter, TopicName, TopicTree};
use mqtt_core::ConnectReturnCode;

use crate::error::{ClientError, ErrorKind};
use crate::options::ConnectOptions;
use crate::request::{OutboundKind, OutstandingRequest, QosTwoStage, RequestTracker};
use crate::transport::{Connector, Transport};

type Completion = Box<dyn FnOnce(Result<(), ClientError>) + Send>;
type SubscribeCallback = Box<dyn FnMut(&str, &[u8]) + Send>;
type Cleanup = Box<dyn FnOnce() + Send>;

/// Boxed closures for the lifecycle events the core exposes to callers.
/// Empty by default; `MqttClient::connect` fills in whatever the caller
/// supplied.
#[derive(Default)]
pub struct Handlers {
    pub on_connection_complete: Option<Box<dyn FnMut(Result<(), ClientError>) + Send>>,
    pub on_disconnect: Option<Box<dyn FnMut(Result<(), ClientError>) + Send>>,
    pub on_interrupted: Option<Box<dyn FnMut(ClientError) + Send>>,
    pub on_resumed: Option<Box<dyn FnMut(bool) + Send>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected,
}

pub enum Command {
    Subscribe {
        filter: TopicFilter,
        qos: QosLevel,
        callback: SubscribeCallback,
        cleanup: Option<Cleanup>,
        on_complete: Option<Completion>,
    },
    Unsubscribe {
        filter: TopicFilter,
        on_complete: Option<Completion>,
    },
    Publish {
        topic: TopicName,
        qos: QosLevel,
        retain: bool,
        payload: bytes::Bytes,
        on_complete: Option<Completion>,
    },
    Ping {
        on_complete: Option<Completion>,
    },
    Disconnect {
        on_complete: Option<Completion>,
    },
}

/// A PUBLISH held between PUBREC and PUBREL so QoS 2 delivery to
/// subscribers happens exactly once, after the handshake completes.
struct PendingQos2Delivery {
    topic: TopicName,
    payload: bytes::Bytes,
}

pub struct Connection {
    options: ConnectOptions,
    connector: Box<dyn Connector>,
    handlers: Handlers,
    commands: mpsc::Receiver<Command>,

    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    read_buf: BytesMut,

    tracker: RequestTracker,
    tree: TopicTree,
    incoming_qos2: HashMap<u16, PendingQos2Delivery>,

    connection_count: u64,
    reconnect_current: Duration,
    next_reconnect_attempt: Option<Instant>,

    keep_alive: Duration,
    next_keep_alive: Option<Instant>,
    awaiting_pingresp: bool,
    pingresp_deadline: Option<Instant>,
    pending_ping_complete: Option<Completion>,
}

impl Connection {
    pub fn new(
        options: ConnectOptions,
        connector: Box<dyn Connector>,
        handlers: Handlers,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let keep_alive = Duration::from_secs(options.keep_alive_secs as u64);
        let reconnect_current = options.reconnect_min;
        Self {
            connector,
            handlers,
            commands,
            state: ConnectionState::Connecting,
            transport: None,
            read_buf: BytesMut::with_capacity(4096),
            tracker: RequestTracker::new(options.request_timeout),
            tree: TopicTree::new(),
            incoming_qos2: HashMap::new(),
            connection_count: 0,
            reconnect_current,
            next_reconnect_attempt: None,
            keep_alive,
            next_keep_alive: None,
            awaiting_pingresp: false,
            pingresp_deadline: None,
            pending_ping_complete: None,
            options,
        }
    }

    /// The actor's run loop. Consumes `self`: once the caller stops polling
    /// this future (or it returns, which only happens after an orderly
    /// DISCONNECT), the connection is gone for good.
    pub async fn run(mut self) {
        self.open_transport().await;

        loop {
            let read_fut = match &mut self.transport {
                Some(t) => read_some(t, &mut self.read_buf).left_future(),
                None => pending().right_future(),
            };

            let reconnect_fut = match self.next_reconnect_attempt {
                Some(at) if self.state == ConnectionState::Reconnecting => sleep_until(at).left_future(),
                _ => pending().right_future(),
            };

            let keep_alive_fut = match self.next_keep_alive {
                Some(at) if self.state == ConnectionState::Connected => sleep_until(at).left_future(),
                _ => pending().right_future(),
            };

            let pingresp_timeout_fut = match self.pingresp_deadline {
                Some(at) if self.state == ConnectionState::Connected => sleep_until(at).left_future(),
                _ => pending().right_future(),
            };

            let retry_tick = if self.state == ConnectionState::Connected && !self.tracker.is_empty() {
                sleep(Duration::from_millis(250)).left_future()
            } else {
                pending().right_future()
            };

            tokio::select! {
                read_result = read_fut => {
                    match read_result {
                        Ok(0) | Err(_) => self.on_transport_down().await,
                        Ok(_) => self.process_inbound().await,
                    }
                }
                _ = reconnect_fut => self.open_transport().await,
                _ = keep_alive_fut => self.send_keep_alive_ping().await,
                _ = pingresp_timeout_fut => self.handle_pingresp_timeout().await,
                _ = retry_tick => self.retry_due_requests().await,
                maybe_command = self.commands.recv() => {
                    match maybe_command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // every client handle dropped: disconnect and exit.
                            self.handle_command(Command::Disconnect { on_complete: None }).await;
                        }
                    }
                }
            }

            if self.state == ConnectionState::Disconnected {
                break;
            }
        }
    }

    async fn open_transport(&mut self) {
        self.state = ConnectionState::Connecting;
        debug!("opening transport to {}:{}", self.options.host, self.options.port);
        match self.connector.connect().await {
            Ok(mut transport) => {
                let connect_packet = self.build_connect_packet();
                match connect_packet.encode() {
                    Ok(bytes) => {
                        if let Err(e) = transport.write_all(&bytes).await {
                            warn!("write of CONNECT failed: {e}");
                            self.schedule_reconnect();
                            return;
                        }
                        self.transport = Some(transport);
                    }
                    Err(e) => error!("failed to encode CONNECT: {e}"),
                }
            }
            Err(e) => {
                warn!("transport connect failed: {e}");
                self.schedule_reconnect();
            }
        }
    }

    fn build_connect_packet(&self) -> ConnectPacket {
        let mut packet = ConnectPacket::new(
            self.options.client_id.clone(),
            self.options.clean_session,
            self.options.keep_alive_secs,
        );
        if let Some(will) = &self.options.will {
            packet = packet.with_will(will.clone());
        }
        if let Some(username) = &self.options.username {
            packet = packet.with_credentials(username.clone(), self.options.password.clone());
        }
        packet
    }

    fn schedule_reconnect(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Reconnecting;
        self.next_reconnect_attempt = Some(Instant::now() + self.reconnect_current);
        debug!("next reconnect attempt in {:?}", self.reconnect_current);
        self.reconnect_current = (self.reconnect_current * 2).min(self.options.reconnect_max);
    }

    async fn on_transport_down(&mut self) {
        self.transport = None;
        match self.state {
            ConnectionState::Disconnecting => {
                self.state = ConnectionState::Disconnected;
                if let Some(cb) = self.handlers.on_disconnect.as_mut() {
                    cb(Ok(()));
                }
            }
            _ => {
                warn!("transport dropped unexpectedly in state {:?}", self.state);
                if let Some(cb) = self.handlers.on_interrupted.as_mut() {
                    cb(ClientError::new(ErrorKind::IoError(std::io::Error::from(std::io::ErrorKind::ConnectionReset)), String::from("transport closed")));
                }
                self.schedule_reconnect();
            }
        }
    }

    async fn process_inbound(&mut self) {
        loop {
            match MqttPacket::try_decode_from(&mut self.read_buf) {
                Ok(Some(packet)) => self.dispatch_inbound(packet).await,
                Ok(None) => break,
                Err(e) => {
                    error!("protocol error decoding inbound packet: {e}");
                    self.begin_disconnect(Some(ClientError::from(e))).await;
                    break;
                }
            }
        }
    }

    async fn dispatch_inbound(&mut self, packet: MqttPacket) {
        match packet {
            MqttPacket::ConnAck(ack) => self.handle_connack(ack).await,
            MqttPacket::Publish(publish) => self.handle_publish(publish).await,
            MqttPacket::PubAck(PubAckPacket { packet_id }) => self.complete_request(packet_id, Ok(())),
            MqttPacket::SubAck(SubAckPacket { packet_id, .. }) => self.complete_request(packet_id, Ok(())),
            MqttPacket::UnsubAck(UnsubAckPacket { packet_id }) => self.complete_request(packet_id, Ok(())),
            MqttPacket::PubComp(PubCompPacket { packet_id }) => self.complete_request(packet_id, Ok(())),
            MqttPacket::PubRec(PubRecPacket { packet_id }) => self.handle_pubrec(packet_id).await,
            MqttPacket::PubRel(PubRelPacket { packet_id }) => self.handle_pubrel(packet_id).await,
            MqttPacket::PingResp(_) => {
                self.awaiting_pingresp = false;
                self.pingresp_deadline = None;
                if let Some(cb) = self.pending_ping_complete.take() {
                    cb(Ok(()));
                }
            }
            MqttPacket::Disconnect(_) | MqttPacket::Connect(_) | MqttPacket::Subscribe(_) | MqttPacket::Unsubscribe(_) | MqttPacket::PingReq(_) => {
                warn!("received broker-invalid packet type, disconnecting");
                self.begin_disconnect(Some(ClientError::new(
                    ErrorKind::ProtocolError,
                    String::from("received a client-only packet type from the broker"),
                )))
                .await;
            }
        }
    }

    async fn handle_connack(&mut self, ack: ConnAckPacket) {
        if ack.return_code != ConnectReturnCode::Accept {
            warn!("CONNACK rejected: {}", ack.return_code);
            self.state = ConnectionState::Disconnected;
            self.transport = None;
            if let Some(cb) = self.handlers.on_connection_complete.as_mut() {
                cb(Err(ClientError::new(ErrorKind::ProtocolError, ack.return_code.to_string())));
            }
            self.tracker.fail_all(|| ClientError::new(ErrorKind::Cancelled, String::from("connection rejected")));
            return;
        }

        self.connection_count += 1;
        self.state = ConnectionState::Connected;
        self.reconnect_current = self.options.reconnect_min;
        self.next_reconnect_attempt = None;
        self.awaiting_pingresp = false;
        self.pingresp_deadline = None;
        self.arm_keep_alive();

        if self.connection_count == 1 {
            if let Some(cb) = self.handlers.on_connection_complete.as_mut() {
                cb(Ok(()));
            }
        } else if let Some(cb) = self.handlers.on_resumed.as_mut() {
            cb(ack.session_present);
        }

        self.drain_offline_queue().await;
    }

    async fn drain_offline_queue(&mut self) {
        let queued = self.tracker.drain_offline_queue();
        for request in queued {
            self.dispatch_outbound(request.kind, request.on_complete).await;
        }
    }

    async fn handle_publish(&mut self, publish: PublishPacket) {
        match publish.qos {
            QosLevel::AtMostOnce => {
                self.tree.publish(&publish.topic, &publish.payload);
            }
            QosLevel::AtLeastOnce => {
                self.tree.publish(&publish.topic, &publish.payload);
                if let Some(id) = publish.packet_id {
                    self.send_packet(PubAckPacket::new(id).encode()).await;
                }
            }
            QosLevel::ExactlyOnce => {
                if let Some(id) = publish.packet_id {
                    self.incoming_qos2.entry(id).or_insert(PendingQos2Delivery {
                        topic: publish.topic,
                        payload: publish.payload,
                    });
                    self.send_packet(PubRecPacket::new(id).encode()).await;
                }
            }
        }
    }

    async fn handle_pubrec(&mut self, packet_id: u16) {
        // PUBREC acks the PUBLISH; the request lives on until PUBCOMP, so
        // just advance its stage and answer with PUBREL here. A later retry
        // (due_for_retry) re-sends PUBREL rather than the original PUBLISH
        // once this stage is recorded.
        self.tracker.mark_pubrec_received(packet_id);
        self.send_packet(PubRelPacket::new(packet_id).encode()).await;
    }

    async fn handle_pubrel(&mut self, packet_id: u16) {
        if let Some(pending) = self.incoming_qos2.remove(&packet_id) {
            self.tree.publish(&pending.topic, &pending.payload);
        }
        self.send_packet(PubCompPacket::new(packet_id).encode()).await;
    }

    fn complete_request(&mut self, packet_id: u16, result: Result<(), ClientError>) {
        if let Some(OutstandingRequest { on_complete, .. }) = self.tracker.complete(packet_id) {
            if let Some(cb) = on_complete {
                cb(result);
            }
        } else {
            debug!("ack for unknown or already-completed packet id {packet_id}");
        }
    }

    fn arm_keep_alive(&mut self) {
        if !self.keep_alive.is_zero() {
            self.next_keep_alive = Some(Instant::now() + self.keep_alive);
        }
    }

    async fn send_keep_alive_ping(&mut self) {
        if self.awaiting_pingresp {
            // the previous probe's own deadline should have fired first;
            // guard against the periodic interval overlapping it anyway.
            self.handle_pingresp_timeout().await;
            return;
        }
        self.awaiting_pingresp = true;
        self.pingresp_deadline = Some(Instant::now() + self.options.request_timeout);
        self.send_packet(PingReqPacket::new().encode()).await;
        self.arm_keep_alive();
    }

    async fn handle_pingresp_timeout(&mut self) {
        warn!("keep-alive timeout: no PINGRESP received");
        self.pingresp_deadline = None;
        self.begin_disconnect(Some(ClientError::new(ErrorKind::Timeout, String::from("keep-alive timeout")))).await;
    }

    async fn retry_due_requests(&mut self) {
        for id in self.tracker.due_for_retry() {
            if let Some(request) = self.tracker.get(id) {
                let bytes = match (&request.kind, request.qos2_stage) {
                    (OutboundKind::Publish(_), Some(QosTwoStage::AwaitingPubComp)) => {
                        PubRelPacket::new(id).encode()
                    }
                    (OutboundKind::Publish(p), _) => {
                        let mut retried = p.clone();
                        retried.dup = true;
                        retried.encode()
                    }
                    (OutboundKind::Subscribe(p), _) => p.encode(),
                    (OutboundKind::Unsubscribe(p), _) => p.encode(),
                };
                self.send_packet(bytes).await;
            }
        }
    }

    async fn send_packet(&mut self, encoded: Result<bytes::Bytes, mqtt_core::err::EncodeError>) {
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode outbound packet: {e}");
                return;
            }
        };
        if let Some(transport) = &mut self.transport {
            if let Err(e) = transport.write_all(&bytes).await {
                warn!("write failed: {e}");
                self.on_transport_down().await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                filter,
                qos,
                callback,
                cleanup,
                on_complete,
            } => {
                let mut txn = mqtt_core::topic::tree::Transaction::default();
                if let Err(e) = self.tree.transaction_insert(&mut txn, &filter, qos, callback, cleanup) {
                    if let Some(cb) = on_complete {
                        cb(Err(ClientError::from(e)));
                    }
                    return;
                }
                self.tree.commit(txn);
                let kind = OutboundKind::Subscribe(SubscribePacket::new(0, vec![(filter, qos)]));
                self.dispatch_outbound(kind, on_complete).await;
            }
            Command::Unsubscribe { filter, on_complete } => {
                self.tree.remove(&filter);
                let kind = OutboundKind::Unsubscribe(UnsubscribePacket::new(0, vec![filter]));
                self.dispatch_outbound(kind, on_complete).await;
            }
            Command::Publish {
                topic,
                qos,
                retain,
                payload,
                on_complete,
            } => {
                let packet = PublishPacket::new(topic, qos, payload).with_retain(retain);
                if qos == QosLevel::AtMostOnce {
                    self.send_packet(packet.encode()).await;
                    if let Some(cb) = on_complete {
                        cb(Ok(()));
                    }
                } else {
                    self.dispatch_outbound(OutboundKind::Publish(packet), on_complete).await;
                }
            }
            Command::Ping { on_complete } => {
                if self.state != ConnectionState::Connected {
                    if let Some(cb) = on_complete {
                        cb(Err(ClientError::new(ErrorKind::Cancelled, String::from("not connected"))));
                    }
                    return;
                }
                self.pending_ping_complete = on_complete;
                self.awaiting_pingresp = true;
                self.send_packet(PingReqPacket::new().encode()).await;
            }
            Command::Disconnect { on_complete } => {
                self.begin_disconnect(None).await;
                if let Some(cb) = on_complete {
                    cb(Ok(()));
                }
            }
        }
    }

    /// Routes an outbound request through the tracker: sends it now if
    /// CONNECTED (allocating its packet id first), otherwise parks it in
    /// the offline queue for replay after the next CONNACK.
    async fn dispatch_outbound(&mut self, kind: OutboundKind, on_complete: Option<Completion>) {
        if self.state != ConnectionState::Connected {
            self.tracker.queue_offline(kind, on_complete);
            return;
        }

        let Some(id) = self.tracker.track(kind, on_complete) else {
            warn!("packet id space exhausted, dropping request");
            return;
        };
        let bytes = {
            let request = self.tracker.get(id).expect("just inserted");
            match &request.kind {
                OutboundKind::Publish(p) => p.clone().with_packet_id(id).encode(),
                OutboundKind::Subscribe(p) => SubscribePacket::new(id, p.filters.clone()).encode(),
                OutboundKind::Unsubscribe(p) => UnsubscribePacket::new(id, p.filters.clone()).encode(),
            }
        };
        self.send_packet(bytes).await;
    }

    async fn begin_disconnect(&mut self, error: Option<ClientError>) {
        self.state = ConnectionState::Disconnecting;
        self.next_reconnect_attempt = None;
        if let Some(transport) = &mut self.transport {
            let packet = mqtt_core::codec::DisconnectPacket::new();
            if let Ok(bytes) = packet.encode() {
                let _ = transport.write_all(&bytes).await;
            }
            let _ = transport.shutdown().await;
        }
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        self.tracker.fail_all(|| {
            error
                .as_ref()
                .map(|e| ClientError::new(ErrorKind::Cancelled, e.to_string()))
                .unwrap_or_else(|| ClientError::new(ErrorKind::Cancelled, String::from("disconnected")))
        });
        if let Some(cb) = self.handlers.on_disconnect.as_mut() {
            cb(error.map_or(Ok(()), Err));
        }
    }
}

async fn read_some(transport: &mut Box<dyn Transport>, buf: &mut BytesMut) -> std::io::Result<usize> {
    transport.read_buf(buf).await
}
