//! MQTT 3.1 client engine.
//!
//! ## Structure
//!
//! A [`Client`] owns the connection state machine, the QoS bookkeeping and a
//! callback table with one slot per packet type. [`Client::connect`] opens
//! the transport and sends CONNECT; [`Client::run`] then drives everything
//! else: it reads packets, answers the QoS 1 and 2 exchanges, writes pings
//! on the keep alive schedule and reconnects with a growing delay when the
//! connection is lost.
//!
//! Handlers run inside [`Client::run`] and get `&mut Client` back, so they
//! can publish, subscribe or stop the engine directly. Packets written from
//! a handler are queued and go out before the engine waits for the next
//! event.
//!
//! ## Examples
//!
//! ```no_run
//! # tokio_test::block_on(async move {
//! use mqttc::client::{Client, ClientConfig, ConnectionState, Event};
//! use mqttc::packet::{PacketType, QoS};
//!
//! let mut client = Client::new(ClientConfig::new("test.mosquitto.org", "demo-client"));
//! client.on(PacketType::Connect, |client, event| {
//!     if matches!(event, Event::ConnectionState(ConnectionState::Connected)) {
//!         client.subscribe("demo/topic", QoS::AtLeastOnce).unwrap();
//!     }
//! });
//! client.on_message(|_, message| {
//!     println!("{}: {:?}", message.topic, message.payload);
//! });
//!
//! client.connect().await.unwrap();
//! println!("Run result: {:?}", client.run().await);
//! # });
//! ```

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use crate::codec::{CodecError, Framed};
use crate::transport::{AsyncStream, Connector, TcpConnector};

mod keep_alive;
mod packet_id;
mod reconnect;

use keep_alive::{KeepAlive, KeepAliveTimer};
use packet_id::{PacketIds, Qos2State};
use reconnect::Backoff;

pub use crate::packet::{
    ConnectReturnCode, LastWill, Login, PacketType, Publish, QoS, SubscribeReasonCode,
};

use crate::packet::{
    ConnAck, Connect, Packet, PubAck, PubComp, PubRec, PubRel, Subscribe, Unsubscribe,
};

/// Errors reported by the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("MQTT protocol error {0}")]
    ProtocolError(crate::packet::Error),
    #[error("MQTT connect rejected: {0:?}")]
    ConnectionRejected(ConnectReturnCode),
    #[error("operation requires a connection")]
    NotConnected,
    #[error("connection attempt while already connected")]
    AlreadyConnected,
    #[error("no response from the broker within the keep alive deadline")]
    KeepAliveTimeout,
    #[error("connection closed by the broker")]
    ConnectionClosed,
}

impl From<CodecError> for Error {
    fn from(v: CodecError) -> Self {
        match v {
            CodecError::IoError(e) => Self::IoError(e),
            CodecError::ProtocolError(e) => Self::ProtocolError(e),
        }
    }
}

/// Externally visible lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Init,
    /// Transport open, CONNECT sent, CONNACK outstanding.
    Connecting,
    /// CONNACK accepted the session.
    Connected,
    /// Down, voluntarily or not.
    Disconnected,
}

/// What a callback is being told about.
///
/// Lifecycle changes arrive through the CONNECT slot; everything else is
/// dispatched to the slot of the packet that was read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection changed state.
    ConnectionState(ConnectionState),
    /// CONNACK arrived with this return code.
    ConnAck(ConnectReturnCode),
    /// PUBLISH was written, with the packet id used (0 for QoS 0).
    Publish { pkid: u16, topic: String },
    /// PUBACK arrived for this id.
    PubAck(u16),
    /// PUBREC arrived for this id.
    PubRec(u16),
    /// PUBREL arrived for this id.
    PubRel(u16),
    /// PUBCOMP arrived for this id.
    PubComp(u16),
    /// SUBSCRIBE was written.
    Subscribe { pkid: u16, topic: String },
    /// SUBACK arrived with the granted codes.
    SubAck {
        pkid: u16,
        return_codes: Vec<SubscribeReasonCode>,
    },
    /// UNSUBSCRIBE was written.
    Unsubscribe { pkid: u16, topic: String },
    /// UNSUBACK arrived for this id.
    UnsubAck(u16),
    /// PINGREQ was written.
    PingReq,
    /// PINGRESP arrived.
    PingResp,
    /// The connection was torn down.
    Disconnect,
}

type EventHandler = Box<dyn FnMut(&mut Client, &Event) + Send>;
type MessageHandler = Box<dyn FnMut(&mut Client, Publish) + Send>;

// Slot 0 is unused; packet types index 1 through 14 directly.
const CALLBACK_SLOTS: usize = 15;

struct Callbacks {
    slots: [Option<EventHandler>; CALLBACK_SLOTS],
    message: Option<MessageHandler>,
}

impl Callbacks {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            message: None,
        }
    }
}

/// Connection settings for a [`Client`].
///
/// Defaults: port 1883, keep alive 60 seconds, clean session off, no
/// credentials, no will, reconnect delays ramping from 2 minutes with a
/// three attempt cap.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mqttc::client::ClientConfig;
///
/// let mut config = ClientConfig::new("broker.local", "sensor-42");
/// config
///     .set_port(8883)
///     .set_keep_alive(Duration::from_secs(30))
///     .set_clean_session(true);
/// assert_eq!(config.keep_alive(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    server: String,
    port: u16,
    client_id: String,
    login: Option<Login>,
    keep_alive: Duration,
    clean_session: bool,
    last_will: Option<LastWill>,
    reconnect_base: Duration,
    reconnect_cap: u32,
}

impl ClientConfig {
    pub fn new<S: Into<String>, C: Into<String>>(server: S, client_id: C) -> ClientConfig {
        ClientConfig {
            server: server.into(),
            port: 1883,
            client_id: client_id.into(),
            login: None,
            keep_alive: Duration::from_secs(60),
            clean_session: false,
            last_will: None,
            reconnect_base: Duration::from_secs(60),
            reconnect_cap: 3,
        }
    }

    pub fn set_server<S: Into<String>>(&mut self, server: S) -> &mut Self {
        self.server = server.into();
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_client_id<C: Into<String>>(&mut self, client_id: C) -> &mut Self {
        self.client_id = client_id.into();
        self
    }

    pub fn set_credentials<U: Into<String>, P: Into<String>>(
        &mut self,
        user: U,
        password: P,
    ) -> &mut Self {
        self.login = Some(Login::new(user, password));
        self
    }

    /// Ping period. Values above `u16::MAX` seconds are clamped when the
    /// CONNECT is built; zero disables keep alive handling entirely.
    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    pub fn set_last_will(&mut self, will: LastWill) -> &mut Self {
        self.last_will = Some(will);
        self
    }

    pub fn clear_last_will(&mut self) -> &mut Self {
        self.last_will = None;
        self
    }

    /// Reconnect delay ramp: attempt `n` waits `2 * n * base`, and `n` wraps
    /// back to 1 past `cap`. Takes effect when the client is built.
    pub fn set_reconnect_backoff(&mut self, base: Duration, cap: u32) -> &mut Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn as_connect(&self) -> Connect {
        let mut connect = Connect::new(self.client_id.as_str());
        connect.keep_alive = self.keep_alive.as_secs().min(u16::MAX as u64) as u16;
        connect.clean_session = self.clean_session;
        connect.last_will = self.last_will.clone();
        connect.login = self.login.clone();
        connect
    }
}

enum Wakeup {
    Frame(Option<Result<Packet, CodecError>>),
    KeepAlive(KeepAlive),
}

/// MQTT 3.1 client.
///
/// See the [module documentation](self) for how the pieces fit together.
pub struct Client {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    state: ConnectionState,
    net: Option<Framed<Box<dyn AsyncStream>>>,
    keep_alive: KeepAliveTimer,
    packet_ids: PacketIds,
    qos2: Qos2State,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
    closing: bool,
    last_error: Option<String>,
    callbacks: Callbacks,
}

impl Client {
    /// Client over plain TCP.
    pub fn new(config: ClientConfig) -> Client {
        Self::with_connector(config, TcpConnector)
    }

    /// Client over a custom transport.
    pub fn with_connector<C: Connector + 'static>(config: ClientConfig, connector: C) -> Client {
        let backoff = Backoff::new(config.reconnect_base, config.reconnect_cap);
        Client {
            config,
            connector: Box::new(connector),
            state: ConnectionState::Init,
            net: None,
            keep_alive: KeepAliveTimer::new(),
            packet_ids: PacketIds::new(),
            qos2: Qos2State::new(),
            backoff,
            reconnect_at: None,
            closing: false,
            last_error: None,
            callbacks: Callbacks::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Why the last involuntary disconnect or rejection happened.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Settings applied at the next CONNECT.
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    /// Register the handler for one packet type slot, replacing any previous
    /// one. The CONNECT slot also receives [`Event::ConnectionState`]
    /// changes.
    pub fn on<F>(&mut self, packet_type: PacketType, handler: F) -> &mut Self
    where
        F: FnMut(&mut Client, &Event) + Send + 'static,
    {
        self.callbacks.slots[packet_type as usize] = Some(Box::new(handler));
        self
    }

    /// Register the handler for application messages released by the QoS
    /// flows.
    pub fn on_message<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&mut Client, Publish) + Send + 'static,
    {
        self.callbacks.message = Some(Box::new(handler));
        self
    }

    /// Open the transport and send CONNECT.
    ///
    /// Valid from `Init` and `Disconnected`. On failure the error is
    /// returned directly, the state is left untouched and no retry is
    /// scheduled; on success the client is `Connecting` until the broker
    /// answers, which [`run`](Self::run) waits for.
    pub async fn connect(&mut self) -> Result<(), Error> {
        match self.state {
            ConnectionState::Init | ConnectionState::Disconnected => {}
            _ => return Err(Error::AlreadyConnected),
        }

        self.reconnect_at = None;
        self.connect_inner().await
    }

    async fn connect_inner(&mut self) -> Result<(), Error> {
        log::debug!("Connecting to {}:{}", self.config.server, self.config.port);
        let stream = self
            .connector
            .connect(&self.config.server, self.config.port)
            .await?;
        // The transport came up, so the backoff ramp starts over
        self.backoff.reset();

        let mut net = Framed::new(stream);
        log::debug!("Sending CONNECT");
        net.queue(&Packet::Connect(self.config.as_connect()))?;
        futures::SinkExt::<&Packet>::flush(&mut net).await?;

        self.net = Some(net);
        // Armed from CONNECT onwards: the deadline also bounds the wait for
        // the CONNACK itself
        self.keep_alive.arm(self.config.keep_alive);
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Drive the connection until it ends.
    ///
    /// Processes inbound packets, runs handlers, writes pings and performs
    /// scheduled reconnects. Returns `Ok` once the client disconnects
    /// voluntarily and `Err` when the broker rejects the session in its
    /// CONNACK. A lost connection is not an exit; it schedules a reconnect
    /// and keeps going.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            if self.closing {
                self.closing = false;
                if let Err(e) = self.flush().await {
                    log::debug!("Failed to flush DISCONNECT: {}", e);
                }
                self.teardown();
                return Ok(());
            }

            match self.state {
                ConnectionState::Init => return Err(Error::NotConnected),
                ConnectionState::Connecting | ConnectionState::Connected => {
                    self.drive().await?;
                }
                ConnectionState::Disconnected => match self.reconnect_at {
                    Some(at) => {
                        tokio::time::sleep_until(at).await;
                        self.reconnect_at = None;
                        self.try_reconnect().await;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// One turn of the engine: flush queued writes, then wait for the next
    /// packet or timer and process it.
    async fn drive(&mut self) -> Result<(), Error> {
        if let Err(e) = self.flush().await {
            self.connection_lost(e);
            return Ok(());
        }

        let wakeup = {
            let net = match self.net.as_mut() {
                Some(net) => net,
                None => return Err(Error::NotConnected),
            };
            tokio::select! {
                frame = net.next() => Wakeup::Frame(frame),
                tick = self.keep_alive.wait() => Wakeup::KeepAlive(tick),
            }
        };

        match wakeup {
            Wakeup::Frame(Some(Ok(packet))) => self.handle_packet(packet)?,
            Wakeup::Frame(Some(Err(e))) => {
                log::error!("Connection failed: {}", e);
                self.connection_lost(e.into());
            }
            Wakeup::Frame(None) => {
                log::error!("Connection closed by the broker");
                self.connection_lost(Error::ConnectionClosed);
            }
            Wakeup::KeepAlive(KeepAlive::PingRequest) => {
                // Fires during the CONNACK wait as well; only ping once up
                if self.state == ConnectionState::Connected {
                    self.ping()?;
                }
            }
            Wakeup::KeepAlive(KeepAlive::PingResponseDeadline) => {
                log::error!("Ping response deadline reached");
                self.connection_lost(Error::KeepAliveTimeout);
            }
        }

        Ok(())
    }

    async fn try_reconnect(&mut self) {
        if let Err(e) = self.connect_inner().await {
            let delay = self.backoff.next_delay();
            log::warn!("Reconnect attempt failed: {}; retrying in {:?}", e, delay);
            self.last_error = Some(e.to_string());
            self.reconnect_at = Some(Instant::now() + delay);
        }
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<(), Error> {
        self.keep_alive.touch();
        match packet {
            Packet::ConnAck(ack) => return self.handle_connack(ack),
            Packet::Publish(publish) => self.handle_publish(publish)?,
            Packet::PubAck(ack) => {
                log::debug!("PUBACK received for {}", ack.pkid);
                self.dispatch(PacketType::PubAck, Event::PubAck(ack.pkid));
            }
            Packet::PubRec(ack) => self.handle_pubrec(ack.pkid)?,
            Packet::PubRel(rel) => self.handle_pubrel(rel.pkid)?,
            Packet::PubComp(ack) => {
                if !self.qos2.completed(ack.pkid) {
                    log::warn!("Received PUBCOMP for unknown packet id {}", ack.pkid);
                }
                self.dispatch(PacketType::PubComp, Event::PubComp(ack.pkid));
            }
            Packet::SubAck(ack) => {
                log::debug!("SUBACK received for {}: {:?}", ack.pkid, ack.return_codes);
                self.dispatch(
                    PacketType::SubAck,
                    Event::SubAck {
                        pkid: ack.pkid,
                        return_codes: ack.return_codes,
                    },
                );
            }
            Packet::UnsubAck(ack) => {
                log::debug!("UNSUBACK received for {}", ack.pkid);
                self.dispatch(PacketType::UnsubAck, Event::UnsubAck(ack.pkid));
            }
            Packet::PingResp => {
                log::debug!("PINGRESP received");
                self.dispatch(PacketType::PingResp, Event::PingResp);
            }
            Packet::Disconnect => {
                // Brokers do not send DISCONNECT in 3.1; treat it as a close
                log::debug!("DISCONNECT received");
                self.connection_lost(Error::ConnectionClosed);
            }
            packet => {
                log::warn!("Ignoring unexpected {:?}", packet);
            }
        }
        Ok(())
    }

    fn handle_connack(&mut self, ack: ConnAck) -> Result<(), Error> {
        log::debug!("CONNACK received: {:?}", ack.code);
        if self.state != ConnectionState::Connecting {
            log::warn!("Ignoring CONNACK outside of the handshake");
            return Ok(());
        }

        if ack.code == ConnectReturnCode::Success {
            self.set_state(ConnectionState::Connected);
            self.dispatch(PacketType::ConnAck, Event::ConnAck(ack.code));
            Ok(())
        } else {
            // Rejection is final: report it, tear down and leave retries to
            // the caller
            self.last_error = Some(Error::ConnectionRejected(ack.code).to_string());
            self.dispatch(PacketType::ConnAck, Event::ConnAck(ack.code));
            self.teardown();
            Err(Error::ConnectionRejected(ack.code))
        }
    }

    fn handle_publish(&mut self, publish: Publish) -> Result<(), Error> {
        log::debug!("Received {:?}", publish);
        match publish.qos {
            QoS::AtMostOnce => self.dispatch_message(publish),
            QoS::AtLeastOnce => {
                // Ack first so it is on the wire ahead of anything the
                // handler writes
                log::debug!("Sending PUBACK for {}", publish.pkid);
                self.queue(&Packet::PubAck(PubAck::new(publish.pkid)))?;
                self.dispatch_message(publish);
            }
            QoS::ExactlyOnce => {
                log::debug!("Sending PUBREC for {}", publish.pkid);
                self.queue(&Packet::PubRec(PubRec::new(publish.pkid)))?;
                self.qos2.stash(publish);
            }
        }
        Ok(())
    }

    fn handle_pubrec(&mut self, pkid: u16) -> Result<(), Error> {
        if !self.qos2.recorded(pkid) {
            log::warn!("Received PUBREC for unknown packet id {}", pkid);
        }
        log::debug!("Sending PUBREL for {}", pkid);
        self.queue(&Packet::PubRel(PubRel::new(pkid)))?;
        self.dispatch(PacketType::PubRec, Event::PubRec(pkid));
        Ok(())
    }

    fn handle_pubrel(&mut self, pkid: u16) -> Result<(), Error> {
        log::debug!("Sending PUBCOMP for {}", pkid);
        self.queue(&Packet::PubComp(PubComp::new(pkid)))?;
        self.dispatch(PacketType::PubRel, Event::PubRel(pkid));
        match self.qos2.release(pkid) {
            Some(publish) => self.dispatch_message(publish),
            None => log::warn!("Received PUBREL for unknown packet id {}", pkid),
        }
        Ok(())
    }

    /// Queue a PUBLISH, assigning a packet id when the message needs one and
    /// carries none. Returns the id used (0 for QoS 0).
    ///
    /// The write goes out before the engine next sleeps. There is no
    /// outbound retransmission store: an unacknowledged QoS 1 or 2 message
    /// is not redelivered after a reconnect.
    pub fn publish(&mut self, mut publish: Publish) -> Result<u16, Error> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        if publish.qos != QoS::AtMostOnce && publish.pkid == 0 {
            publish.pkid = self.packet_ids.allocate();
        }
        let pkid = match publish.qos {
            QoS::AtMostOnce => 0,
            _ => publish.pkid,
        };

        log::debug!(
            "Publishing {} bytes to {} as {:?}",
            publish.payload.len(),
            publish.topic,
            publish.qos
        );
        if publish.qos == QoS::ExactlyOnce {
            self.qos2.sent(pkid);
        }
        let topic = publish.topic.clone();
        self.queue(&Packet::Publish(publish))?;
        self.dispatch(PacketType::Publish, Event::Publish { pkid, topic });
        Ok(pkid)
    }

    /// Queue a SUBSCRIBE for one topic filter. Returns the packet id.
    pub fn subscribe<S: Into<String>>(&mut self, topic: S, qos: QoS) -> Result<u16, Error> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let topic = topic.into();
        let mut subscribe = Subscribe::new(topic.as_str(), qos);
        subscribe.pkid = self.packet_ids.allocate();
        let pkid = subscribe.pkid;

        log::debug!("Subscribing to {} with {:?} as {}", topic, qos, pkid);
        self.queue(&Packet::Subscribe(subscribe))?;
        self.dispatch(PacketType::Subscribe, Event::Subscribe { pkid, topic });
        Ok(pkid)
    }

    /// Queue an UNSUBSCRIBE for one topic. Returns the packet id.
    pub fn unsubscribe<S: Into<String>>(&mut self, topic: S) -> Result<u16, Error> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let topic = topic.into();
        let mut unsubscribe = Unsubscribe::new(topic.as_str());
        unsubscribe.pkid = self.packet_ids.allocate();
        let pkid = unsubscribe.pkid;

        log::debug!("Unsubscribing from {} as {}", topic, pkid);
        self.queue(&Packet::Unsubscribe(unsubscribe))?;
        self.dispatch(PacketType::Unsubscribe, Event::Unsubscribe { pkid, topic });
        Ok(pkid)
    }

    /// Queue a PINGREQ. The keep alive schedule does this automatically.
    pub fn ping(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        log::debug!("Writing ping request");
        self.queue(&Packet::PingReq)?;
        self.dispatch(PacketType::PingReq, Event::PingReq);
        Ok(())
    }

    /// Close the connection.
    ///
    /// Writes DISCONNECT when the transport is still up, cancels any pending
    /// reconnect and reports the teardown. Calling it again once
    /// disconnected does nothing.
    pub async fn disconnect(&mut self) {
        self.reconnect_at = None;
        if self.net.is_none() {
            return;
        }

        log::debug!("Sending DISCONNECT");
        if let Some(net) = self.net.as_mut() {
            if let Err(e) = net.queue(&Packet::Disconnect) {
                log::debug!("Failed to queue DISCONNECT: {}", e);
            }
        }
        if let Err(e) = self.flush().await {
            log::debug!("Failed to flush DISCONNECT: {}", e);
        }
        self.teardown();
    }

    /// Ask a running engine to disconnect and return.
    ///
    /// Meant for handlers, which cannot await [`disconnect`](Self::disconnect).
    /// DISCONNECT is queued immediately; [`run`](Self::run) flushes it and
    /// finishes the teardown.
    pub fn stop(&mut self) {
        self.reconnect_at = None;
        self.closing = true;
        if let Some(net) = self.net.as_mut() {
            if let Err(e) = net.queue(&Packet::Disconnect) {
                log::debug!("Failed to queue DISCONNECT: {}", e);
            }
        }
    }

    fn queue(&mut self, packet: &Packet) -> Result<(), Error> {
        match self.net.as_mut() {
            Some(net) => {
                net.queue(packet)?;
                Ok(())
            }
            None => Err(Error::NotConnected),
        }
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if let Some(net) = self.net.as_mut() {
            if net.has_queued() {
                futures::SinkExt::<&Packet>::flush(net).await?;
            }
        }
        Ok(())
    }

    fn connection_lost(&mut self, error: Error) {
        let delay = self.backoff.next_delay();
        log::warn!("Connection lost: {}; reconnecting in {:?}", error, delay);
        self.last_error = Some(error.to_string());
        self.reconnect_at = Some(Instant::now() + delay);
        self.teardown();
    }

    /// Drop the transport and report the disconnect. Safe to call twice.
    fn teardown(&mut self) {
        if self.net.is_none() && self.state == ConnectionState::Disconnected {
            return;
        }

        self.net = None;
        self.keep_alive.disarm();
        self.qos2.reset();
        self.set_state(ConnectionState::Disconnected);
        self.dispatch(PacketType::Disconnect, Event::Disconnect);
    }

    fn set_state(&mut self, state: ConnectionState) {
        log::debug!("Connection state: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.dispatch(PacketType::Connect, Event::ConnectionState(state));
    }

    /// Invoke the slot handler for `packet_type`.
    ///
    /// The slot is emptied for the duration of the call, so a handler is
    /// never invoked re-entrantly; one registered from inside the call wins
    /// over putting the old one back.
    fn dispatch(&mut self, packet_type: PacketType, event: Event) {
        let slot = packet_type as usize;
        if let Some(mut handler) = self.callbacks.slots[slot].take() {
            handler(self, &event);
            if self.callbacks.slots[slot].is_none() {
                self.callbacks.slots[slot] = Some(handler);
            }
        }
    }

    fn dispatch_message(&mut self, publish: Publish) {
        if let Some(mut handler) = self.callbacks.message.take() {
            handler(self, publish);
            if self.callbacks.message.is_none() {
                self.callbacks.message = Some(handler);
            }
        }
    }
}
