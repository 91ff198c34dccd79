//! Legacy notification channel.
//!
//! A parallel MQTT connection predating the certificate-based security
//! channel. It authenticates with a username derived from the app client id
//! and the account email as password, and delivers structured push-style
//! notifications rather than raw BLE frames. The connection/queuing logic
//! mirrors [`crate::mqtt::service`], with two differences: subscription
//! intent can itself trigger `connect()` once credentials are known, and
//! only a fixed allow-list of fatal broker return codes closes the
//! connection while transient errors leave it to recover in place.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Packet, QoS, TlsConfiguration, Transport,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::PushCredentials;
use crate::events::LockEvent;
use crate::mqtt::error::MqttError;
use crate::mqtt::ConnectionState;

pub const PUSH_BROKER_HOST: &str = "push-mqtt.eufylife.com";
pub const PUSH_BROKER_PORT: u16 = 8789;

const COMMAND_BUFFER: usize = 32;
const TRANSPORT_BUFFER: usize = 32;
const KEEP_ALIVE: Duration = Duration::from_secs(60);

const SCHEMA_NOTICE: &str = "notice";
const SCHEMA_PUSH_MESSAGE: &str = "push_message";

/// Seam for the structured-message decoder. Payloads are binary messages
/// keyed by schema name; decoding them is outside this crate.
pub trait NoticeDecoder: Send + Sync {
    fn decode(&self, schema: &str, payload: &[u8]) -> Option<Value>;
}

enum PushCommand {
    Connect {
        credentials: PushCredentials,
        reply: oneshot::Sender<Result<(), MqttError>>,
    },
    SubscribeLock {
        serial: String,
    },
    Disconnect,
}

enum Step {
    Command(Option<PushCommand>),
    Transport(Result<Event, ConnectionError>),
}

struct LivePush {
    client: AsyncClient,
    eventloop: EventLoop,
    notice_subscribed: bool,
    subscribed: HashSet<String>,
}

/// Caller-facing handle to the push channel actor.
#[derive(Clone)]
pub struct PushMqttHandle {
    commands: mpsc::Sender<PushCommand>,
}

impl PushMqttHandle {
    /// Store credentials and open the push broker connection.
    pub async fn connect(&self, credentials: PushCredentials) -> Result<(), MqttError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(PushCommand::Connect { credentials, reply })
            .await
            .map_err(|_| MqttError::Channel("push service task stopped".into()))?;
        response
            .await
            .map_err(|_| MqttError::Channel("push service task stopped".into()))?
    }

    /// Subscribe to one lock's push topic. Enqueued when no transport
    /// exists yet; if credentials were supplied earlier this also triggers
    /// the connection attempt.
    pub async fn subscribe_lock(&self, serial: &str) -> Result<(), MqttError> {
        self.commands
            .send(PushCommand::SubscribeLock {
                serial: serial.to_string(),
            })
            .await
            .map_err(|_| MqttError::Channel("push service task stopped".into()))
    }

    pub async fn disconnect(&self) {
        let _ = self.commands.send(PushCommand::Disconnect).await;
    }
}

/// Push channel actor. Single-writer over all of its state, like the
/// security channel actor.
pub struct PushMqttService {
    decoder: Arc<dyn NoticeDecoder>,
    events: mpsc::Sender<LockEvent>,
    commands: mpsc::Receiver<PushCommand>,
    credentials: Option<PushCredentials>,
    state: ConnectionState,
    /// Every serial ever requested; the drain on CONNACK subscribes the
    /// ones not yet active on the current connection.
    pending_locks: BTreeSet<String>,
    transport: Option<LivePush>,
    /// Callers awaiting the current connect attempt; all of them resolve
    /// with the attempt's real outcome.
    connect_waiters: Vec<oneshot::Sender<Result<(), MqttError>>>,
}

impl PushMqttService {
    pub fn spawn(decoder: Arc<dyn NoticeDecoder>, events: mpsc::Sender<LockEvent>) -> PushMqttHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            decoder,
            events,
            commands: rx,
            credentials: None,
            state: ConnectionState::default(),
            pending_locks: BTreeSet::new(),
            transport: None,
            connect_waiters: Vec::new(),
        };
        tokio::spawn(service.run());
        PushMqttHandle { commands: tx }
    }

    async fn run(mut self) {
        info!("push mqtt service started");
        loop {
            let step = match self.transport.as_mut() {
                Some(live) => {
                    tokio::select! {
                        cmd = self.commands.recv() => Step::Command(cmd),
                        event = live.eventloop.poll() => Step::Transport(event),
                    }
                }
                None => Step::Command(self.commands.recv().await),
            };

            match step {
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                Step::Command(None) => break,
                Step::Transport(event) => self.handle_transport_event(event).await,
            }
        }
        info!("push mqtt service stopped");
    }

    async fn handle_command(&mut self, cmd: PushCommand) {
        match cmd {
            PushCommand::Connect { credentials, reply } => {
                self.credentials = Some(credentials);
                self.start_connect(Some(reply));
            }
            PushCommand::SubscribeLock { serial } => self.subscribe_lock(serial),
            PushCommand::Disconnect => {
                if let Some(live) = self.transport.as_ref() {
                    let _ = live.client.disconnect().await;
                }
                self.close(false).await;
            }
        }
    }

    fn start_connect(&mut self, reply: Option<oneshot::Sender<Result<(), MqttError>>>) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "push connect ignored while not disconnected");
            if let Some(reply) = reply {
                if self.state == ConnectionState::Connecting {
                    // Park on the attempt in flight rather than report
                    // success before it resolves.
                    self.connect_waiters.push(reply);
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            return;
        }
        let Some(credentials) = self.credentials.clone() else {
            if let Some(reply) = reply {
                let _ = reply.send(Err(MqttError::Channel(
                    "push connect without credentials".into(),
                )));
            }
            return;
        };

        self.state = ConnectionState::Connecting;
        info!(client_id = %credentials.client_id, "opening push mqtt connection");

        let mut options = MqttOptions::new(
            credentials.client_id.clone(),
            PUSH_BROKER_HOST,
            PUSH_BROKER_PORT,
        );
        options
            .set_credentials(push_username(&credentials.client_id), credentials.email)
            .set_keep_alive(KEEP_ALIVE)
            .set_transport(match credentials.ca_pem {
                Some(ca) => Transport::tls_with_config(TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                }),
                None => Transport::tls_with_default_config(),
            });

        let (client, eventloop) = AsyncClient::new(options, TRANSPORT_BUFFER);
        self.transport = Some(LivePush {
            client,
            eventloop,
            notice_subscribed: false,
            subscribed: HashSet::new(),
        });
        if let Some(reply) = reply {
            self.connect_waiters.push(reply);
        }
    }

    async fn handle_transport_event(&mut self, event: Result<Event, ConnectionError>) {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
                if code == ConnectReturnCode::Success {
                    self.on_connected().await;
                } else if is_fatal(code) {
                    warn!(?code, "push broker rejected connection fatally");
                    self.close(true).await;
                } else {
                    warn!(?code, "push broker rejected connection; will retry");
                    self.state = ConnectionState::Connecting;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                self.handle_notice(&publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) if is_fatal(code) => {
                warn!(?code, "fatal push connection error; closing");
                self.close(true).await;
            }
            Err(err) => {
                // Transient; the event loop reconnects on the next poll.
                debug!("push transport error, leaving connection to recover: {err}");
                if self.state == ConnectionState::Connected {
                    self.state = ConnectionState::Connecting;
                }
            }
        }

        // Every reported event means the event loop made progress on the
        // request channel; retry subscribes deferred by backpressure.
        if self.state == ConnectionState::Connected {
            self.flush_subscriptions();
        }
    }

    async fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        info!("push mqtt channel connected");
        let _ = self.events.send(LockEvent::PushConnected).await;
        for waiter in std::mem::take(&mut self.connect_waiters) {
            let _ = waiter.send(Ok(()));
        }

        // Subscriptions do not survive the broker's clean sessions, so the
        // per-connection bookkeeping resets on every CONNACK.
        if let Some(live) = self.transport.as_mut() {
            live.notice_subscribed = false;
            live.subscribed.clear();
        }
        self.flush_subscriptions();
    }

    fn subscribe_lock(&mut self, serial: String) {
        let newly_queued = self.pending_locks.insert(serial.clone());
        if self.state == ConnectionState::Connected {
            self.flush_subscriptions();
        } else if self.transport.is_none() && self.credentials.is_some() {
            if newly_queued {
                debug!(%serial, "push subscription queued; connecting");
            }
            self.start_connect(None);
        }
    }

    /// Issue outstanding subscribes without blocking the actor. The
    /// request channel is bounded and only drains while the event loop is
    /// polled, so whatever does not fit is retried as transport events
    /// arrive. The notice topic always goes first.
    fn flush_subscriptions(&mut self) {
        let client_id = match self.credentials.as_ref() {
            Some(credentials) => credentials.client_id.clone(),
            None => return,
        };
        let Some(live) = self.transport.as_mut() else {
            return;
        };

        if !live.notice_subscribed {
            match live
                .client
                .try_subscribe(notice_topic(&client_id), QoS::AtLeastOnce)
            {
                Ok(()) => live.notice_subscribed = true,
                Err(err) => {
                    debug!("notice subscribe deferred, request channel full: {err}");
                    return;
                }
            }
        }
        for serial in self.pending_locks.iter() {
            if live.subscribed.contains(serial) {
                continue;
            }
            match live
                .client
                .try_subscribe(push_message_topic(serial), QoS::AtLeastOnce)
            {
                Ok(()) => {
                    live.subscribed.insert(serial.clone());
                    info!(%serial, "subscribed push topic");
                }
                Err(err) => {
                    debug!(%serial, "push subscribe deferred, request channel full: {err}");
                    break;
                }
            }
        }
    }

    async fn handle_notice(&mut self, topic: &str, payload: &[u8]) {
        let (schema, serial) = match classify_topic(topic) {
            Some(classified) => classified,
            None => {
                debug!(topic, "ignoring message on unknown push topic");
                return;
            }
        };
        match self.decoder.decode(schema, payload) {
            Some(notice) => {
                let _ = self
                    .events
                    .send(LockEvent::PushNotice { serial, notice })
                    .await;
            }
            None => debug!(topic, schema, "push message did not decode; dropped"),
        }
    }

    async fn close(&mut self, emit: bool) {
        self.state = ConnectionState::Disconnected;
        self.transport = None;
        for waiter in std::mem::take(&mut self.connect_waiters) {
            let _ = waiter.send(Err(MqttError::Connection(
                "push connection closed".into(),
            )));
        }
        if emit {
            let _ = self.events.send(LockEvent::PushClosed).await;
        }
    }
}

/// Broker username for the legacy channel, derived from the app client id.
fn push_username(client_id: &str) -> String {
    format!("eufy_{client_id}")
}

fn notice_topic(client_id: &str) -> String {
    format!("/phone/{client_id}/notice")
}

fn push_message_topic(serial: &str) -> String {
    format!("/phone/smart_lock/{serial}/push_message")
}

/// Map a push topic to its message schema and optional device serial.
fn classify_topic(topic: &str) -> Option<(&'static str, Option<String>)> {
    if topic.ends_with("/push_message") {
        let serial = topic.split('/').nth(3)?.to_string();
        return Some((SCHEMA_PUSH_MESSAGE, Some(serial)));
    }
    if topic.ends_with("/notice") {
        return Some((SCHEMA_NOTICE, None));
    }
    None
}

/// Broker return codes that signal an unrecoverable auth or protocol
/// failure. Anything else is treated as transient.
fn is_fatal(code: ConnectReturnCode) -> bool {
    matches!(
        code,
        ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized
    )
}
