//! Connection state machine for the security channel.
//!
//! All mutable state (connection state, pending subscriptions, the live
//! transport, the envelope sequence counter) is owned by a single actor
//! task; the cloneable [`LockMqttHandle`] sends it commands over an mpsc
//! channel. The actor also drives the rumqttc event loop, so state is only
//! ever touched from one task and needs no locking.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::auth::AuthClient;
use crate::config::AccountConfig;
use crate::events::LockEvent;
use crate::mqtt::envelope::{
    EnvelopeBuilder, LockCommandEncoder, LockIntent, LockTransportPayload,
};
use crate::mqtt::error::MqttError;
use crate::mqtt::{router, tls, topics};

const COMMAND_BUFFER: usize = 64;
const TRANSPORT_BUFFER: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Upper bound on one `connect()` call, covering the three auth round
/// trips and the TLS/MQTT handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection lifecycle. Transitions are the only mutation path for the
/// underlying transport handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

enum ServiceCommand {
    Connect {
        api_base: String,
        reply: oneshot::Sender<Result<(), MqttError>>,
    },
    SubscribeLock {
        serial: String,
        model: String,
    },
    LockDevice {
        intent: LockIntent,
        reply: oneshot::Sender<bool>,
    },
    Disconnect,
}

enum Step {
    Command(Option<ServiceCommand>),
    Transport(Result<Event, ConnectionError>),
}

/// The live broker connection. Replaced wholesale on every connect, which
/// implicitly resets the subscribed set.
struct LiveConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    subscribed: HashSet<String>,
}

/// Cloneable caller-facing handle to the security channel actor.
#[derive(Clone)]
pub struct LockMqttHandle {
    commands: mpsc::Sender<ServiceCommand>,
}

impl LockMqttHandle {
    /// Run the credential chain and open the broker connection.
    ///
    /// Resolves once the broker acknowledges the connection or the attempt
    /// fails; a no-op when the service is already connecting or connected.
    /// `api_base` is the caller's regional API base URL, used only to pick
    /// the broker host.
    pub async fn connect(&self, api_base: &str) -> Result<(), MqttError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ServiceCommand::Connect {
                api_base: api_base.to_string(),
                reply,
            })
            .await
            .map_err(|_| MqttError::Channel("service task stopped".into()))?;

        match tokio::time::timeout(CONNECT_TIMEOUT, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MqttError::Channel("service task stopped".into())),
            Err(_) => Err(MqttError::ConnectTimeout(CONNECT_TIMEOUT)),
        }
    }

    /// Subscribe to one lock's request/response topics. Queued until the
    /// connection exists; duplicate calls per serial are collapsed.
    pub async fn subscribe_lock(&self, serial: &str, model: &str) -> Result<(), MqttError> {
        self.commands
            .send(ServiceCommand::SubscribeLock {
                serial: serial.to_string(),
                model: model.to_string(),
            })
            .await
            .map_err(|_| MqttError::Channel("service task stopped".into()))
    }

    /// Publish a lock/unlock command. Resolves `true` only once the broker
    /// acknowledges the publish; `false` when the channel is not connected,
    /// the publish fails, or the connection drops before the
    /// acknowledgment.
    ///
    /// Responses carry no correlation token; callers overlapping commands
    /// to the same serial cannot tell the responses apart.
    pub async fn lock_device(&self, intent: LockIntent) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(ServiceCommand::LockDevice { intent, reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Close the broker connection if one exists.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(ServiceCommand::Disconnect).await;
    }
}

/// Security channel actor.
pub struct LockMqttService {
    account: AccountConfig,
    auth: AuthClient,
    encoder: Arc<dyn LockCommandEncoder>,
    events: mpsc::Sender<LockEvent>,
    commands: mpsc::Receiver<ServiceCommand>,
    state: ConnectionState,
    /// Serial -> model, queued while not connected; last write per serial
    /// wins. Drained exactly once on the transition into `Connected`.
    pending_subscriptions: BTreeMap<String, String>,
    transport: Option<LiveConnection>,
    /// Every caller awaiting the current connect attempt. More than one
    /// entry means `connect()` was issued again while an attempt was in
    /// flight; all of them resolve with the attempt's real outcome.
    connect_waiters: Vec<oneshot::Sender<Result<(), MqttError>>>,
    /// Publish replies waiting for the event loop to assign a packet id,
    /// in publish order.
    awaiting_publish: VecDeque<oneshot::Sender<bool>>,
    /// Packet id -> publish reply, resolved by the matching PUBACK.
    inflight_publishes: HashMap<u16, oneshot::Sender<bool>>,
    envelope: Option<EnvelopeBuilder>,
}

impl LockMqttService {
    /// Spawn the actor and return the caller handle. Events are delivered
    /// on `events`.
    pub fn spawn(
        account: AccountConfig,
        encoder: Arc<dyn LockCommandEncoder>,
        events: mpsc::Sender<LockEvent>,
    ) -> LockMqttHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            account,
            auth: AuthClient::new(),
            encoder,
            events,
            commands: rx,
            state: ConnectionState::default(),
            pending_subscriptions: BTreeMap::new(),
            transport: None,
            connect_waiters: Vec::new(),
            awaiting_publish: VecDeque::new(),
            inflight_publishes: HashMap::new(),
            envelope: None,
        };
        tokio::spawn(service.run());
        LockMqttHandle { commands: tx }
    }

    async fn run(mut self) {
        info!("security mqtt service started");
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
        info!("security mqtt service stopped");
    }

    async fn handle_command(&mut self, cmd: ServiceCommand) {
        match cmd {
            ServiceCommand::Connect { api_base, reply } => {
                self.start_connect(&api_base, reply).await;
            }
            ServiceCommand::SubscribeLock { serial, model } => {
                self.subscribe_lock(serial, model);
            }
            ServiceCommand::LockDevice { intent, reply } => {
                self.lock_device(intent, reply);
            }
            ServiceCommand::Disconnect => self.disconnect().await,
        }
    }

    async fn start_connect(
        &mut self,
        api_base: &str,
        reply: oneshot::Sender<Result<(), MqttError>>,
    ) {
        match self.state {
            ConnectionState::Connected => {
                debug!("connect ignored while connected");
                let _ = reply.send(Ok(()));
                return;
            }
            ConnectionState::Connecting => {
                // Park the caller on the attempt in flight instead of
                // reporting success before it resolves.
                debug!("connect joined to the attempt in flight");
                self.connect_waiters.push(reply);
                return;
            }
            ConnectionState::Disconnected => {}
        }
        self.state = ConnectionState::Connecting;

        let (identity, cert) = match self.auth.issue_certificate(&self.account).await {
            Ok(issued) => issued,
            Err(err) => {
                warn!("credential chain failed: {err}");
                self.state = ConnectionState::Disconnected;
                let _ = reply.send(Err(err.into()));
                return;
            }
        };

        let tls_config = match tls::client_config(&cert) {
            Ok(config) => config,
            Err(err) => {
                warn!("broker tls setup failed: {err}");
                self.state = ConnectionState::Disconnected;
                let _ = reply.send(Err(err));
                return;
            }
        };

        let host = topics::broker_host(api_base);
        let client_id =
            topics::broker_client_id(&identity.user_center_id, &self.account.openudid, host);
        info!(
            host,
            thing = %cert.thing_name,
            reported_endpoint = %cert.endpoint_addr,
            "opening security mqtt connection"
        );

        let mut options = MqttOptions::new(client_id.clone(), host, topics::SECURITY_BROKER_PORT);
        options
            .set_credentials(cert.thing_name.clone(), "")
            .set_keep_alive(KEEP_ALIVE)
            .set_clean_session(true)
            .set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(tls_config),
            )));

        let (client, eventloop) = AsyncClient::new(options, TRANSPORT_BUFFER);
        self.transport = Some(LiveConnection {
            client,
            eventloop,
            subscribed: HashSet::new(),
        });
        match self.envelope.as_mut() {
            Some(builder) => builder.rebind(client_id, identity.user_center_id),
            None => self.envelope = Some(EnvelopeBuilder::new(client_id, identity.user_center_id)),
        }
        self.connect_waiters.push(reply);
    }

    async fn handle_transport_event(&mut self, event: Result<Event, ConnectionError>) {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
                if code == ConnectReturnCode::Success {
                    self.state = ConnectionState::Connected;
                    info!("security mqtt channel connected");
                    let _ = self.events.send(LockEvent::Connected).await;
                    self.drain_pending_subscriptions();
                    self.resolve_connect_waiters(None);
                } else {
                    warn!(?code, "broker rejected connection");
                    self.teardown(Some(MqttError::Connection(format!(
                        "connection rejected: {code:?}"
                    ))))
                    .await;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Some(event) = router::route_message_guarded(&publish.topic, &publish.payload)
                {
                    let _ = self.events.send(event).await;
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if let Some(reply) = self.inflight_publishes.remove(&ack.pkid) {
                    debug!(pkid = ack.pkid, "lock command acknowledged");
                    let _ = reply.send(true);
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                // The event loop assigns packet ids in request order, and
                // this actor is the client's only publisher.
                if let Some(reply) = self.awaiting_publish.pop_front() {
                    self.inflight_publishes.insert(pkid, reply);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("broker closed the connection");
                self.teardown(Some(MqttError::Connection("broker disconnect".into())))
                    .await;
            }
            Ok(_) => {}
            Err(ConnectionError::Io(ref io_err)) if io_err.kind() == ErrorKind::UnexpectedEof => {
                info!("security mqtt connection closed");
                self.teardown(Some(MqttError::Connection("connection closed".into())))
                    .await;
            }
            Err(err) => {
                // Reconnection policy belongs to the caller; log and drop
                // the transport instead of letting rumqttc retry.
                warn!("security mqtt transport error: {err}");
                self.teardown(Some(MqttError::Connection(err.to_string())))
                    .await;
            }
        }

        // Every reported event means the event loop made progress on the
        // request channel; retry subscribes deferred by backpressure.
        if self.state == ConnectionState::Connected && !self.pending_subscriptions.is_empty() {
            self.drain_pending_subscriptions();
        }
    }

    /// Drop the transport and revert to `Disconnected`. `error` resolves
    /// the pending connect attempt; an established connection emits
    /// `Closed`. Unacknowledged lock commands resolve `false`.
    async fn teardown(&mut self, error: Option<MqttError>) {
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        self.transport = None;
        self.resolve_connect_waiters(error);
        for reply in self.awaiting_publish.drain(..) {
            let _ = reply.send(false);
        }
        for (_, reply) in self.inflight_publishes.drain() {
            let _ = reply.send(false);
        }
        if was_connected {
            let _ = self.events.send(LockEvent::Closed).await;
        }
    }

    /// Answer every caller parked on the connect attempt. The first waiter
    /// receives the original error; further waiters a stringified copy.
    fn resolve_connect_waiters(&mut self, error: Option<MqttError>) {
        let waiters = std::mem::take(&mut self.connect_waiters);
        match error {
            None => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Some(err) => {
                let message = err.to_string();
                let mut original = Some(err);
                for waiter in waiters {
                    let err = original
                        .take()
                        .unwrap_or_else(|| MqttError::Connection(message.clone()));
                    let _ = waiter.send(Err(err));
                }
            }
        }
    }

    fn subscribe_lock(&mut self, serial: String, model: String) {
        if self.state == ConnectionState::Connected {
            if !self.subscribe_now(&serial, &model) {
                self.pending_subscriptions.insert(serial, model);
            }
        } else {
            debug!(%serial, "queueing subscription until connected");
            self.pending_subscriptions.insert(serial, model);
        }
    }

    /// Issue subscribes for queued serials without blocking the actor.
    /// The request channel is bounded and only drains while the event loop
    /// is polled, so whatever does not fit stays queued and is retried as
    /// transport events arrive.
    fn drain_pending_subscriptions(&mut self) {
        let pending = std::mem::take(&mut self.pending_subscriptions);
        let mut blocked = false;
        for (serial, model) in pending {
            if blocked || !self.subscribe_now(&serial, &model) {
                blocked = true;
                self.pending_subscriptions.insert(serial, model);
            }
        }
    }

    /// Returns `false` when the request channel is full and the serial
    /// must be retried after the event loop makes progress. A retried
    /// serial may re-send the request-direction subscribe; the broker
    /// treats a duplicate subscription as a no-op.
    fn subscribe_now(&mut self, serial: &str, model: &str) -> bool {
        let Some(live) = self.transport.as_mut() else {
            return true;
        };
        if live.subscribed.contains(serial) {
            debug!(serial, "already subscribed on this connection");
            return true;
        }

        let request = topics::request_topic(model, serial);
        let response = topics::response_topic(model, serial);
        let result = live
            .client
            .try_subscribe(request, QoS::AtLeastOnce)
            .and_then(|()| live.client.try_subscribe(response, QoS::AtLeastOnce));

        match result {
            Ok(()) => {
                live.subscribed.insert(serial.to_string());
                info!(serial, model, "subscribed lock topics");
                true
            }
            Err(err) => {
                debug!(serial, "subscribe deferred, request channel full: {err}");
                false
            }
        }
    }

    /// Queue a lock command. The reply stays parked until the broker's
    /// PUBACK for this publish arrives; queueing alone is not success.
    fn lock_device(&mut self, intent: LockIntent, reply: oneshot::Sender<bool>) {
        if self.state != ConnectionState::Connected {
            debug!(
                serial = %intent.device_sn,
                "lock command while not connected"
            );
            let _ = reply.send(false);
            return;
        }

        let frame = self.encoder.encode_on_off(&intent);
        let lock_payload = LockTransportPayload {
            dev_sn: Some(intent.device_sn.clone()),
            cmd_data: hex::encode(frame),
            ble_command: crate::codec::CMD_ON_OFF_LOCK,
            seq_num: intent.seq_num,
        };

        let Some(builder) = self.envelope.as_mut() else {
            let _ = reply.send(false);
            return;
        };
        let body = match builder.build_command(&intent.device_sn, lock_payload) {
            Ok(body) => body,
            Err(err) => {
                warn!("envelope serialization failed: {err}");
                let _ = reply.send(false);
                return;
            }
        };

        let Some(live) = self.transport.as_ref() else {
            let _ = reply.send(false);
            return;
        };
        let topic = topics::request_topic(&intent.device_model, &intent.device_sn);
        match live.client.try_publish(topic, QoS::AtLeastOnce, false, body) {
            Ok(()) => {
                debug!(
                    serial = %intent.device_sn,
                    lock = intent.lock,
                    "lock command queued, awaiting broker acknowledgment"
                );
                self.awaiting_publish.push_back(reply);
            }
            Err(err) => {
                warn!(serial = %intent.device_sn, "lock command publish failed: {err}");
                let _ = reply.send(false);
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(live) = self.transport.as_ref() {
            let _ = live.client.disconnect().await;
        }
        self.teardown(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::envelope::PlainLockEncoder;
    use rumqttc::PubAck;

    fn test_service() -> (LockMqttService, mpsc::Receiver<LockEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let service = LockMqttService {
            account: AccountConfig {
                email: "user@example.com".into(),
                password: "secret".into(),
                openudid: "dev42".into(),
            },
            auth: AuthClient::new(),
            encoder: Arc::new(PlainLockEncoder),
            events: events_tx,
            commands: cmd_rx,
            state: ConnectionState::default(),
            pending_subscriptions: BTreeMap::new(),
            transport: None,
            connect_waiters: Vec::new(),
            awaiting_publish: VecDeque::new(),
            inflight_publishes: HashMap::new(),
            envelope: None,
        };
        (service, events_rx)
    }

    fn unconnected_transport() -> LiveConnection {
        // A client whose event loop is never polled; subscribe calls only
        // queue into the request channel.
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, eventloop) = AsyncClient::new(options, TRANSPORT_BUFFER);
        LiveConnection {
            client,
            eventloop,
            subscribed: HashSet::new(),
        }
    }

    fn intent(serial: &str) -> LockIntent {
        LockIntent {
            device_sn: serial.into(),
            device_model: "T85D0".into(),
            admin_user_id: "admin".into(),
            short_user_id: "01".into(),
            nickname: "front".into(),
            channel: 0,
            seq_num: 1,
            lock: true,
        }
    }

    #[tokio::test]
    async fn subscriptions_queue_while_disconnected() {
        let (mut service, _events) = test_service();
        service.subscribe_lock("SN123".into(), "T85D0".into());
        service.subscribe_lock("SN123".into(), "T85D1".into());
        service.subscribe_lock("SN456".into(), "T85D0".into());

        assert_eq!(service.pending_subscriptions.len(), 2);
        // Last write per serial wins.
        assert_eq!(
            service.pending_subscriptions.get("SN123").map(String::as_str),
            Some("T85D1")
        );
    }

    #[tokio::test]
    async fn drain_subscribes_each_pending_serial_once() {
        let (mut service, _events) = test_service();
        service.subscribe_lock("SN123".into(), "T85D0".into());
        service.subscribe_lock("SN123".into(), "T85D0".into());

        service.state = ConnectionState::Connected;
        service.transport = Some(unconnected_transport());
        service.drain_pending_subscriptions();

        assert!(service.pending_subscriptions.is_empty());
        let live = service.transport.as_ref().unwrap();
        assert!(live.subscribed.contains("SN123"));
        assert_eq!(live.subscribed.len(), 1);
    }

    #[tokio::test]
    async fn drain_with_full_request_channel_defers_instead_of_blocking() {
        let (mut service, _events) = test_service();
        for i in 0..40 {
            service
                .pending_subscriptions
                .insert(format!("SN{i:03}"), "T85D0".into());
        }
        service.state = ConnectionState::Connected;
        service.transport = Some(unconnected_transport());

        // Two subscribes per serial overflow the bounded request channel
        // before the event loop is ever polled; the drain must return
        // anyway, with the overflow kept queued for retry.
        service.drain_pending_subscriptions();

        let live = service.transport.as_ref().unwrap();
        assert!(!service.pending_subscriptions.is_empty());
        assert!(!live.subscribed.is_empty());
        for i in 0..40 {
            let serial = format!("SN{i:03}");
            assert!(
                live.subscribed.contains(&serial)
                    || service.pending_subscriptions.contains_key(&serial),
                "{serial} was dropped"
            );
        }
    }

    #[tokio::test]
    async fn subscribe_is_noop_for_known_serial() {
        let (mut service, _events) = test_service();
        service.state = ConnectionState::Connected;
        let mut transport = unconnected_transport();
        transport.subscribed.insert("SN123".to_string());
        service.transport = Some(transport);

        service.subscribe_lock("SN123".into(), "T85D0".into());
        assert_eq!(service.transport.as_ref().unwrap().subscribed.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_connect_shares_the_attempt_outcome() {
        let (mut service, _events) = test_service();
        service.state = ConnectionState::Connecting;
        service.transport = Some(unconnected_transport());
        let (first, mut first_rx) = oneshot::channel();
        service.connect_waiters.push(first);

        let (second, second_rx) = oneshot::channel();
        service
            .start_connect("https://api.eufylife.com", second)
            .await;

        // The second caller is parked on the attempt in flight, not
        // answered with an early success.
        assert!(first_rx.try_recv().is_err());
        assert_eq!(service.connect_waiters.len(), 2);

        service
            .handle_transport_event(Ok(Event::Incoming(Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::Success,
            }))))
            .await;

        assert!(first_rx.await.unwrap().is_ok());
        assert!(second_rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn lock_device_while_disconnected_is_false() {
        let (mut service, _events) = test_service();
        let (reply, response) = oneshot::channel();
        service.lock_device(intent("SN123"), reply);

        assert!(!response.await.unwrap());
        assert!(service.transport.is_none());
    }

    #[tokio::test]
    async fn lock_command_resolves_only_on_broker_puback() {
        let (mut service, _events) = test_service();
        service.state = ConnectionState::Connected;
        service.transport = Some(unconnected_transport());
        service.envelope = Some(EnvelopeBuilder::new("android_uc1dev42".into(), "uc1".into()));

        let (reply, mut response) = oneshot::channel();
        service.lock_device(intent("SN123"), reply);

        // Queued into the request channel; no broker has acknowledged.
        assert!(response.try_recv().is_err());
        assert_eq!(service.awaiting_publish.len(), 1);

        service
            .handle_transport_event(Ok(Event::Outgoing(Outgoing::Publish(3))))
            .await;
        assert!(service.inflight_publishes.contains_key(&3));

        service
            .handle_transport_event(Ok(Event::Incoming(Packet::PubAck(PubAck { pkid: 3 }))))
            .await;
        assert!(response.await.unwrap());
    }

    #[tokio::test]
    async fn teardown_fails_unacknowledged_lock_commands() {
        let (mut service, _events) = test_service();
        service.state = ConnectionState::Connected;
        service.transport = Some(unconnected_transport());
        service.envelope = Some(EnvelopeBuilder::new("android_uc1dev42".into(), "uc1".into()));

        let (reply, response) = oneshot::channel();
        service.lock_device(intent("SN123"), reply);
        service
            .handle_transport_event(Ok(Event::Outgoing(Outgoing::Publish(1))))
            .await;

        service
            .handle_transport_event(Err(ConnectionError::RequestsDone))
            .await;

        assert!(!response.await.unwrap());
        assert!(service.awaiting_publish.is_empty());
        assert!(service.inflight_publishes.is_empty());
    }

    #[tokio::test]
    async fn transport_error_reverts_to_disconnected() {
        let (mut service, mut events) = test_service();
        service.state = ConnectionState::Connected;
        service.transport = Some(unconnected_transport());

        service
            .handle_transport_event(Err(ConnectionError::RequestsDone))
            .await;

        assert_eq!(service.state, ConnectionState::Disconnected);
        assert!(service.transport.is_none());
        assert_eq!(events.recv().await, Some(LockEvent::Closed));
    }

    #[tokio::test]
    async fn connack_rejection_fails_every_connect_waiter() {
        let (mut service, _events) = test_service();
        service.state = ConnectionState::Connecting;
        service.transport = Some(unconnected_transport());
        let (reply, response) = oneshot::channel();
        service.connect_waiters.push(reply);
        let (joined, joined_response) = oneshot::channel();
        service.connect_waiters.push(joined);

        service
            .handle_transport_event(Ok(Event::Incoming(Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::NotAuthorized,
            }))))
            .await;

        assert!(response.await.unwrap().is_err());
        assert!(joined_response.await.unwrap().is_err());
        assert_eq!(service.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connack_success_connects_and_drains() {
        let (mut service, mut events) = test_service();
        service.state = ConnectionState::Connecting;
        service.transport = Some(unconnected_transport());
        service
            .pending_subscriptions
            .insert("SN123".into(), "T85D0".into());
        let (reply, response) = oneshot::channel();
        service.connect_waiters.push(reply);

        service
            .handle_transport_event(Ok(Event::Incoming(Packet::ConnAck(ConnAck {
                session_present: false,
                code: ConnectReturnCode::Success,
            }))))
            .await;

        assert!(response.await.unwrap().is_ok());
        assert_eq!(service.state, ConnectionState::Connected);
        assert_eq!(events.recv().await, Some(LockEvent::Connected));
        assert!(service.pending_subscriptions.is_empty());
        assert!(service
            .transport
            .as_ref()
            .unwrap()
            .subscribed
            .contains("SN123"));
    }
}
