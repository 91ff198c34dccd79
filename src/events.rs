use serde_json::Value;

/// Events emitted to the caller over the service's mpsc channel.
///
/// There is no request/response pairing token anywhere in the wire
/// protocol; a [`LockEvent::CommandResponse`] can only be attributed to a
/// command by device serial and arrival order. Callers issuing overlapping
/// commands to the same lock cannot disambiguate the responses.
#[derive(Debug, Clone, PartialEq)]
pub enum LockEvent {
    /// Security channel reached the broker.
    Connected,
    /// Security channel lost the broker.
    Closed,
    /// Heartbeat decoded from a subscribed lock. `battery` is `-1` when the
    /// heartbeat carried no battery TLV.
    LockStatus {
        serial: String,
        locked: bool,
        battery: i32,
    },
    /// The lock acknowledged a lock/unlock command.
    CommandResponse { serial: String, success: bool },
    /// Legacy push channel reached the broker.
    PushConnected,
    /// Legacy push channel was closed after a fatal broker error.
    PushClosed,
    /// Decoded notification from the legacy push channel.
    PushNotice {
        serial: Option<String>,
        notice: Value,
    },
}
