//! Inbound message routing for the security channel.
//!
//! Each inbound publish is unwrapped layer by layer; any failure along the
//! way discards that one message. A malformed or foreign message must never
//! take the connection down, so nothing here returns an error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::codec::{parse_frame, parse_heartbeat};
use crate::events::LockEvent;
use crate::mqtt::envelope::{TransportMessage, CMD_TRANSFER_PAYLOAD};
use crate::mqtt::topics::is_response_topic;

/// Relaxed view of the outer envelope; only the payload field matters here.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    payload: serde_json::Value,
}

/// Relaxed view of the device-command payload.
#[derive(Debug, Deserialize)]
struct InboundPayload {
    device_sn: Option<String>,
    trans: Option<String>,
}

/// Decode one inbound publish into an event, or `None` when the message is
/// not for this layer. Every discard is logged at debug level and swallowed.
pub(crate) fn route_message(topic: &str, payload: &[u8]) -> Option<LockEvent> {
    if !is_response_topic(topic) {
        return None;
    }

    let envelope: InboundEnvelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(topic, "discarding message with malformed envelope: {err}");
            return None;
        }
    };
    let Some(payload_str) = envelope.payload.as_str() else {
        debug!(topic, "discarding envelope with non-string payload");
        return None;
    };

    let payload: InboundPayload = match serde_json::from_str(payload_str) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(topic, "discarding malformed command payload: {err}");
            return None;
        }
    };
    let Some(trans) = payload.trans else {
        debug!(topic, "discarding payload without trans field");
        return None;
    };

    let transport: TransportMessage = match BASE64
        .decode(trans)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
    {
        Some(transport) => transport,
        None => {
            debug!(topic, "discarding undecodable transport object");
            return None;
        }
    };
    if transport.cmd != CMD_TRANSFER_PAYLOAD {
        debug!(topic, cmd = transport.cmd, "ignoring non-transfer command");
        return None;
    }
    let Some(lock) = transport.payload.lock_payload else {
        debug!(topic, "transport object carries no lock payload");
        return None;
    };

    let serial = lock.dev_sn.or(payload.device_sn)?;
    let raw_frame = match hex::decode(&lock.cmd_data) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(topic, "discarding lock payload with bad hex: {err}");
            return None;
        }
    };

    // A frame that does not parse is foreign, not an error.
    let frame = parse_frame(&raw_frame)?;

    if frame.is_heartbeat() {
        let heartbeat = parse_heartbeat(&frame.data)?;
        debug!(
            %serial,
            locked = heartbeat.locked,
            battery = heartbeat.battery,
            "lock heartbeat"
        );
        return Some(LockEvent::LockStatus {
            serial,
            locked: heartbeat.locked,
            battery: heartbeat.battery,
        });
    }

    if frame.is_lock_command_response() {
        return Some(LockEvent::CommandResponse {
            serial,
            success: true,
        });
    }

    debug!(
        %serial,
        command_code = frame.command_code,
        "ignoring unhandled frame"
    );
    None
}

/// Wrapper used on the event-loop path so a panic inside the pipeline can
/// never terminate the poll loop.
pub(crate) fn route_message_guarded(topic: &str, payload: &[u8]) -> Option<LockEvent> {
    match std::panic::catch_unwind(|| route_message(topic, payload)) {
        Ok(event) => event,
        Err(_) => {
            warn!(topic, "message routing panicked; message dropped");
            None
        }
    }
}
