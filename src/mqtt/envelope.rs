//! Command envelope construction.
//!
//! Every security-channel publish nests three JSON layers: the outer
//! envelope (`head` + stringified `payload`), the device-command payload
//! (`account_id` / `device_sn` / base64 `trans`), and the inner transport
//! object carrying the hex-encoded BLE frame. The same layers are peeled in
//! reverse by [`crate::mqtt::router`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{encode_frame, CMD_ON_OFF_LOCK};

pub const PROTOCOL_VERSION: &str = "2.0";
pub const ENVELOPE_CMD: i64 = 9;
pub const ENVELOPE_CMD_STATUS: i64 = 2;
pub const ENVELOPE_SIGN_CODE: i64 = 0;

/// Inner transport `cmd` value for BLE payload transfer.
pub const CMD_TRANSFER_PAYLOAD: i64 = 100;

/// Envelope header present on every security-channel message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeHead {
    pub version: String,
    pub client_id: String,
    pub sess_id: String,
    pub seq_no: u32,
    pub seed: String,
    pub time: i64,
    pub cmd_status: i64,
    pub cmd: i64,
    pub sign_code: i64,
}

/// Outer envelope. `payload` is a JSON string on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub head: EnvelopeHead,
    pub payload: Value,
}

/// Device-command payload carried as the envelope's stringified `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPayload {
    pub account_id: String,
    pub device_sn: String,
    /// Base64-encoded JSON of the inner [`TransportMessage`].
    pub trans: String,
}

/// Inner transport object decoded out of `trans`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    pub cmd: i64,
    pub payload: TransportPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_payload: Option<LockTransportPayload>,
}

/// Lock-specific sub-payload: the BLE frame plus addressing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockTransportPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_sn: Option<String>,
    /// Hex-encoded FF09 frame bytes.
    pub cmd_data: String,
    pub ble_command: u16,
    pub seq_num: u32,
}

/// Logical lock/unlock intent as supplied by the caller.
#[derive(Debug, Clone)]
pub struct LockIntent {
    pub device_sn: String,
    pub device_model: String,
    pub admin_user_id: String,
    pub short_user_id: String,
    pub nickname: String,
    pub channel: u8,
    pub seq_num: u32,
    /// `true` to throw the bolt, `false` to retract it.
    pub lock: bool,
}

/// Seam for the BLE command-encoding collaborator.
///
/// The full vendor encoder (session encryption, per-user key material) is
/// outside this crate; implementations return the complete FF09 frame bytes
/// for one on/off command.
pub trait LockCommandEncoder: Send + Sync {
    fn encode_on_off(&self, intent: &LockIntent) -> Vec<u8>;
}

/// Plaintext on/off encoder for locks that accept unencrypted commands.
///
/// Field layout: channel byte, lock flag, then length-prefixed short user
/// id, admin user id and nickname.
pub struct PlainLockEncoder;

impl LockCommandEncoder for PlainLockEncoder {
    fn encode_on_off(&self, intent: &LockIntent) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(intent.channel);
        data.push(u8::from(intent.lock));
        for field in [
            intent.short_user_id.as_bytes(),
            intent.admin_user_id.as_bytes(),
            intent.nickname.as_bytes(),
        ] {
            data.push(field.len().min(u8::MAX as usize) as u8);
            data.extend_from_slice(&field[..field.len().min(u8::MAX as usize)]);
        }
        encode_frame(CMD_ON_OFF_LOCK, false, false, &data)
    }
}

/// Builds envelopes with a monotonically increasing sequence number.
///
/// One builder lives for the whole service instance so sequence numbers are
/// never reused within a process lifetime, even across reconnects.
#[derive(Debug)]
pub struct EnvelopeBuilder {
    client_id: String,
    account_id: String,
    seq_no: u32,
}

impl EnvelopeBuilder {
    pub fn new(client_id: String, account_id: String) -> Self {
        Self {
            client_id,
            account_id,
            seq_no: 0,
        }
    }

    /// Adopt the identity of a new connection without resetting the
    /// sequence counter.
    pub fn rebind(&mut self, client_id: String, account_id: String) {
        self.client_id = client_id;
        self.account_id = account_id;
    }

    /// Wrap an encoded lock command into the full envelope and serialize it
    /// for publishing.
    pub fn build_command(
        &mut self,
        device_sn: &str,
        lock_payload: LockTransportPayload,
    ) -> Result<String, serde_json::Error> {
        let transport = TransportMessage {
            cmd: CMD_TRANSFER_PAYLOAD,
            payload: TransportPayload {
                lock_payload: Some(lock_payload),
            },
        };
        let trans = BASE64.encode(serde_json::to_string(&transport)?);

        let payload = CommandPayload {
            account_id: self.account_id.clone(),
            device_sn: device_sn.to_string(),
            trans,
        };

        self.seq_no += 1;
        let envelope = Envelope {
            head: EnvelopeHead {
                version: PROTOCOL_VERSION.to_string(),
                client_id: self.client_id.clone(),
                sess_id: random_session_id(),
                seq_no: self.seq_no,
                seed: random_seed(),
                time: chrono::Utc::now().timestamp(),
                cmd_status: ENVELOPE_CMD_STATUS,
                cmd: ENVELOPE_CMD,
                sign_code: ENVELOPE_SIGN_CODE,
            },
            payload: Value::String(serde_json::to_string(&payload)?),
        };
        serde_json::to_string(&envelope)
    }
}

/// Four random hex characters identifying the app session.
fn random_session_id() -> String {
    let mut bytes = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sixteen random bytes as hex. Regenerated per envelope, never cached.
fn random_seed() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_frame;

    fn sample_lock_payload() -> LockTransportPayload {
        LockTransportPayload {
            dev_sn: Some("SN123".into()),
            cmd_data: "ff09".into(),
            ble_command: CMD_ON_OFF_LOCK,
            seq_num: 7,
        }
    }

    #[test]
    fn sequence_starts_at_one_and_increases() {
        let mut builder = EnvelopeBuilder::new("client".into(), "account".into());
        let first = builder.build_command("SN123", sample_lock_payload()).unwrap();
        let second = builder.build_command("SN123", sample_lock_payload()).unwrap();

        let first: Envelope = serde_json::from_str(&first).unwrap();
        let second: Envelope = serde_json::from_str(&second).unwrap();
        assert_eq!(first.head.seq_no, 1);
        assert_eq!(second.head.seq_no, 2);
    }

    #[test]
    fn rebind_keeps_sequence_monotonic() {
        let mut builder = EnvelopeBuilder::new("client-a".into(), "account".into());
        builder.build_command("SN123", sample_lock_payload()).unwrap();
        builder.rebind("client-b".into(), "account".into());
        let envelope = builder.build_command("SN123", sample_lock_payload()).unwrap();

        let envelope: Envelope = serde_json::from_str(&envelope).unwrap();
        assert_eq!(envelope.head.seq_no, 2);
        assert_eq!(envelope.head.client_id, "client-b");
    }

    #[test]
    fn seed_and_session_id_are_fresh_per_envelope() {
        let mut builder = EnvelopeBuilder::new("client".into(), "account".into());
        let a = builder.build_command("SN123", sample_lock_payload()).unwrap();
        let b = builder.build_command("SN123", sample_lock_payload()).unwrap();

        let a: Envelope = serde_json::from_str(&a).unwrap();
        let b: Envelope = serde_json::from_str(&b).unwrap();
        assert_eq!(a.head.seed.len(), 32);
        assert_eq!(a.head.sess_id.len(), 4);
        assert_ne!(a.head.seed, b.head.seed);
    }

    #[test]
    fn envelope_layers_unwrap_back_to_the_frame() {
        let mut builder = EnvelopeBuilder::new("client".into(), "account-1".into());
        let frame = PlainLockEncoder.encode_on_off(&LockIntent {
            device_sn: "SN123".into(),
            device_model: "T85D0".into(),
            admin_user_id: "admin".into(),
            short_user_id: "01".into(),
            nickname: "front door".into(),
            channel: 1,
            seq_num: 3,
            lock: true,
        });
        let lock_payload = LockTransportPayload {
            dev_sn: Some("SN123".into()),
            cmd_data: hex::encode(&frame),
            ble_command: CMD_ON_OFF_LOCK,
            seq_num: 3,
        };

        let raw = builder.build_command("SN123", lock_payload).unwrap();
        let envelope: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.head.cmd, ENVELOPE_CMD);
        assert_eq!(envelope.head.cmd_status, ENVELOPE_CMD_STATUS);
        assert_eq!(envelope.head.sign_code, ENVELOPE_SIGN_CODE);

        let payload: CommandPayload =
            serde_json::from_str(envelope.payload.as_str().unwrap()).unwrap();
        assert_eq!(payload.account_id, "account-1");
        assert_eq!(payload.device_sn, "SN123");

        let transport: TransportMessage =
            serde_json::from_slice(&BASE64.decode(payload.trans).unwrap()).unwrap();
        assert_eq!(transport.cmd, CMD_TRANSFER_PAYLOAD);

        let lock = transport.payload.lock_payload.unwrap();
        let decoded = parse_frame(&hex::decode(lock.cmd_data).unwrap()).unwrap();
        assert_eq!(decoded.command_code, CMD_ON_OFF_LOCK);
        assert!(!decoded.response);
    }
}
