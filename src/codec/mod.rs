//! # BLE Frame Codec
//!
//! Stateless parsing and encoding of the FF09-prefixed binary frames that the
//! lock firmware normally speaks over Bluetooth and that the vendor tunnels
//! through MQTT payloads. Two layers live here:
//!
//! - `frame` - the outer wire frame: magic header, 16-bit flag field
//!   (encrypted / response bits plus an 11-bit command code), payload slice
//!   and an unvalidated trailing checksum byte.
//! - `heartbeat` - the TLV-encoded heartbeat carried inside unencrypted
//!   notify frames, from which battery level and lock state are read.
//!
//! Everything in this module is a pure function over byte slices; connection
//! handling and message routing live in [`crate::mqtt`].

pub mod frame;
pub mod heartbeat;

pub use frame::{encode_frame, parse_frame, BleFrame, CMD_NOTIFY, CMD_ON_OFF_LOCK};
pub use heartbeat::{parse_heartbeat, HeartbeatData};
