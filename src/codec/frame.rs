//! Outer wire-frame layout:
//!
//! ```text
//! [0..2)   magic 0xFF 0x09
//! [2..7)   header bytes (length / reserved, not interpreted here)
//! [7..9)   big-endian flags: bit14 = encrypted, bit11 = response,
//!          bits 0-10 = command code
//! [9..n-1) payload
//! [n-1]    XOR checksum (accepted as-is on receive)
//! ```

/// Two-byte magic prefix every lock frame starts with.
pub const FRAME_MAGIC: [u8; 2] = [0xFF, 0x09];

/// Command code of the unencrypted heartbeat/notify frame.
pub const CMD_NOTIFY: u16 = 0x000A;

/// Command code of the lock/unlock command and its response frame.
pub const CMD_ON_OFF_LOCK: u16 = 0x0003;

const MIN_FRAME_LEN: usize = 10;
const FLAGS_OFFSET: usize = 7;
const DATA_OFFSET: usize = 9;

const FLAG_ENCRYPTED: u16 = 1 << 14;
const FLAG_RESPONSE: u16 = 1 << 11;
const COMMAND_MASK: u16 = 0x07FF;

/// A decoded lock frame. Ephemeral: built per inbound buffer, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleFrame {
    pub encrypted: bool,
    pub response: bool,
    pub command_code: u16,
    pub data: Vec<u8>,
}

impl BleFrame {
    /// An unencrypted notify frame carrying the heartbeat TLVs.
    pub fn is_heartbeat(&self) -> bool {
        !self.encrypted && self.command_code == CMD_NOTIFY
    }

    /// A response frame to a previously issued lock/unlock command.
    pub fn is_lock_command_response(&self) -> bool {
        self.response && self.command_code == CMD_ON_OFF_LOCK
    }
}

/// Parse a raw buffer into a [`BleFrame`].
///
/// Returns `None` for anything shorter than the minimum frame length or not
/// starting with the magic prefix. The trailing checksum byte is not
/// recomputed; the observed firmware accepts frames regardless, so rejecting
/// here could drop frames the real client would have processed.
pub fn parse_frame(buf: &[u8]) -> Option<BleFrame> {
    if buf.len() < MIN_FRAME_LEN || buf[0..2] != FRAME_MAGIC {
        return None;
    }

    let flags = u16::from_be_bytes([buf[FLAGS_OFFSET], buf[FLAGS_OFFSET + 1]]);

    Some(BleFrame {
        encrypted: flags & FLAG_ENCRYPTED != 0,
        response: flags & FLAG_RESPONSE != 0,
        command_code: flags & COMMAND_MASK,
        data: buf[DATA_OFFSET..buf.len() - 1].to_vec(),
    })
}

/// Encode a frame in the layout [`parse_frame`] expects, including a valid
/// XOR checksum over all preceding bytes.
pub fn encode_frame(command_code: u16, response: bool, encrypted: bool, data: &[u8]) -> Vec<u8> {
    let total_len = MIN_FRAME_LEN + data.len();
    let mut flags = command_code & COMMAND_MASK;
    if response {
        flags |= FLAG_RESPONSE;
    }
    if encrypted {
        flags |= FLAG_ENCRYPTED;
    }

    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(&FRAME_MAGIC);
    buf.extend_from_slice(&(total_len as u16).to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0]);
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(data);

    let checksum = buf.iter().fold(0u8, |acc, b| acc ^ b);
    buf.push(checksum);
    buf
}
