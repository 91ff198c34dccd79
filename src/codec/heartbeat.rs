//! Heartbeat TLV parsing.
//!
//! The payload of an unencrypted notify frame is a sequence of
//! `[tag:1][len:1][value:len]` entries, optionally preceded by a single
//! return-code byte. Only the battery and lock-status tags are interpreted;
//! the firmware adds tags over time, so unknown ones are skipped rather than
//! rejected.

const TAG_BATTERY: u8 = 0xA1;
const TAG_LOCK_STATUS: u8 = 0xA2;

/// Lock-status value reported while the bolt is thrown.
const LOCK_STATUS_LOCKED: u8 = 4;

/// Any leading byte below this is a return code, not a tag.
const TAG_FLOOR: u8 = 0xA0;

/// Battery and lock state decoded from one heartbeat frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatData {
    /// Battery percentage in `[0, 100]`, or `-1` when the frame carried none.
    pub battery: i32,
    pub locked: bool,
    pub raw_lock_status: u8,
}

/// Scan the heartbeat TLVs in `data`.
///
/// Returns `None` when no lock-status tag is present; a heartbeat without it
/// carries nothing this client can act on. A truncated trailing TLV stops the
/// scan but does not invalidate tags already read.
pub fn parse_heartbeat(data: &[u8]) -> Option<HeartbeatData> {
    let mut offset = usize::from(data.first().is_some_and(|b| *b < TAG_FLOOR));
    let mut battery: Option<u8> = None;
    let mut lock_status: Option<u8> = None;

    while offset + 2 <= data.len() {
        let tag = data[offset];
        let len = data[offset + 1] as usize;
        if offset + 2 + len > data.len() {
            break;
        }
        if len == 1 {
            match tag {
                TAG_BATTERY => battery = Some(data[offset + 2]),
                TAG_LOCK_STATUS => lock_status = Some(data[offset + 2]),
                _ => {}
            }
        }
        offset += 2 + len;
    }

    let raw_lock_status = lock_status?;
    Some(HeartbeatData {
        battery: battery.map_or(-1, i32::from),
        locked: raw_lock_status == LOCK_STATUS_LOCKED,
        raw_lock_status,
    })
}
