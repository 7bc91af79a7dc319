//! H4 header geometry and vendor opcode helpers.
//!
//! On the wire every packet is `[indicator:1][header][payload]`. The indicator is the
//! [`PacketKind`] discriminant; the header length and the position/width of its length field
//! depend only on the kind:
//!
//! | Kind       | Indicator | Header | Length field       |
//! |------------|-----------|--------|--------------------|
//! | `Cmd`      | `0x01`    | 3      | offset 2, `u8`     |
//! | `AclData`  | `0x02`    | 4      | offset 2, `u16` LE |
//! | `SyncData` | `0x03`    | 3      | offset 2, `u8`     |
//! | `Event`    | `0x04`    | 2      | offset 1, `u8`     |

pub use bt_hci::cmd::{Opcode, OpcodeGroup};
pub use bt_hci::PacketKind;

/// Largest header of all packet kinds (ACL).
pub const MAX_HEADER_LEN: usize = 4;

/// `Command Complete` event code.
pub const EVT_COMMAND_COMPLETE: u8 = 0x0E;

/// Opcode bits holding the command field (OCF).
pub const OCF_MASK: u16 = 0x03FF;

/// Parse an H4 indicator byte. Only kinds with a known header layout are accepted.
pub const fn from_indicator(byte: u8) -> Option<PacketKind> {
    match byte {
        0x01 => Some(PacketKind::Cmd),
        0x02 => Some(PacketKind::AclData),
        0x03 => Some(PacketKind::SyncData),
        0x04 => Some(PacketKind::Event),
        _ => None,
    }
}

#[inline]
pub const fn indicator(kind: PacketKind) -> u8 {
    kind as u8
}

/// Number of header bytes following the indicator. Zero for kinds without an H4 layout here.
#[allow(unreachable_patterns)]
pub const fn header_len(kind: PacketKind) -> usize {
    match kind {
        PacketKind::Cmd => 3,
        PacketKind::AclData => 4,
        PacketKind::SyncData => 3,
        PacketKind::Event => 2,
        _ => 0,
    }
}

/// Decode the payload length from a fully received header.
///
/// `header` must hold at least [`header_len`] bytes.
#[allow(unreachable_patterns)]
pub fn payload_len(kind: PacketKind, header: &[u8]) -> usize {
    match kind {
        PacketKind::AclData => u16::from_le_bytes([header[2], header[3]]) as usize,
        PacketKind::Cmd | PacketKind::SyncData => header[2] as usize,
        PacketKind::Event => header[1] as usize,
        _ => 0,
    }
}

/// Vendor-specific opcode for command field `ocf`. Bits above the command field are ignored.
#[inline]
pub fn vendor_opcode(ocf: u16) -> Opcode {
    Opcode::new(OpcodeGroup::VENDOR_SPECIFIC, ocf & OCF_MASK)
}

/// Rebuild an `Opcode` from its raw 16-bit value (bt-hci 0.4 has no raw constructor).
#[inline]
pub(crate) fn opcode_from_raw(raw: u16) -> Opcode {
    Opcode::new(OpcodeGroup::new((raw >> 10) as u8), raw & OCF_MASK)
}

#[inline]
pub fn is_vendor_opcode(opcode: Opcode) -> bool {
    opcode.group() == OpcodeGroup::VENDOR_SPECIFIC
}

/// A vendor command-complete event extracted from an event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorCommandComplete<'a> {
    pub opcode: Opcode,
    pub status: u8,
    /// Return parameters after the status byte.
    pub params: &'a [u8],
}

impl<'a> VendorCommandComplete<'a> {
    /// Recognize a vendor `Command Complete` event.
    ///
    /// `event` is the event packet without its indicator:
    /// `[code][len][num_cmds][opcode_lo][opcode_hi][status][params..]`.
    /// Returns `None` for any other event, or when the parameter length is too short to hold
    /// the opcode and status.
    pub fn parse(event: &'a [u8]) -> Option<Self> {
        if event.len() < 6 || event[0] != EVT_COMMAND_COMPLETE {
            return None;
        }
        let total = event[1] as usize;
        if total < 4 {
            return None;
        }
        let opcode = opcode_from_raw(u16::from_le_bytes([event[3], event[4]]));
        if !is_vendor_opcode(opcode) {
            return None;
        }
        let end = (2 + total).min(event.len());
        Some(Self {
            opcode,
            status: event[5],
            params: &event[6..end],
        })
    }
}
