//! 188-byte MPEG-TS packet serialization.

use crate::adaptation_field::AdaptationField;
use crate::{Error, MPEG_TS_PACKET_SIZE};
use modular_bitfield_msb::prelude::*;
use std::io::Write;

/// Transport scrambling control; the muxer never scrambles output so this is always
/// [`TransportScramblingControl::NotScrambled`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, BitfieldSpecifier)]
#[bits = 2]
pub enum TransportScramblingControl {
    /// Not scrambled.
    NotScrambled,
    /// Do not use.
    Reserved,
    /// Scrambled with even key.
    ScrambledEvenKey,
    /// Scrambled with odd key.
    ScrambledOddKey,
}

impl Default for TransportScramblingControl {
    fn default() -> Self {
        TransportScramblingControl::NotScrambled
    }
}

/// Link-layer header found at the start of every 188-byte MPEG-TS packet.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub sync_byte: B8,
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: B13,
    pub transport_scrambling_control: TransportScramblingControl,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: B4,
}

/// Sync byte that begins every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// One 188-byte transport stream packet: header, optional adaptation field, optional
/// payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// PID this packet belongs to.
    pub pid: u16,
    /// `true` if this packet begins a new PES or PSI payload unit.
    pub payload_unit_start_indicator: bool,
    /// 4-bit continuity counter value for this packet.
    pub continuity_counter: u8,
    /// Adaptation field, if present.
    pub adaptation_field: Option<AdaptationField>,
    /// Payload bytes, if present. Must fit within the 184 bytes left after the header
    /// and any adaptation field.
    pub payload: Option<Vec<u8>>,
}

impl Packet {
    /// Convenience constructor for a packet carrying only payload (no adaptation
    /// field), as used for PAT/PMT table packets.
    pub fn payload_only(pid: u16, continuity_counter: u8, payload: Vec<u8>) -> Self {
        Self {
            pid,
            payload_unit_start_indicator: true,
            continuity_counter,
            adaptation_field: None,
            payload: Some(payload),
        }
    }
}

/// Serializes `packet` into exactly `packet_size` bytes (188 for standard TS) and
/// writes them to `sink`. Returns the number of bytes written (always `packet_size`
/// on success).
///
/// Pads the unused tail of the packet with `0xFF` stuffing bytes. Fails with
/// [`Error::PacketOverflow`] if the header, adaptation field, and payload together
/// exceed `packet_size`.
pub fn write_packet<W: Write>(sink: &mut W, packet: &Packet, packet_size: usize) -> Result<usize, Error> {
    let has_adaptation_field = packet.adaptation_field.is_some();
    let has_payload = packet.payload.is_some();

    let header = PacketHeader::new()
        .with_sync_byte(SYNC_BYTE)
        .with_transport_error_indicator(false)
        .with_payload_unit_start_indicator(packet.payload_unit_start_indicator)
        .with_transport_priority(false)
        .with_pid(packet.pid)
        .with_transport_scrambling_control(TransportScramblingControl::NotScrambled)
        .with_has_adaptation_field(has_adaptation_field)
        .with_has_payload(has_payload)
        .with_continuity_counter(packet.continuity_counter);

    let mut buf = Vec::with_capacity(packet_size);
    buf.extend_from_slice(&header.into_bytes());

    if let Some(af) = &packet.adaptation_field {
        crate::adaptation_field::write_adaptation_field(&mut buf, af);
    }

    if let Some(payload) = &packet.payload {
        buf.extend_from_slice(payload);
    }

    if buf.len() > packet_size {
        return Err(Error::PacketOverflow(buf.len()));
    }

    buf.resize(packet_size, 0xFF);
    sink.write_all(&buf)?;
    Ok(packet_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_only_packet_is_188_bytes_and_starts_with_sync() {
        let packet = Packet::payload_only(0x100, 0, vec![1, 2, 3]);
        let mut out = Vec::new();
        let n = write_packet(&mut out, &packet, MPEG_TS_PACKET_SIZE).unwrap();
        assert_eq!(n, MPEG_TS_PACKET_SIZE);
        assert_eq!(out.len(), MPEG_TS_PACKET_SIZE);
        assert_eq!(out[0], SYNC_BYTE);
        assert_eq!(&out[4..7], &[1, 2, 3]);
        assert!(out[7..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn overflowing_payload_is_rejected() {
        let packet = Packet::payload_only(0x100, 0, vec![0u8; 185]);
        let mut out = Vec::new();
        let err = write_packet(&mut out, &packet, MPEG_TS_PACKET_SIZE).unwrap_err();
        assert!(matches!(err, Error::PacketOverflow(_)));
    }

    #[test]
    fn header_encodes_pusi_and_pid() {
        let packet = Packet {
            pid: 0x1234 & 0x1FFF,
            payload_unit_start_indicator: true,
            continuity_counter: 7,
            adaptation_field: None,
            payload: Some(vec![0xAB]),
        };
        let mut out = Vec::new();
        write_packet(&mut out, &packet, MPEG_TS_PACKET_SIZE).unwrap();
        let header = PacketHeader::from_bytes([out[0], out[1], out[2], out[3]]);
        assert!(header.payload_unit_start_indicator());
        assert_eq!(header.pid(), 0x1234 & 0x1FFF);
        assert_eq!(header.continuity_counter(), 7);
        assert!(!header.has_adaptation_field());
        assert!(header.has_payload());
    }
}
