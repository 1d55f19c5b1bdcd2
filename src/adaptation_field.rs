//! Adaptation field serialization, including PCR/OPCR timestamp encoding.

use modular_bitfield_msb::prelude::*;

/// Program Clock Reference (or Original PCR): a 33-bit 90kHz base plus a 9-bit 27MHz
/// extension, encoded big-endian into 6 bytes with 6 reserved bits (set to 1) between
/// them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockReference {
    /// 33 bits of a 90kHz base clock.
    pub base: u64,
    /// 9 bits of a 27MHz clock rolling over every 300 counts to the base.
    pub extension: u16,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PcrBits {
    base: B33,
    reserved: B6,
    extension: B9,
}

fn encode_pcr(pcr: &ClockReference) -> [u8; 6] {
    PcrBits::new()
        .with_base(pcr.base & 0x1_FFFF_FFFF)
        .with_reserved(0b111111)
        .with_extension(pcr.extension & 0x1FF)
        .into_bytes()
}

/// Header flags preceding the conditional adaptation field fields.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct AdaptationFieldHeader {
    length: B8,
    discontinuity_indicator: bool,
    random_access_indicator: bool,
    elementary_stream_priority_indicator: bool,
    pcr_flag: bool,
    opcr_flag: bool,
    splicing_point_flag: bool,
    transport_private_data_flag: bool,
    adaptation_field_extension_flag: bool,
}

/// Non-payload packet metadata carried ahead of (or instead of) the payload.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    /// Indicates a discontinuity in the PCR or CC sequence on this PID.
    pub discontinuity_indicator: bool,
    /// Marks this packet as a good random-access/splice point (e.g. a keyframe).
    pub random_access_indicator: bool,
    /// Elementary stream priority indicator.
    pub elementary_stream_priority_indicator: bool,
    /// Program Clock Reference, if present.
    pub pcr: Option<ClockReference>,
    /// Original Program Clock Reference, if present.
    pub opcr: Option<ClockReference>,
    /// Splice countdown, if present.
    pub splice_countdown: Option<i8>,
    /// Opaque transport-private data, if present.
    pub transport_private_data: Option<Vec<u8>>,
    /// Number of trailing `0xFF` stuffing bytes to emit after any conditional fields.
    pub stuffing_length: usize,
    /// If `true`, this field is encoded as a single `adaptation_field_length = 0` byte
    /// with no flags byte at all, per ISO/IEC 13818-1's special case for that value.
    /// Every other field is ignored when this is set. Only reachable through
    /// [`AdaptationField::length_byte_only`]; needed when exactly one byte of budget
    /// is left to fill and there isn't room for the otherwise-mandatory flags byte.
    pub length_byte_only: bool,
}

impl AdaptationField {
    /// A synthetic adaptation field with no flags set, carrying only `stuffing_length`
    /// bytes of stuffing. Used by the muxer to pad out a packet whose payload didn't
    /// fill the space left after the header.
    pub fn stuffing(stuffing_length: usize) -> Self {
        Self {
            stuffing_length,
            ..Default::default()
        }
    }

    /// The minimal one-byte adaptation field (`adaptation_field_length = 0`, no flags
    /// byte). Used by the muxer when exactly one byte of packet budget is left.
    pub fn length_byte_only() -> Self {
        Self {
            length_byte_only: true,
            ..Default::default()
        }
    }
}

/// Total number of bytes this adaptation field will occupy, including its own length
/// byte.
pub fn calc_adaptation_field_length(af: &AdaptationField) -> usize {
    if af.length_byte_only {
        return 1;
    }
    let mut len = 1; // flags byte
    if af.pcr.is_some() {
        len += 6;
    }
    if af.opcr.is_some() {
        len += 6;
    }
    if af.splice_countdown.is_some() {
        len += 1;
    }
    if let Some(data) = &af.transport_private_data {
        len += 1 + data.len();
    }
    len += af.stuffing_length;
    1 + len // + the length byte itself
}

/// Serializes `af` and appends the bytes to `buf`.
pub fn write_adaptation_field(buf: &mut Vec<u8>, af: &AdaptationField) {
    if af.length_byte_only {
        buf.push(0);
        return;
    }

    let total_len = calc_adaptation_field_length(af);
    let length_byte = (total_len - 1) as u8; // length byte excludes itself

    let header = AdaptationFieldHeader::new()
        .with_length(length_byte)
        .with_discontinuity_indicator(af.discontinuity_indicator)
        .with_random_access_indicator(af.random_access_indicator)
        .with_elementary_stream_priority_indicator(af.elementary_stream_priority_indicator)
        .with_pcr_flag(af.pcr.is_some())
        .with_opcr_flag(af.opcr.is_some())
        .with_splicing_point_flag(af.splice_countdown.is_some())
        .with_transport_private_data_flag(af.transport_private_data.is_some())
        .with_adaptation_field_extension_flag(false);
    buf.extend_from_slice(&header.into_bytes());

    if let Some(pcr) = &af.pcr {
        buf.extend_from_slice(&encode_pcr(pcr));
    }
    if let Some(opcr) = &af.opcr {
        buf.extend_from_slice(&encode_pcr(opcr));
    }
    if let Some(countdown) = af.splice_countdown {
        buf.push(countdown as u8);
    }
    if let Some(data) = &af.transport_private_data {
        buf.push(data.len() as u8);
        buf.extend_from_slice(data);
    }
    buf.resize(buf.len() + af.stuffing_length, 0xFF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuffing_only_field_has_no_flags_set() {
        let af = AdaptationField::stuffing(5);
        let mut buf = Vec::new();
        write_adaptation_field(&mut buf, &af);
        // length byte + flags byte + 5 stuffing bytes.
        assert_eq!(buf.len(), 7);
        assert_eq!(buf[0], 6); // length byte excludes itself: 1 flags + 5 stuffing
        assert_eq!(buf[1], 0); // all flags clear
        assert!(buf[2..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn length_byte_only_field_is_a_single_byte() {
        let af = AdaptationField::length_byte_only();
        assert_eq!(calc_adaptation_field_length(&af), 1);
        let mut buf = Vec::new();
        write_adaptation_field(&mut buf, &af);
        assert_eq!(buf, vec![0x00]);
    }

    #[test]
    fn pcr_round_trips_through_encoding() {
        let pcr = ClockReference {
            base: 5_726_623_061,
            extension: 341,
        };
        let bytes = encode_pcr(&pcr);
        let decoded = PcrBits::from_bytes(bytes);
        assert_eq!(decoded.base(), pcr.base & 0x1_FFFF_FFFF);
        assert_eq!(decoded.extension(), pcr.extension & 0x1FF);
        assert_eq!(decoded.reserved(), 0b111111);
    }

    #[test]
    fn length_accounts_for_pcr_and_stuffing() {
        let af = AdaptationField {
            random_access_indicator: true,
            pcr: Some(ClockReference { base: 1, extension: 0 }),
            stuffing_length: 2,
            ..Default::default()
        };
        // 1 (length byte) + 1 (flags) + 6 (pcr) + 2 (stuffing) = 10
        assert_eq!(calc_adaptation_field_length(&af), 10);
        let mut buf = Vec::new();
        write_adaptation_field(&mut buf, &af);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], 9);
    }
}
