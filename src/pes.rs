//! PES (Packetized Elementary Stream) packet header and payload fragmentation.

use modular_bitfield_msb::prelude::*;

/// Fixed 6-byte PES header: start code prefix, stream ID, and packet length.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PesFixedHeader {
    start_code_prefix: B24,
    stream_id: B8,
    packet_length: B16,
}

const PES_START_CODE_PREFIX: u32 = 0x00_0001;

/// The 3-byte optional-header flag block that precedes PTS/DTS/etc.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PesOptionalHeaderFlags {
    marker_bits: B2,
    scrambling_control: B2,
    priority: bool,
    data_alignment_indicator: bool,
    copyright: bool,
    original_or_copy: bool,
    has_pts: bool,
    has_dts: bool,
    has_escr: bool,
    has_es_rate: bool,
    has_dsm_trick_mode: bool,
    has_additional_copy_info: bool,
    has_crc: bool,
    has_extension: bool,
    additional_header_length: B8,
}

/// The optional header that may follow the fixed PES header.
///
/// Only PTS/DTS are supported for serialization; ESCR, ES rate, DSM trick mode,
/// additional copy info, CRC, and extension fields are not generated (mirrors the
/// reader side of this crate, which likewise only decodes PTS/DTS today).
#[derive(Debug, Clone, Copy, Default)]
pub struct PesOptionalHeader {
    /// Data alignment indicator.
    pub data_alignment_indicator: bool,
    /// Presentation Time Stamp, a 33-bit 90kHz value.
    pub pts: Option<u64>,
    /// Decode Time Stamp, a 33-bit 90kHz value.
    pub dts: Option<u64>,
}

/// PES packet header as supplied by the caller. `stream_id` left at `0` is filled in
/// by the muxer from the elementary stream's [`StreamType`](crate::StreamType)
/// default mapping before the first fragment is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct PesHeader {
    /// PES `stream_id`.
    pub stream_id: u8,
    /// Optional header, if this PES packet carries timing information.
    pub optional_header: Option<PesOptionalHeader>,
}

fn encode_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    let ts = ts & 0x1_FFFF_FFFF;
    [
        (prefix << 4) | ((((ts >> 30) & 0x7) as u8) << 1) | 1,
        ((ts >> 22) & 0xFF) as u8,
        ((((ts >> 15) & 0x7F) as u8) << 1) | 1,
        ((ts >> 7) & 0xFF) as u8,
        (((ts & 0x7F) as u8) << 1) | 1,
    ]
}

/// Number of bytes the optional header (3-byte flags block plus PTS/DTS) will occupy,
/// or 0 if there is no optional header at all.
pub fn calc_pes_optional_header_length(optional_header: Option<&PesOptionalHeader>) -> usize {
    match optional_header {
        None => 0,
        Some(opt) => {
            let mut len = 3;
            if opt.pts.is_some() {
                len += 5;
            }
            if opt.dts.is_some() {
                len += 5;
            }
            len
        }
    }
}

/// Total length of the fixed PES header (6 bytes) plus any optional header.
pub fn calc_pes_header_length(header: &PesHeader) -> usize {
    6 + calc_pes_optional_header_length(header.optional_header.as_ref())
}

fn write_optional_header(buf: &mut Vec<u8>, opt: &PesOptionalHeader) {
    let additional_len = opt.pts.map_or(0, |_| 5) + opt.dts.map_or(0, |_| 5);
    let flags = PesOptionalHeaderFlags::new()
        .with_marker_bits(0b10)
        .with_scrambling_control(0)
        .with_priority(false)
        .with_data_alignment_indicator(opt.data_alignment_indicator)
        .with_copyright(false)
        .with_original_or_copy(false)
        .with_has_pts(opt.pts.is_some())
        .with_has_dts(opt.dts.is_some())
        .with_has_escr(false)
        .with_has_es_rate(false)
        .with_has_dsm_trick_mode(false)
        .with_has_additional_copy_info(false)
        .with_has_crc(false)
        .with_has_extension(false)
        .with_additional_header_length(additional_len as u8);
    buf.extend_from_slice(&flags.into_bytes());

    match (opt.pts, opt.dts) {
        (Some(pts), Some(dts)) => {
            buf.extend_from_slice(&encode_timestamp(0b0011, pts));
            buf.extend_from_slice(&encode_timestamp(0b0001, dts));
        }
        (Some(pts), None) => buf.extend_from_slice(&encode_timestamp(0b0010, pts)),
        (None, None) => {}
        (None, Some(_)) => unreachable!("DTS without PTS is forbidden by ISO/IEC 13818-1"),
    }
}

/// Serializes a PES fragment into `buf`, returning `(total_bytes_written,
/// payload_bytes_consumed)`.
///
/// On the first fragment (`payload_start = true`) this writes the full PES header
/// (and optional header, if any) followed by as much of `data` as fits in
/// `bytes_available`. On later fragments it writes raw payload bytes only.
///
/// `PES_packet_length` is set to the optional-header length plus the full payload
/// length when that sum fits in 16 bits, and to `0` (unspecified) otherwise — the
/// common case for long-running video elementary streams.
pub fn write_pes_data(
    buf: &mut Vec<u8>,
    header: &PesHeader,
    data: &[u8],
    payload_start: bool,
    bytes_available: usize,
) -> (usize, usize) {
    if !payload_start {
        let n = bytes_available.min(data.len());
        buf.extend_from_slice(&data[..n]);
        return (n, n);
    }

    let optional_len = calc_pes_optional_header_length(header.optional_header.as_ref());
    let total_len = optional_len + data.len();
    let packet_length = if total_len <= 0xFFFF { total_len as u16 } else { 0 };

    let fixed = PesFixedHeader::new()
        .with_start_code_prefix(PES_START_CODE_PREFIX)
        .with_stream_id(header.stream_id)
        .with_packet_length(packet_length);
    buf.extend_from_slice(&fixed.into_bytes());

    if let Some(opt) = &header.optional_header {
        write_optional_header(buf, opt);
    }

    let header_len = 6 + optional_len;
    let payload_capacity = bytes_available.saturating_sub(header_len);
    let n = payload_capacity.min(data.len());
    buf.extend_from_slice(&data[..n]);
    (header_len + n, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fragment_writes_start_code_and_stream_id() {
        let header = PesHeader {
            stream_id: 0xE0,
            optional_header: None,
        };
        let mut buf = Vec::new();
        let (total, consumed) = write_pes_data(&mut buf, &header, &[1, 2, 3], true, 100);
        assert_eq!(&buf[0..3], &[0x00, 0x00, 0x01]);
        assert_eq!(buf[3], 0xE0);
        assert_eq!(total, 6 + 3);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn subsequent_fragment_is_raw_payload() {
        let header = PesHeader::default();
        let mut buf = Vec::new();
        let (total, consumed) = write_pes_data(&mut buf, &header, &[9, 9, 9, 9], false, 2);
        assert_eq!(buf, vec![9, 9]);
        assert_eq!(total, 2);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn pts_and_dts_use_distinct_prefix_nibbles() {
        let header = PesHeader {
            stream_id: 0xE0,
            optional_header: Some(PesOptionalHeader {
                data_alignment_indicator: false,
                pts: Some(5_726_623_060),
                dts: Some(5_726_623_060),
            }),
        };
        let mut buf = Vec::new();
        write_pes_data(&mut buf, &header, &[], true, 188);
        // 6 fixed + 3 optional flags + 5 pts + 5 dts = 19
        assert_eq!(buf.len(), 19);
        assert_eq!(buf[9] >> 4, 0b0011); // PTS prefix nibble
        assert_eq!(buf[14] >> 4, 0b0001); // DTS prefix nibble
    }

    #[test]
    fn unspecified_length_falls_back_to_zero() {
        let header = PesHeader {
            stream_id: 0xE0,
            optional_header: None,
        };
        let data = vec![0u8; 70_000];
        let mut buf = Vec::new();
        write_pes_data(&mut buf, &header, &data, true, 70_010);
        let fixed = PesFixedHeader::from_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5]]);
        assert_eq!(fixed.packet_length(), 0);
    }
}
