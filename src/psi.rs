//! PAT and PMT section serialization.

use crate::bit_writer::BitWriter;
use crate::crc;
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;

/// table_id for a Program Association Table section.
pub const TABLE_ID_PAT: u8 = 0x00;
/// table_id for a Program Map Table section.
pub const TABLE_ID_PMT: u8 = 0x02;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PsiHeader {
    table_id: B8,
    section_syntax_indicator: bool,
    private_bit: bool,
    reserved_bits: B2,
    section_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PsiTableSyntax {
    table_id_extension: B16,
    reserved_bits: B2,
    version_number: B5,
    current_next_indicator: bool,
    section_number: B8,
    last_section_number: B8,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PatEntryBits {
    program_number: B16,
    reserved: B3,
    program_map_pid: B13,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PmtHeaderBits {
    reserved: B3,
    pcr_pid: B13,
    reserved2: B4,
    program_info_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct EsInfoHeaderBits {
    stream_type: B8,
    reserved: B3,
    elementary_pid: B13,
    reserved2: B4,
    es_info_length: B12,
}

/// Opaque descriptor: a tag byte followed by a length-prefixed data blob. This crate
/// carries descriptors verbatim; decoding specific descriptor semantics (DVB
/// descriptors etc.) is left to the application.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Descriptor tag.
    pub tag: u8,
    /// Descriptor payload, up to 255 bytes. Inline-stored up to 8 bytes, the common
    /// case for short descriptors (e.g. language or registration descriptors).
    pub data: SmallVec<[u8; 8]>,
}

impl Descriptor {
    fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }

    fn write(&self, buf: &mut BitWriter) {
        buf.write_byte(self.tag);
        buf.write_byte(self.data.len() as u8);
        buf.write_bytes(&self.data);
    }
}

fn descriptors_len(descriptors: &[Descriptor]) -> usize {
    descriptors.iter().map(Descriptor::encoded_len).sum()
}

fn write_descriptors(buf: &mut BitWriter, descriptors: &[Descriptor]) {
    for d in descriptors {
        d.write(buf);
    }
}

/// One `(program_number, program_map_pid)` association in a PAT.
#[derive(Debug, Clone, Copy)]
pub struct PatEntry {
    /// Program number; `0` is reserved for the network PID association.
    pub program_number: u16,
    /// PID of the PMT (or NIT, for program_number 0) describing this program.
    pub program_map_pid: u16,
}

/// Contents of a Program Association Table.
#[derive(Debug, Clone)]
pub struct PatData {
    /// `transport_stream_id`, carried as the section's `table_id_extension`.
    pub transport_stream_id: u16,
    /// Program associations.
    pub entries: Vec<PatEntry>,
}

/// One elementary stream entry in a PMT.
#[derive(Debug, Clone)]
pub struct PmtElementaryStream {
    /// `stream_type` byte.
    pub stream_type: u8,
    /// PID this elementary stream is carried on.
    pub elementary_pid: u16,
    /// ES-level descriptors.
    pub descriptors: Vec<Descriptor>,
}

/// Contents of a Program Map Table.
#[derive(Debug, Clone)]
pub struct PmtData {
    /// Program number this PMT describes.
    pub program_number: u16,
    /// PID carrying the PCR for this program.
    pub pcr_pid: u16,
    /// Program-level descriptors.
    pub program_descriptors: Vec<Descriptor>,
    /// Elementary streams belonging to this program.
    pub elementary_streams: Vec<PmtElementaryStream>,
}

/// Computes the `section_length` field value (bytes following the length field
/// through the CRC, inclusive) for a PAT with the given entries.
pub fn calc_pat_section_length(data: &PatData) -> u16 {
    (5 + data.entries.len() * 4 + 4) as u16
}

/// Computes the `section_length` field value for a PMT with the given elementary
/// streams and descriptors.
pub fn calc_pmt_section_length(data: &PmtData) -> u16 {
    let mut len = 5 + 4 + descriptors_len(&data.program_descriptors);
    for es in &data.elementary_streams {
        len += 5 + descriptors_len(&es.descriptors);
    }
    len += 4; // CRC
    len as u16
}

/// Serializes a PAT section (header, syntax, entries, CRC) and returns the bytes.
pub fn write_pat_section(data: &PatData, version_number: u8) -> Vec<u8> {
    let section_length = calc_pat_section_length(data);
    let mut buf = BitWriter::with_capacity(3 + section_length as usize);

    let header = PsiHeader::new()
        .with_table_id(TABLE_ID_PAT)
        .with_section_syntax_indicator(true)
        .with_private_bit(false)
        .with_reserved_bits(0b11)
        .with_section_length(section_length);
    buf.write_bytes(&header.into_bytes());

    let syntax = PsiTableSyntax::new()
        .with_table_id_extension(data.transport_stream_id)
        .with_reserved_bits(0b11)
        .with_version_number(version_number)
        .with_current_next_indicator(true)
        .with_section_number(0)
        .with_last_section_number(0);
    buf.write_bytes(&syntax.into_bytes());

    for entry in &data.entries {
        let bits = PatEntryBits::new()
            .with_program_number(entry.program_number)
            .with_reserved(0b111)
            .with_program_map_pid(entry.program_map_pid);
        buf.write_bytes(&bits.into_bytes());
    }

    let crc_value = crc::checksum(buf.as_slice());
    buf.write_bytes(&crc_value.to_be_bytes());
    buf.into_inner()
}

/// Serializes a PMT section (header, syntax, body, CRC) and returns the bytes.
pub fn write_pmt_section(data: &PmtData, version_number: u8) -> Vec<u8> {
    let section_length = calc_pmt_section_length(data);
    let mut buf = BitWriter::with_capacity(3 + section_length as usize);

    let header = PsiHeader::new()
        .with_table_id(TABLE_ID_PMT)
        .with_section_syntax_indicator(true)
        .with_private_bit(false)
        .with_reserved_bits(0b11)
        .with_section_length(section_length);
    buf.write_bytes(&header.into_bytes());

    let syntax = PsiTableSyntax::new()
        .with_table_id_extension(data.program_number)
        .with_reserved_bits(0b11)
        .with_version_number(version_number)
        .with_current_next_indicator(true)
        .with_section_number(0)
        .with_last_section_number(0);
    buf.write_bytes(&syntax.into_bytes());

    let program_info_length = descriptors_len(&data.program_descriptors) as u16;
    let pmt_header = PmtHeaderBits::new()
        .with_reserved(0b111)
        .with_pcr_pid(data.pcr_pid)
        .with_reserved2(0b1111)
        .with_program_info_length(program_info_length);
    buf.write_bytes(&pmt_header.into_bytes());
    write_descriptors(&mut buf, &data.program_descriptors);

    for es in &data.elementary_streams {
        let es_info_length = descriptors_len(&es.descriptors) as u16;
        let es_header = EsInfoHeaderBits::new()
            .with_stream_type(es.stream_type)
            .with_reserved(0b111)
            .with_elementary_pid(es.elementary_pid)
            .with_reserved2(0b1111)
            .with_es_info_length(es_info_length);
        buf.write_bytes(&es_header.into_bytes());
        write_descriptors(&mut buf, &es.descriptors);
    }

    let crc_value = crc::checksum(buf.as_slice());
    buf.write_bytes(&crc_value.to_be_bytes());
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pat_matches_known_vector() {
        let data = PatData {
            transport_stream_id: 0,
            entries: vec![PatEntry {
                program_number: 1,
                program_map_pid: 0x1000,
            }],
        };
        let bytes = write_pat_section(&data, 0);
        assert_eq!(bytes.len(), 3 + calc_pat_section_length(&data) as usize);
        let crc_bytes = &bytes[bytes.len() - 4..];
        assert_eq!(u32::from_be_bytes(crc_bytes.try_into().unwrap()), 0x7110D878);
    }

    #[test]
    fn pat_version_bump_changes_crc() {
        let data = PatData {
            transport_stream_id: 0,
            entries: vec![PatEntry {
                program_number: 1,
                program_map_pid: 0x1000,
            }],
        };
        let bytes = write_pat_section(&data, 1);
        let crc_bytes = &bytes[bytes.len() - 4..];
        assert_eq!(u32::from_be_bytes(crc_bytes.try_into().unwrap()), 0xEFBE085A);
    }

    #[test]
    fn pmt_video_only_matches_known_vector() {
        let data = PmtData {
            program_number: 1,
            pcr_pid: 0x1234,
            program_descriptors: vec![],
            elementary_streams: vec![PmtElementaryStream {
                stream_type: 0x1B,
                elementary_pid: 0x1234,
                descriptors: vec![],
            }],
        };
        assert_eq!(calc_pmt_section_length(&data), 18);
        let bytes = write_pmt_section(&data, 0);
        let crc_bytes = &bytes[bytes.len() - 4..];
        assert_eq!(u32::from_be_bytes(crc_bytes.try_into().unwrap()), 0x31485BA2);
    }

    #[test]
    fn pmt_video_and_audio_matches_known_vectors() {
        let data = PmtData {
            program_number: 1,
            pcr_pid: 0x1234,
            program_descriptors: vec![],
            elementary_streams: vec![
                PmtElementaryStream {
                    stream_type: 0x1B,
                    elementary_pid: 0x1234,
                    descriptors: vec![],
                },
                PmtElementaryStream {
                    stream_type: 0x0F,
                    elementary_pid: 0x0234,
                    descriptors: vec![],
                },
            ],
        };
        let v0 = write_pmt_section(&data, 0);
        let crc0 = u32::from_be_bytes(v0[v0.len() - 4..].try_into().unwrap());
        assert_eq!(crc0, 0x2952C450);

        let v1 = write_pmt_section(&data, 1);
        let crc1 = u32::from_be_bytes(v1[v1.len() - 4..].try_into().unwrap());
        assert_eq!(crc1, 0x06F4A6EA);
    }
}
