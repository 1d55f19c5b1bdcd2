//! Muxer core: orchestrates table retransmission, PES fragmentation, and continuity
//! counters for a single MPEG-2 program.

use crate::adaptation_field::{calc_adaptation_field_length, AdaptationField};
use crate::packet::{write_packet, Packet};
use crate::pes::{calc_pes_header_length, write_pes_data, PesHeader};
use crate::program_map::{ProgramMap, PMT_START_PID, PROGRAM_NUMBER_START};
use crate::psi::{write_pat_section, write_pmt_section, PmtData, PmtElementaryStream};
use crate::stream_type::StreamType;
use crate::wrapping_counter::WrappingCounter;
use crate::{Error, MPEG_TS_PACKET_SIZE, PID_PAT};
use log::{error, warn};
use std::io::Write;

/// Default number of `write_data` calls between unconditional table retransmissions.
pub const DEFAULT_TABLES_RETRANSMIT_PERIOD: u32 = 40;

/// Builds an adaptation field that fills exactly `total_bytes` of packet budget with no
/// prior adaptation field to extend. A plain stuffing field always costs at least 2
/// bytes (length + flags); when only 1 byte is available, the length-byte-only form is
/// the sole valid encoding.
fn new_filler_adaptation_field(total_bytes: usize) -> AdaptationField {
    if total_bytes <= 1 {
        AdaptationField::length_byte_only()
    } else {
        AdaptationField::stuffing(total_bytes - 2)
    }
}

/// One elementary stream declared to the muxer via [`Muxer::add_elementary_stream`].
#[derive(Debug, Clone)]
pub struct PmtElementaryStreamDecl {
    /// PID to carry this stream on. `0` requests auto-assignment.
    pub elementary_pid: u16,
    /// Stream type to advertise in the PMT and to infer a default PES `stream_id` from.
    pub stream_type: StreamType,
}

struct EsContext {
    stream_type: StreamType,
    cc: WrappingCounter,
}

/// Caller-supplied data for one logical PES payload write.
pub struct MuxerData {
    /// Elementary stream PID this payload belongs to.
    pub pid: u16,
    /// Adaptation field to attach to the first TS packet of this payload, if any.
    pub adaptation_field: Option<AdaptationField>,
    /// PES header (stream_id, optional PTS/DTS) for this payload.
    pub pes_header: PesHeader,
    /// Raw elementary stream bytes to fragment into PES packets.
    pub data: Vec<u8>,
}

/// Builder-style options for [`Muxer::new`], mirroring the teacher crate's functional
/// option pattern.
#[derive(Debug, Clone, Copy)]
pub struct MuxerOptions {
    tables_retransmit_period: u32,
}

impl Default for MuxerOptions {
    fn default() -> Self {
        Self {
            tables_retransmit_period: DEFAULT_TABLES_RETRANSMIT_PERIOD,
        }
    }
}

impl MuxerOptions {
    /// Number of `write_data` calls between unconditional PAT/PMT retransmissions.
    pub fn tables_retransmit_period(mut self, period: u32) -> Self {
        self.tables_retransmit_period = period;
        self
    }
}

/// PID outside the reserved PSI range (0x0000-0x001F) used as the starting point for
/// auto-assigned elementary PIDs.
pub const AUTO_PID_START: u16 = 0x0100;

/// Single-program MPEG-2 Transport Stream multiplexer.
pub struct Muxer<W: Write> {
    sink: W,
    tables_retransmit_period: u32,
    tables_retransmit_counter: u32,

    program_map: ProgramMap,
    pm_updated: bool,

    program_number: u16,
    pcr_pid: u16,
    elementary_streams: Vec<PmtElementaryStreamDecl>,
    pmt_updated: bool,

    next_auto_pid: u16,

    pat_version: WrappingCounter,
    pmt_version: WrappingCounter,
    pat_cc: WrappingCounter,
    pmt_cc: WrappingCounter,

    pat_bytes: Vec<u8>,
    pmt_bytes: Vec<u8>,

    es_contexts: std::collections::HashMap<u16, EsContext>,
}

impl<W: Write> Muxer<W> {
    /// Creates a new muxer writing to `sink`, with the default single program
    /// (program_number 1, PMT at PID 0x1000) pre-registered.
    pub fn new(sink: W, options: MuxerOptions) -> Self {
        let mut program_map = ProgramMap::new();
        program_map.set(PMT_START_PID, PROGRAM_NUMBER_START);

        let tables_retransmit_period = options.tables_retransmit_period;
        Self {
            sink,
            tables_retransmit_period,
            // Seeded equal to the period so the very first write_data call emits tables.
            tables_retransmit_counter: tables_retransmit_period,

            program_map,
            pm_updated: true,

            program_number: PROGRAM_NUMBER_START,
            pcr_pid: 0,
            elementary_streams: Vec::new(),
            pmt_updated: true,

            next_auto_pid: AUTO_PID_START,

            pat_version: WrappingCounter::new(0b1_1111),
            pmt_version: WrappingCounter::new(0b1_1111),
            pat_cc: WrappingCounter::new(0b1111),
            pmt_cc: WrappingCounter::new(0b1111),

            pat_bytes: Vec::new(),
            pmt_bytes: Vec::new(),

            es_contexts: std::collections::HashMap::new(),
        }
    }

    /// Registers a new elementary stream. If `es.elementary_pid` is `0`, a PID is
    /// auto-assigned starting at [`AUTO_PID_START`].
    pub fn add_elementary_stream(&mut self, mut es: PmtElementaryStreamDecl) -> Result<u16, Error> {
        if es.elementary_pid != 0 {
            if self.elementary_streams.iter().any(|e| e.elementary_pid == es.elementary_pid) {
                return Err(Error::PidAlreadyExists(es.elementary_pid));
            }
        } else {
            es.elementary_pid = self.next_auto_pid;
            self.next_auto_pid += 1;
        }

        let pid = es.elementary_pid;
        self.es_contexts.insert(
            pid,
            EsContext {
                stream_type: es.stream_type,
                cc: WrappingCounter::new(0b1111),
            },
        );
        self.elementary_streams.push(es);
        self.pmt_bytes.clear();
        self.pmt_updated = true;
        Ok(pid)
    }

    /// Removes the elementary stream carried on `pid`.
    pub fn remove_elementary_stream(&mut self, pid: u16) -> Result<(), Error> {
        let idx = self
            .elementary_streams
            .iter()
            .position(|e| e.elementary_pid == pid)
            .ok_or(Error::PidMissing(pid))?;
        self.elementary_streams.remove(idx);
        self.es_contexts.remove(&pid);
        self.pmt_bytes.clear();
        self.pmt_updated = true;
        Ok(())
    }

    /// Marks `pid` as the elementary stream carrying this program's PCR.
    pub fn set_pcr_pid(&mut self, pid: u16) {
        self.pcr_pid = pid;
        self.pmt_updated = true;
    }

    fn generate_pat(&mut self) -> Result<(), Error> {
        let version_number = if self.pm_updated {
            self.pat_version.inc()
        } else {
            self.pat_version.get()
        };

        let data = self.program_map.to_pat_data(0);
        let mut payload = vec![0u8]; // pointer_field: section starts immediately after.
        payload.extend_from_slice(&write_pat_section(&data, version_number));

        let packet = Packet::payload_only(PID_PAT, self.pat_cc.inc(), payload);
        self.pat_bytes.clear();
        write_packet(&mut self.pat_bytes, &packet, MPEG_TS_PACKET_SIZE)?;

        self.pm_updated = false;
        Ok(())
    }

    fn generate_pmt(&mut self) -> Result<(), Error> {
        if !self.elementary_streams.iter().any(|e| e.elementary_pid == self.pcr_pid) {
            error!("PCR PID {:#x} does not match any registered elementary stream", self.pcr_pid);
            return Err(Error::PcrPidInvalid(self.pcr_pid));
        }

        let version_number = if self.pmt_updated {
            self.pmt_version.inc()
        } else {
            self.pmt_version.get()
        };

        let data = PmtData {
            program_number: self.program_number,
            pcr_pid: self.pcr_pid,
            program_descriptors: Vec::new(),
            elementary_streams: self
                .elementary_streams
                .iter()
                .map(|e| PmtElementaryStream {
                    stream_type: e.stream_type.as_u8(),
                    elementary_pid: e.elementary_pid,
                    descriptors: Vec::new(),
                })
                .collect(),
        };
        let mut payload = vec![0u8]; // pointer_field: section starts immediately after.
        payload.extend_from_slice(&write_pmt_section(&data, version_number));

        let packet = Packet::payload_only(PMT_START_PID, self.pmt_cc.inc(), payload);
        self.pmt_bytes.clear();
        write_packet(&mut self.pmt_bytes, &packet, MPEG_TS_PACKET_SIZE)?;

        self.pmt_updated = false;
        Ok(())
    }

    /// Regenerates (if dirty) and writes the PAT and PMT packets to the sink,
    /// returning the number of bytes written (always `2 * 188` on success).
    pub fn write_tables(&mut self) -> Result<usize, Error> {
        self.generate_pat()?;
        self.generate_pmt()?;

        self.sink.write_all(&self.pat_bytes)?;
        self.sink.write_all(&self.pmt_bytes)?;
        Ok(self.pat_bytes.len() + self.pmt_bytes.len())
    }

    /// Writes a caller-supplied packet directly to the sink, bypassing the PES
    /// fragmentation path.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<usize, Error> {
        write_packet(&mut self.sink, packet, MPEG_TS_PACKET_SIZE)
    }

    fn retransmit_tables(&mut self, force: bool) -> Result<usize, Error> {
        self.tables_retransmit_counter += 1;
        if !force && self.tables_retransmit_counter < self.tables_retransmit_period {
            return Ok(0);
        }
        if force {
            warn!("forcing table retransmission ahead of random-access PCR packet");
        }
        let n = self.write_tables()?;
        self.tables_retransmit_counter = 0;
        Ok(n)
    }

    /// Fragments and writes one logical PES payload, interleaving table retransmission
    /// as required. Zeroes `d.adaptation_field`'s stuffing length on success.
    pub fn write_data(&mut self, d: &mut MuxerData) -> Result<usize, Error> {
        if !self.es_contexts.contains_key(&d.pid) {
            return Err(Error::PidMissing(d.pid));
        }

        let mut bytes_written = 0;

        let force = d
            .adaptation_field
            .as_ref()
            .map(|af| af.random_access_indicator && d.pid == self.pcr_pid)
            .unwrap_or(false);
        bytes_written += self.retransmit_tables(force)?;

        if d.pes_header.stream_id == 0 {
            let stream_type = self.es_contexts[&d.pid].stream_type;
            if let Some(stream_id) = stream_type.default_pes_stream_id() {
                d.pes_header.stream_id = stream_id;
            }
        }

        let mut payload_start = true;
        // Cloned rather than taken: the original stays in `d.adaptation_field` so its
        // stuffing_length can be reset for reuse once the loop below is done with it.
        let mut caller_af = d.adaptation_field.clone();
        let mut payload_bytes_written = 0usize;
        let mut scratch = Vec::with_capacity(MPEG_TS_PACKET_SIZE);

        while payload_bytes_written < d.data.len() {
            let mut af = caller_af.take();
            let mut has_payload = false;
            let mut pusi = false;

            let af_len = af.as_ref().map(calc_adaptation_field_length).unwrap_or(0);
            let mut bytes_available = MPEG_TS_PACKET_SIZE - 4 - af_len;

            if payload_start {
                let pes_header_length = calc_pes_header_length(&d.pes_header);
                if bytes_available < pes_header_length {
                    match &mut af {
                        Some(existing) => existing.stuffing_length += bytes_available,
                        None => af = Some(new_filler_adaptation_field(bytes_available)),
                    }
                } else {
                    has_payload = true;
                    pusi = true;
                }
            } else {
                has_payload = true;
            }

            scratch.clear();
            if has_payload {
                let (total, consumed) = write_pes_data(
                    &mut scratch,
                    &d.pes_header,
                    &d.data[payload_bytes_written..],
                    payload_start,
                    bytes_available,
                );
                payload_bytes_written += consumed;
                bytes_available -= total;

                if bytes_available > 0 {
                    match &mut af {
                        Some(existing) => existing.stuffing_length += bytes_available,
                        None => af = Some(new_filler_adaptation_field(bytes_available)),
                    }
                }
            }

            let cc = self.es_contexts.get_mut(&d.pid).unwrap().cc.inc();
            let packet = Packet {
                pid: d.pid,
                payload_unit_start_indicator: pusi,
                continuity_counter: cc,
                adaptation_field: af,
                payload: if has_payload { Some(std::mem::take(&mut scratch)) } else { None },
            };
            let n = write_packet(&mut self.sink, &packet, MPEG_TS_PACKET_SIZE)?;
            bytes_written += n;

            if has_payload {
                payload_start = false;
            }
        }

        if let Some(af) = &mut d.adaptation_field {
            af.stuffing_length = 0;
        }

        Ok(bytes_written)
    }
}
