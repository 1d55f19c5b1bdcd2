//! Single-program MPEG-2 Transport Stream multiplexer.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! mpegts-mux = "~0.1.0"
//! ```
//!
//! # Example
//!
//! ```
//! use mpegts_mux::{Muxer, MuxerData, MuxerOptions, PesHeader, PmtElementaryStreamDecl, StreamType};
//!
//! let mut muxer = Muxer::new(Vec::new(), MuxerOptions::default());
//! let pid = muxer
//!     .add_elementary_stream(PmtElementaryStreamDecl {
//!         elementary_pid: 0,
//!         stream_type: StreamType::H264Video,
//!     })
//!     .expect("adding the first elementary stream never fails");
//! muxer.set_pcr_pid(pid);
//!
//! let mut data = MuxerData {
//!     pid,
//!     adaptation_field: None,
//!     pes_header: PesHeader::default(),
//!     data: vec![0u8; 64],
//! };
//! muxer.write_data(&mut data).expect("writing to a Vec<u8> sink never fails");
//! ```

#![allow(unused)]
#![deny(missing_docs, unsafe_code, warnings)]

mod bit_writer;
pub use bit_writer::BitWriter;

mod wrapping_counter;
pub use wrapping_counter::WrappingCounter;

mod crc;

mod stream_type;
pub use stream_type::StreamType;

mod adaptation_field;
pub use adaptation_field::{AdaptationField, ClockReference};

mod packet;
pub use packet::{Packet, PacketHeader, TransportScramblingControl, SYNC_BYTE};

mod pes;
pub use pes::{PesHeader, PesOptionalHeader};

mod psi;
pub use psi::{
    Descriptor, PatData, PatEntry, PmtData, PmtElementaryStream, TABLE_ID_PAT, TABLE_ID_PMT,
};

mod program_map;
pub use program_map::{ProgramMap, PMT_START_PID, PROGRAM_NUMBER_START};

mod muxer;
pub use muxer::{
    Muxer, MuxerData, MuxerOptions, PmtElementaryStreamDecl, AUTO_PID_START,
    DEFAULT_TABLES_RETRANSMIT_PERIOD,
};

/// Size in bytes of a standard (non-M2TS) MPEG transport stream packet.
pub const MPEG_TS_PACKET_SIZE: usize = 188;

/// PID of the Program Association Table.
pub const PID_PAT: u16 = 0x0000;
/// PID of the Conditional Access Table.
pub const PID_CAT: u16 = 0x0001;
/// First PID reserved for DVB Network Information Table variants (inclusive).
pub const PID_NIT_RANGE_START: u16 = 0x0010;
/// Last PID reserved for DVB Network Information Table variants (inclusive).
pub const PID_NIT_RANGE_END: u16 = 0x0014;
/// PID reserved for a discontinuity information table.
pub const PID_DIT: u16 = 0x001E;
/// PID reserved for a selection information table.
pub const PID_SIT: u16 = 0x001F;

/// Errors returned by muxer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation references an elementary PID that is not currently registered.
    #[error("PID {0:#x} is not registered with this muxer")]
    PidMissing(u16),
    /// Adding an elementary stream would shadow an existing PID.
    #[error("PID {0:#x} is already registered with this muxer")]
    PidAlreadyExists(u16),
    /// The configured PCR PID does not match any currently registered elementary stream.
    #[error("PCR PID {0:#x} does not match any registered elementary stream")]
    PcrPidInvalid(u16),
    /// The downstream byte sink failed.
    #[error("I/O error writing transport stream output")]
    Io(#[from] std::io::Error),
    /// A packet's header, adaptation field, and payload together exceeded
    /// [`MPEG_TS_PACKET_SIZE`]; indicates a bug in fragmentation logic.
    #[error("packet payload of {0} bytes exceeds the {MPEG_TS_PACKET_SIZE}-byte packet size")]
    PacketOverflow(usize),
}
