//! Elementary stream type codes (ISO/IEC 13818-1 Table 2-34) and their default PES
//! `stream_id` mapping.

/// `stream_type` byte carried in a PMT elementary-stream descriptor loop entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// ISO/IEC 11172-2 (MPEG-1) video.
    MPEG1Video,
    /// ISO/IEC 13818-2 (MPEG-2) video.
    MPEG2Video,
    /// ISO/IEC 11172-3 (MPEG-1) audio.
    MPEG1Audio,
    /// ISO/IEC 13818-3 (MPEG-2) audio.
    MPEG2Audio,
    /// ISO/IEC 13818-7 Audio with ADTS transport syntax (AAC).
    ADTSAudio,
    /// ISO/IEC 14496-3 Audio with LATM transport syntax (AAC).
    LATMAudio,
    /// ITU-T H.264 / ISO/IEC 14496-10 video.
    H264Video,
    /// ITU-T H.265 / ISO/IEC 23008-2 (HEVC) video.
    H265Video,
    /// ATSC A/52 (AC-3) audio, carried as a registered private stream type.
    AC3Audio,
    /// A stream type not enumerated here; the caller is responsible for any
    /// PES `stream_id` this stream needs.
    Private(u8),
}

impl StreamType {
    /// The raw `stream_type` byte.
    pub fn as_u8(self) -> u8 {
        match self {
            StreamType::MPEG1Video => 0x01,
            StreamType::MPEG2Video => 0x02,
            StreamType::MPEG1Audio => 0x03,
            StreamType::MPEG2Audio => 0x04,
            StreamType::ADTSAudio => 0x0F,
            StreamType::LATMAudio => 0x11,
            StreamType::H264Video => 0x1B,
            StreamType::H265Video => 0x24,
            StreamType::AC3Audio => 0x81,
            StreamType::Private(v) => v,
        }
    }

    /// The default PES `stream_id` to assign a PES packet carrying this stream type,
    /// used by the muxer when the caller leaves `PesHeader::stream_id` at zero.
    ///
    /// Returns `None` for stream types this crate doesn't have a canonical mapping
    /// for; the caller must pre-fill `stream_id` in that case.
    pub fn default_pes_stream_id(self) -> Option<u8> {
        match self {
            StreamType::MPEG1Video | StreamType::MPEG2Video | StreamType::H264Video | StreamType::H265Video => {
                Some(0xE0)
            }
            StreamType::MPEG1Audio | StreamType::MPEG2Audio | StreamType::ADTSAudio | StreamType::LATMAudio => {
                Some(0xC0)
            }
            StreamType::AC3Audio => Some(0xBD),
            StreamType::Private(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h264_maps_to_video_stream_id() {
        assert_eq!(StreamType::H264Video.as_u8(), 0x1B);
        assert_eq!(StreamType::H264Video.default_pes_stream_id(), Some(0xE0));
    }

    #[test]
    fn adts_aac_maps_to_audio_stream_id() {
        assert_eq!(StreamType::ADTSAudio.as_u8(), 0x0F);
        assert_eq!(StreamType::ADTSAudio.default_pes_stream_id(), Some(0xC0));
    }

    #[test]
    fn private_stream_type_has_no_default() {
        assert_eq!(StreamType::Private(0x06).default_pes_stream_id(), None);
    }
}
