//! Video codec negotiation

use super::sdp::SdpMedia;

/// Codec information extracted from an rtpmap line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCodec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
}

impl VideoCodec {
    pub fn new(payload_type: u8, name: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            payload_type,
            name: name.into(),
            clock_rate,
        }
    }

    /// Encoding name for rtpmap
    pub fn encoding(&self) -> String {
        format!("{}/{}", self.name, self.clock_rate)
    }

    fn matches(&self, other: &VideoCodec) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.clock_rate == other.clock_rate
    }
}

/// Extract the codecs proposed in a video media description
pub fn extract_video_codecs(media: &SdpMedia) -> Vec<VideoCodec> {
    media
        .rtpmap
        .iter()
        .filter_map(|(pt, encoding)| {
            let payload_type = pt.parse().ok()?;
            let (name, clock_rate) = encoding.split_once('/')?;
            Some(VideoCodec {
                payload_type,
                name: name.to_string(),
                clock_rate: clock_rate.parse().ok()?,
            })
        })
        .collect()
}

/// Select a codec supported by both sides.
///
/// Walks the locally supported list in order and returns the first codec the
/// remote proposed as well; local order therefore encodes the preference.
/// The returned codec carries the remote payload type so the answer echoes
/// the offer's numbering.
pub fn negotiate_video_codec(
    supported: &[VideoCodec],
    proposed: &[VideoCodec],
) -> Option<VideoCodec> {
    for local in supported {
        if let Some(remote) = proposed.iter().find(|p| p.matches(local)) {
            return Some(remote.clone());
        }
    }
    None
}
