//! Simple SDP (Session Description Protocol) handling

use std::fmt;

/// Simple SDP session
#[derive(Debug, Clone)]
pub struct SdpSession {
    pub version: u32,
    pub origin: SdpOrigin,
    pub session_name: String,
    pub connection: SdpConnection,
    pub media: Vec<SdpMedia>,
}

#[derive(Debug, Clone)]
pub struct SdpOrigin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct SdpConnection {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

/// Stream direction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
}

impl SdpDirection {
    fn as_attr(&self) -> &'static str {
        match self {
            SdpDirection::SendRecv => "sendrecv",
            SdpDirection::SendOnly => "sendonly",
            SdpDirection::RecvOnly => "recvonly",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SdpMedia {
    pub media_type: String,   // "video", "message"
    pub port: u16,
    pub protocol: String,     // "RTP/AVP" or "TCP/MSRP"
    pub formats: Vec<String>, // Codec payload types
    pub rtpmap: Vec<(String, String)>, // (payload_type, encoding)
    pub direction: Option<SdpDirection>,
    /// Non-rtpmap attributes, verbatim (name, value)
    pub attributes: Vec<(String, String)>,
}

impl SdpSession {
    fn base(local_address: &str, media: Vec<SdpMedia>) -> Self {
        Self {
            version: 0,
            origin: SdpOrigin {
                username: "chitchat".to_string(),
                session_id: chrono::Utc::now().timestamp().to_string(),
                session_version: "1".to_string(),
                network_type: "IN".to_string(),
                address_type: "IP4".to_string(),
                address: local_address.to_string(),
            },
            session_name: "-".to_string(),
            connection: SdpConnection {
                network_type: "IN".to_string(),
                address_type: "IP4".to_string(),
                address: local_address.to_string(),
            },
            media,
        }
    }

    /// Video answer with a single negotiated codec
    pub fn create_video_answer(
        local_address: &str,
        local_port: u16,
        payload_type: u8,
        encoding: &str,
        direction: SdpDirection,
    ) -> Self {
        Self::base(
            local_address,
            vec![SdpMedia {
                media_type: "video".to_string(),
                port: local_port,
                protocol: "RTP/AVP".to_string(),
                formats: vec![payload_type.to_string()],
                rtpmap: vec![(payload_type.to_string(), encoding.to_string())],
                direction: Some(direction),
                attributes: Vec::new(),
            }],
        )
    }

    /// MSRP message media for image transfer
    pub fn create_image_transfer(
        local_address: &str,
        local_port: u16,
        msrp_path: &str,
        mime_type: &str,
        direction: SdpDirection,
    ) -> Self {
        Self::base(
            local_address,
            vec![SdpMedia {
                media_type: "message".to_string(),
                port: local_port,
                protocol: "TCP/MSRP".to_string(),
                formats: vec!["*".to_string()],
                rtpmap: Vec::new(),
                direction: Some(direction),
                attributes: vec![
                    ("path".to_string(), msrp_path.to_string()),
                    ("accept-types".to_string(), mime_type.to_string()),
                ],
            }],
        )
    }

    /// Session-level description without media lines, used by capability
    /// exchanges
    pub fn create_capability_description(local_address: &str) -> Self {
        Self::base(local_address, Vec::new())
    }

    /// First media description of a given type
    pub fn media_description(&self, media_type: &str) -> Option<&SdpMedia> {
        self.media.iter().find(|m| m.media_type == media_type)
    }

    /// Parse SDP from string
    pub fn parse(sdp_body: &str) -> Option<Self> {
        let mut version = 0;
        let mut origin: Option<SdpOrigin> = None;
        let mut session_name = String::new();
        let mut connection: Option<SdpConnection> = None;
        let mut media: Vec<SdpMedia> = Vec::new();
        let mut current_media: Option<SdpMedia> = None;

        for line in sdp_body.lines() {
            let line = line.trim_end_matches('\r').trim();
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                continue;
            }
            let (kind, value) = (line.as_bytes()[0], &line[2..]);

            match kind {
                b'v' => version = value.parse().unwrap_or(0),
                b'o' => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() == 6 {
                        origin = Some(SdpOrigin {
                            username: parts[0].to_string(),
                            session_id: parts[1].to_string(),
                            session_version: parts[2].to_string(),
                            network_type: parts[3].to_string(),
                            address_type: parts[4].to_string(),
                            address: parts[5].to_string(),
                        });
                    }
                }
                b's' => session_name = value.to_string(),
                b'c' => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() == 3 {
                        connection = Some(SdpConnection {
                            network_type: parts[0].to_string(),
                            address_type: parts[1].to_string(),
                            address: parts[2].to_string(),
                        });
                    }
                }
                b'm' => {
                    if let Some(m) = current_media.take() {
                        media.push(m);
                    }
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() >= 3 {
                        current_media = Some(SdpMedia {
                            media_type: parts[0].to_string(),
                            port: parts[1].parse().unwrap_or(0),
                            protocol: parts[2].to_string(),
                            formats: parts[3..].iter().map(|s| s.to_string()).collect(),
                            rtpmap: Vec::new(),
                            direction: None,
                            attributes: Vec::new(),
                        });
                    }
                }
                b'a' => {
                    if let Some(m) = current_media.as_mut() {
                        match value {
                            "sendrecv" => m.direction = Some(SdpDirection::SendRecv),
                            "sendonly" => m.direction = Some(SdpDirection::SendOnly),
                            "recvonly" => m.direction = Some(SdpDirection::RecvOnly),
                            _ => {
                                if let Some(rest) = value.strip_prefix("rtpmap:") {
                                    if let Some((pt, encoding)) = rest.split_once(' ') {
                                        m.rtpmap
                                            .push((pt.to_string(), encoding.to_string()));
                                    }
                                } else if let Some((name, attr_value)) = value.split_once(':') {
                                    m.attributes
                                        .push((name.to_string(), attr_value.to_string()));
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(m) = current_media.take() {
            media.push(m);
        }

        Some(Self {
            version,
            origin: origin?,
            session_name,
            connection: connection?,
            media,
        })
    }
}

impl fmt::Display for SdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.version)?;
        write!(
            f,
            "o={} {} {} {} {} {}\r\n",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            self.origin.network_type,
            self.origin.address_type,
            self.origin.address
        )?;
        write!(f, "s={}\r\n", self.session_name)?;
        write!(
            f,
            "c={} {} {}\r\n",
            self.connection.network_type, self.connection.address_type, self.connection.address
        )?;
        write!(f, "t=0 0\r\n")?;

        for media in &self.media {
            write!(
                f,
                "m={} {} {} {}\r\n",
                media.media_type,
                media.port,
                media.protocol,
                media.formats.join(" ")
            )?;
            for (name, value) in &media.attributes {
                write!(f, "a={}:{}\r\n", name, value)?;
            }
            for (pt, encoding) in &media.rtpmap {
                write!(f, "a=rtpmap:{} {}\r\n", pt, encoding)?;
            }
            if let Some(direction) = media.direction {
                write!(f, "a={}\r\n", direction.as_attr())?;
            }
        }
        Ok(())
    }
}
