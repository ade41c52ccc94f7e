//! Capability records and feature tags
//!
//! Per-contact knowledge of supported RCS services, discovered through the
//! OPTIONS procedure and cached by the contact repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::value_objects::ContactId;

/// RCS feature tags carried in Contact/Accept-Contact headers
pub const FEATURE_TAG_IM_SESSION: &str = "+g.oma.sip-im";
pub const FEATURE_TAG_FT_HTTP: &str =
    "+g.3gpp.iari-ref=\"urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.fthttp\"";
pub const FEATURE_TAG_IMAGE_SHARE: &str =
    "+g.3gpp.app_ref=\"urn%3Aurn-7%3A3gpp-application.ims.iari.gsma-is\"";
pub const FEATURE_TAG_VIDEO_SHARE: &str = "+g.3gpp.cs-voice";
pub const FEATURE_TAG_AUTOMATA: &str = "automata";

/// Supported service set for one contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub im_session: bool,
    pub file_transfer_http: bool,
    pub image_sharing: bool,
    pub video_sharing: bool,
    /// Remote endpoint declared itself an automaton (RFC 3840)
    pub sip_automata: bool,
}

impl Capabilities {
    /// Capabilities advertised by this client, per configuration
    pub fn local(image_sharing: bool, video_sharing: bool) -> Self {
        Self {
            im_session: true,
            file_transfer_http: true,
            image_sharing,
            video_sharing,
            sip_automata: false,
        }
    }

    /// Feature tags to advertise for this capability set
    pub fn to_feature_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if self.im_session {
            tags.push(FEATURE_TAG_IM_SESSION.to_string());
        }
        if self.file_transfer_http {
            tags.push(FEATURE_TAG_FT_HTTP.to_string());
        }
        if self.image_sharing {
            tags.push(FEATURE_TAG_IMAGE_SHARE.to_string());
        }
        if self.video_sharing {
            tags.push(FEATURE_TAG_VIDEO_SHARE.to_string());
        }
        if self.sip_automata {
            tags.push(FEATURE_TAG_AUTOMATA.to_string());
        }
        tags
    }

    /// Extract a capability set from received feature tags
    pub fn from_feature_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut caps = Self::default();
        for tag in tags {
            let tag = tag.as_ref();
            if tag.contains(FEATURE_TAG_IM_SESSION) {
                caps.im_session = true;
            }
            if tag.contains("rcs.fthttp") {
                caps.file_transfer_http = true;
            }
            if tag.contains("gsma-is") {
                caps.image_sharing = true;
            }
            if tag.contains(FEATURE_TAG_VIDEO_SHARE) {
                caps.video_sharing = true;
            }
            if tag == FEATURE_TAG_AUTOMATA || tag.contains("+automata") {
                caps.sip_automata = true;
            }
        }
        caps
    }
}

/// RCS status of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RcsStatus {
    /// Contact never probed, or probe never answered
    NoInfo,
    /// Contact probed and found not to be an RCS user
    NotRcs,
    /// Contact supports RCS services
    RcsCapable,
}

/// IMS registration state of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unknown,
    Online,
    Offline,
}

/// Cached capability record for one contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact: ContactId,
    pub capabilities: Capabilities,
    pub rcs_status: RcsStatus,
    pub registration_state: RegistrationState,
    pub time_last_request: Option<DateTime<Utc>>,
    pub time_last_response: Option<DateTime<Utc>>,
}

impl ContactInfo {
    /// Record for a contact we know nothing about yet
    pub fn no_info(contact: ContactId) -> Self {
        Self {
            contact,
            capabilities: Capabilities::default(),
            rcs_status: RcsStatus::NoInfo,
            registration_state: RegistrationState::Unknown,
            time_last_request: None,
            time_last_response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_tag_round_trip() {
        let caps = Capabilities::local(true, true);
        let tags = caps.to_feature_tags();
        assert!(tags.iter().any(|t| t == FEATURE_TAG_IM_SESSION));
        assert!(tags.iter().any(|t| t == FEATURE_TAG_VIDEO_SHARE));

        let parsed = Capabilities::from_feature_tags(&tags);
        assert_eq!(parsed, caps);
    }

    #[test]
    fn test_automata_tag_detected() {
        let caps =
            Capabilities::from_feature_tags(&[FEATURE_TAG_IM_SESSION, FEATURE_TAG_AUTOMATA]);
        assert!(caps.im_session);
        assert!(caps.sip_automata);
    }

    #[test]
    fn test_empty_tags_mean_no_capabilities() {
        let caps = Capabilities::from_feature_tags::<&str>(&[]);
        assert_eq!(caps, Capabilities::default());
    }

    #[test]
    fn test_no_info_record() {
        let contact = ContactId::parse("+33612345678").unwrap();
        let info = ContactInfo::no_info(contact.clone());
        assert_eq!(info.rcs_status, RcsStatus::NoInfo);
        assert_eq!(info.registration_state, RegistrationState::Unknown);
        assert_eq!(info.contact, contact);
        assert!(info.time_last_request.is_none());
    }
}
