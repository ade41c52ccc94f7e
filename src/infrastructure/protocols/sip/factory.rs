//! SIP message factory
//!
//! Builds requests bound to a dialog path's current call-id and CSeq, and
//! responses to received requests. Sessions never assemble headers by hand.

use rsip::{Header, Headers, Method, Request, Uri, Version};

use super::dialog::{generate_branch, DialogPath};
use super::message::{ResponseBuilder, SipError, SipRequest, SipResponse};

fn contact_value(local_party: &str, feature_tags: &[String]) -> String {
    let mut value = format!("<{}>", local_party);
    for tag in feature_tags {
        value.push(';');
        value.push_str(tag);
    }
    value
}

fn base_request(
    dialog: &DialogPath,
    method: Method,
    cseq_method: &str,
    cseq: u32,
) -> Result<Request, SipError> {
    dialog.check_open()?;

    let uri = Uri::try_from(dialog.target())
        .map_err(|e| SipError::InvalidMessage(format!("Bad target URI: {}", e)))?;

    let mut headers = Headers::default();
    headers.push(Header::Via(
        format!("SIP/2.0/UDP 0.0.0.0:5060;branch={}", generate_branch()).into(),
    ));
    headers.push(Header::MaxForwards("70".into()));
    headers.push(Header::From(
        format!("<{}>;tag={}", dialog.local_party(), dialog.local_tag()).into(),
    ));
    headers.push(Header::To(format!("<{}>", dialog.remote_party()).into()));
    headers.push(Header::CallId(dialog.call_id().into()));
    headers.push(Header::CSeq(format!("{} {}", cseq, cseq_method).into()));

    Ok(Request {
        method,
        uri,
        version: Version::V2,
        headers,
        body: Vec::new(),
    })
}

fn set_body(request: &mut Request, content_type: &str, body: String) {
    request
        .headers
        .push(Header::ContentType(content_type.into()));
    request
        .headers
        .push(Header::ContentLength(body.len().to_string().into()));
    request.body = body.into_bytes();
}

/// OPTIONS request carrying the local feature tags
pub fn create_options(
    dialog: &DialogPath,
    feature_tags: &[String],
) -> Result<SipRequest, SipError> {
    let mut request = base_request(dialog, Method::Options, "OPTIONS", dialog.cseq())?;
    request.headers.push(Header::Contact(
        contact_value(dialog.local_party(), feature_tags).into(),
    ));
    request.headers.push(Header::Accept("application/sdp".into()));
    request
        .headers
        .push(Header::ContentLength("0".into()));
    Ok(SipRequest::new(request))
}

/// INVITE request carrying the local SDP offer
pub fn create_invite(
    dialog: &DialogPath,
    feature_tags: &[String],
    sdp: &str,
) -> Result<SipRequest, SipError> {
    let mut request = base_request(dialog, Method::Invite, "INVITE", dialog.cseq())?;
    request.headers.push(Header::Contact(
        contact_value(dialog.local_party(), feature_tags).into(),
    ));
    set_body(&mut request, "application/sdp", sdp.to_string());
    Ok(SipRequest::new(request))
}

/// ACK confirming a final INVITE response
pub fn create_ack(dialog: &DialogPath) -> Result<SipRequest, SipError> {
    let mut request = base_request(dialog, Method::Ack, "ACK", dialog.cseq())?;
    request
        .headers
        .push(Header::ContentLength("0".into()));
    Ok(SipRequest::new(request))
}

/// BYE closing an established dialog; advances the dialog CSeq
pub fn create_bye(dialog: &mut DialogPath) -> Result<SipRequest, SipError> {
    dialog.check_open()?;
    dialog.increment_cseq();
    let mut request = base_request(dialog, Method::Bye, "BYE", dialog.cseq())?;
    request
        .headers
        .push(Header::ContentLength("0".into()));
    Ok(SipRequest::new(request))
}

/// CANCEL for a pending INVITE
pub fn create_cancel(dialog: &DialogPath) -> Result<SipRequest, SipError> {
    let mut request = base_request(dialog, Method::Cancel, "CANCEL", dialog.cseq())?;
    request
        .headers
        .push(Header::ContentLength("0".into()));
    Ok(SipRequest::new(request))
}

/// 180 Ringing for a received INVITE
pub fn create_180_ringing(invite: &SipRequest, local_tag: &str) -> Result<SipResponse, SipError> {
    ResponseBuilder::new(180)
        .to_tag(local_tag)
        .build_for_request(invite)
}

/// 486 Busy Here for a received INVITE
pub fn create_486_busy(invite: &SipRequest, local_tag: &str) -> Result<SipResponse, SipError> {
    ResponseBuilder::new(486)
        .to_tag(local_tag)
        .build_for_request(invite)
}

/// 603 Decline for a received INVITE
pub fn create_603_decline(invite: &SipRequest, local_tag: &str) -> Result<SipResponse, SipError> {
    ResponseBuilder::new(603)
        .to_tag(local_tag)
        .build_for_request(invite)
}

/// 415 Unsupported Media Type for a received INVITE
pub fn create_415_unsupported(invite: &SipRequest) -> Result<SipResponse, SipError> {
    ResponseBuilder::new(415).build_for_request(invite)
}

/// 200 OK answering an INVITE, carrying the negotiated SDP
pub fn create_200_ok_invite(
    dialog: &DialogPath,
    feature_tags: &[String],
    sdp: &str,
) -> Result<SipResponse, SipError> {
    let invite = dialog
        .invite()
        .ok_or_else(|| SipError::InvalidMessage("No INVITE on dialog path".to_string()))?;
    ResponseBuilder::ok()
        .to_tag(dialog.local_tag())
        .header(Header::Contact(
            contact_value(dialog.local_party(), feature_tags).into(),
        ))
        .header(Header::ContentType("application/sdp".into()))
        .body(sdp.as_bytes().to_vec())
        .build_for_request(invite)
}

/// 200 OK answering an OPTIONS probe, carrying feature tags and SDP
pub fn create_200_ok_options(
    options: &SipRequest,
    local_contact: &str,
    feature_tags: &[String],
    sdp: &str,
) -> Result<SipResponse, SipError> {
    ResponseBuilder::ok()
        .header(Header::Contact(
            contact_value(local_contact, feature_tags).into(),
        ))
        .header(Header::ContentType("application/sdp".into()))
        .body(sdp.as_bytes().to_vec())
        .build_for_request(options)
}
