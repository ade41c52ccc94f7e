//! SIP Digest Authentication (RFC 2617, RFC 3261)
//!
//! Client side of the proxy authentication cycle: reads the challenge from a
//! 407 response and signs the retried request.

use rand::Rng;
use rsip::Header;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::message::{SipError, SipRequest, SipResponse};

/// Credentials used to answer proxy challenges
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Parsed Proxy-Authenticate challenge
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parse a Proxy-Authenticate header value
    pub fn parse(value: &str) -> Result<Self, SipError> {
        let params = parse_digest_params(value);
        let realm = params
            .get("realm")
            .ok_or_else(|| SipError::Authentication("Missing realm in challenge".to_string()))?
            .clone();
        let nonce = params
            .get("nonce")
            .ok_or_else(|| SipError::Authentication("Missing nonce in challenge".to_string()))?
            .clone();
        Ok(Self {
            realm,
            nonce,
            algorithm: params
                .get("algorithm")
                .cloned()
                .unwrap_or_else(|| "MD5".to_string()),
            qop: params.get("qop").cloned(),
            opaque: params.get("opaque").cloned(),
        })
    }
}

/// Parse Digest authentication parameters
fn parse_digest_params(auth_value: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let digest_str = auth_value
        .strip_prefix("Digest ")
        .unwrap_or(auth_value)
        .trim();

    // Simple parser for key="value" pairs
    for part in digest_str.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            params.insert(key.to_string(), value.to_string());
        }
    }

    params
}

/// Handles the 407 challenge/response retry for one session attempt
pub struct SessionAuthenticationAgent {
    credentials: UserCredentials,
    challenge: Option<DigestChallenge>,
    cnonce: String,
    nonce_count: u32,
}

impl SessionAuthenticationAgent {
    pub fn new(credentials: UserCredentials) -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
        Self {
            credentials,
            challenge: None,
            cnonce: hex::encode(random_bytes),
            nonce_count: 0,
        }
    }

    /// Extract the digest challenge from a 407 response
    ///
    /// A malformed or missing challenge is a protocol error; the caller
    /// abandons the attempt instead of retrying blindly.
    pub fn read_proxy_authenticate(&mut self, response: &SipResponse) -> Result<(), SipError> {
        let value = response
            .header_value("Proxy-Authenticate")
            .ok_or_else(|| {
                warn!("407 response without Proxy-Authenticate header");
                SipError::Authentication("No Proxy-Authenticate header".to_string())
            })?;
        let challenge = DigestChallenge::parse(&value)?;
        debug!("Read proxy challenge, realm={}", challenge.realm);
        self.challenge = Some(challenge);
        Ok(())
    }

    /// Insert the Proxy-Authorization header on a retried request
    pub fn set_proxy_authorization(
        &mut self,
        request: &mut SipRequest,
        method: &str,
        uri: &str,
    ) -> Result<(), SipError> {
        let challenge = self.challenge.as_ref().ok_or_else(|| {
            SipError::Authentication("No challenge read before signing".to_string())
        })?;

        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let response_hash = calculate_response(
            &self.credentials.username,
            &self.credentials.password,
            &challenge.realm,
            &challenge.nonce,
            method,
            uri,
            challenge.qop.as_deref(),
            Some(&nc),
            Some(&self.cnonce),
        );

        let mut value = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm={}"#,
            self.credentials.username,
            challenge.realm,
            challenge.nonce,
            uri,
            response_hash,
            challenge.algorithm,
        );
        if let Some(qop) = &challenge.qop {
            value.push_str(&format!(r#", qop={}, nc={}, cnonce="{}""#, qop, nc, self.cnonce));
        }
        if let Some(opaque) = &challenge.opaque {
            value.push_str(&format!(r#", opaque="{}""#, opaque));
        }

        request
            .headers_mut()
            .push(Header::ProxyAuthorization(value.into()));
        Ok(())
    }

    pub fn has_challenge(&self) -> bool {
        self.challenge.is_some()
    }
}

/// Calculate digest response
fn calculate_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
    qop: Option<&str>,
    nc: Option<&str>,
    cnonce: Option<&str>,
) -> String {
    // HA1 = MD5(username:realm:password)
    let ha1 = {
        let digest = md5::compute(format!("{}:{}:{}", username, realm, password));
        format!("{:x}", digest)
    };

    // HA2 = MD5(method:uri)
    let ha2 = {
        let digest = md5::compute(format!("{}:{}", method, uri));
        format!("{:x}", digest)
    };

    // Response = MD5(HA1:nonce:HA2) or MD5(HA1:nonce:nc:cnonce:qop:HA2)
    if let Some(qop_value) = qop {
        let nc_value = nc.unwrap_or("00000001");
        let cnonce_value = cnonce.unwrap_or("");
        let digest = md5::compute(format!(
            "{}:{}:{}:{}:{}:{}",
            ha1, nonce, nc_value, cnonce_value, qop_value, ha2
        ));
        format!("{:x}", digest)
    } else {
        let digest = md5::compute(format!("{}:{}:{}", ha1, nonce, ha2));
        format!("{:x}", digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_response(challenge_value: &str) -> SipResponse {
        let raw = format!(
            "SIP/2.0 407 Proxy Authentication Required\r\n\
             Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKabc\r\n\
             From: <sip:a@x>;tag=1\r\n\
             To: <sip:b@x>;tag=2\r\n\
             Call-ID: cid-1\r\n\
             CSeq: 1 OPTIONS\r\n\
             Proxy-Authenticate: {}\r\n\
             Content-Length: 0\r\n\r\n",
            challenge_value
        );
        SipResponse::parse(raw.as_bytes()).unwrap()
    }

    fn credentials() -> UserCredentials {
        UserCredentials {
            username: "+33699887766@operator.com".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_parse_digest_params() {
        let params = parse_digest_params(
            r#"Digest realm="operator.com", nonce="abc123", qop="auth", algorithm=MD5"#,
        );
        assert_eq!(params.get("realm").unwrap(), "operator.com");
        assert_eq!(params.get("nonce").unwrap(), "abc123");
        assert_eq!(params.get("qop").unwrap(), "auth");
    }

    #[test]
    fn test_read_challenge_and_sign() {
        let mut agent = SessionAuthenticationAgent::new(credentials());
        let response =
            challenge_response(r#"Digest realm="operator.com", nonce="abc123", qop="auth""#);
        agent.read_proxy_authenticate(&response).unwrap();
        assert!(agent.has_challenge());

        let mut request = SipRequest::parse(
            b"OPTIONS sip:+33611223344@operator.com SIP/2.0\r\n\
              Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKdef\r\n\
              From: <sip:a@x>;tag=1\r\n\
              To: <sip:b@x>\r\n\
              Call-ID: cid-1\r\n\
              CSeq: 2 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        agent
            .set_proxy_authorization(&mut request, "OPTIONS", "sip:+33611223344@operator.com")
            .unwrap();

        let header = request.header_value("Proxy-Authorization").unwrap();
        assert!(header.contains(r#"realm="operator.com""#));
        assert!(header.contains("response="));
        assert!(header.contains("nc=00000001"));
    }

    #[test]
    fn test_malformed_challenge_is_protocol_error() {
        let mut agent = SessionAuthenticationAgent::new(credentials());
        let response = challenge_response(r#"Digest qop="auth""#);
        assert!(matches!(
            agent.read_proxy_authenticate(&response),
            Err(SipError::Authentication(_))
        ));
    }

    #[test]
    fn test_sign_without_challenge_fails() {
        let mut agent = SessionAuthenticationAgent::new(credentials());
        let mut request = SipRequest::parse(
            b"OPTIONS sip:b@x SIP/2.0\r\n\
              Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKdef\r\n\
              From: <sip:a@x>;tag=1\r\n\
              To: <sip:b@x>\r\n\
              Call-ID: cid-1\r\n\
              CSeq: 1 OPTIONS\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        assert!(agent
            .set_proxy_authorization(&mut request, "OPTIONS", "sip:b@x")
            .is_err());
    }

    #[test]
    fn test_calculate_response_format() {
        let response = calculate_response(
            "alice",
            "secret",
            "operator.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "OPTIONS",
            "sip:operator.com",
            None,
            None,
            None,
        );
        // Response should be a 32-character hex string
        assert_eq!(response.len(), 32);
        assert!(response.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
