//! Configuration management

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ims: ImsConfig,
    pub capability: CapabilityConfig,
    pub file_transfer: FileTransferConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImsConfig {
    /// Public user identity advertised in outgoing requests
    pub public_uri: String,
    /// Home domain
    pub domain: String,
    /// Private identity for digest authentication
    pub private_id: String,
    pub password: String,
    /// Outbound proxy address
    pub proxy_addr: String,
    /// Timeout applied to ringing periods, in seconds
    pub ringing_period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Maximum number of concurrent OPTIONS probes
    pub max_probe_workers: usize,
    /// Local support for image sharing
    pub image_sharing: bool,
    /// Local support for video sharing
    pub video_sharing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferConfig {
    /// Size above which a transfer is never auto-accepted, 0 to disable
    pub warn_size: u64,
    /// Maximum accepted file size, 0 for unlimited
    pub max_size: u64,
    pub auto_accept: bool,
    pub auto_accept_in_roaming: bool,
    /// Maximum number of simultaneous transfer sessions
    pub max_sessions: usize,
    /// Maximum number of simultaneous outgoing transfers
    pub max_concurrent_outgoing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Content server used for uploads
    pub server_addr: String,
    pub connect_timeout_secs: u64,
    /// Upload slice size in bytes
    pub upload_slice_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ims: ImsConfig {
                public_uri: "sip:user@operator.com".to_string(),
                domain: "operator.com".to_string(),
                private_id: "user@operator.com".to_string(),
                password: String::new(),
                proxy_addr: "sip.operator.com:5060".to_string(),
                ringing_period: 60,
            },
            capability: CapabilityConfig {
                max_probe_workers: 15,
                image_sharing: true,
                video_sharing: true,
            },
            file_transfer: FileTransferConfig {
                warn_size: 0,
                max_size: 0,
                auto_accept: true,
                auto_accept_in_roaming: false,
                max_sessions: 10,
                max_concurrent_outgoing: 5,
            },
            http: HttpConfig {
                server_addr: "https://ft.operator.com/content".to_string(),
                connect_timeout_secs: 30,
                upload_slice_size: 64 * 1024,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capability.max_probe_workers, 15);
        assert!(config.file_transfer.auto_accept);
        assert!(!config.file_transfer.auto_accept_in_roaming);
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.ims.domain, config.ims.domain);
        assert_eq!(parsed.file_transfer.max_sessions, config.file_transfer.max_sessions);
    }
}
