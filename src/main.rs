use std::sync::Arc;

use chitchat::application::{CapabilityListener, CapabilityService, FileTransferService, RichcallService};
use chitchat::config::Config;
use chitchat::domain::capability::Capabilities;
use chitchat::domain::shared::value_objects::ContactId;
use chitchat::infrastructure::persistence::{InMemoryContactRepository, InMemoryMessagingLog};
use chitchat::infrastructure::protocols::sip::ScriptedSipTransport;
use tracing::{info, Level};

struct LogCapabilityListener;

impl CapabilityListener for LogCapabilityListener {
    fn on_capabilities_received(&self, contact: &ContactId, capabilities: &Capabilities) {
        info!("Capabilities received for {}: {:?}", contact, capabilities);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting chitchat RCS engine");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    info!("Configuration loaded for domain {}", config.ims.domain);

    // Wire the engine with in-memory collaborators; a deployment plugs a
    // real SIP stack and SQL-backed stores behind the same traits
    let transport = Arc::new(ScriptedSipTransport::new());
    let contacts = Arc::new(InMemoryContactRepository::new());
    let log = Arc::new(InMemoryMessagingLog::new());

    let capability = CapabilityService::new(
        &config,
        transport.clone(),
        transport.clone(),
        contacts.clone(),
        Arc::new(LogCapabilityListener),
    );
    capability.start();

    let richcall = RichcallService::new(&config, transport.clone());
    let file_transfer = FileTransferService::new(&config, transport.clone(), log.clone());

    info!(
        "Engine ready: {} sharing sessions, {} transfer sessions active",
        richcall.registry().len().await,
        file_transfer.registry().len().await
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    capability.stop();

    Ok(())
}
