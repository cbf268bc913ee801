//! `hivecore serve`: Start the metrics gateway.

use hivecore_config::HubConfig;
use hivecore_telemetry::{ObservabilityHub, TimelineTracker, WebhookExporter};
use std::sync::Arc;

pub async fn run(
    mut config: HubConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let hub = ObservabilityHub::global();
    if config.webhook.enabled {
        let exporter = WebhookExporter::new(config.webhook.to_exporter_config())?;
        hub.set_webhook(Arc::new(exporter));
    }
    let tracker = Arc::new(TimelineTracker::new(hub.clone()));

    println!("🐝 HiveCore Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    if config.webhook.enabled {
        println!("   Pushing to: {}", config.webhook.api_url);
    }

    hivecore_gateway::start(&config, hub.clone(), tracker).await?;

    // Detaching drops the exporter, which shuts its workers down.
    hub.clear_webhook();
    Ok(())
}
