//! ZCL node - hosts local endpoints and runs attribute reporting

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zcl_core::{Clock, OutboundFrame, ReportingEngine, ReportingScheduler};

mod config;
mod node;

/// Outbound frames buffered between the core and the stack
const FRAME_QUEUE_DEPTH: usize = 256;

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stand-in for the radio stack: number and log every outbound frame
async fn log_frames(mut rx: mpsc::Receiver<OutboundFrame>) {
    let mut seq: u8 = 0;
    while let Some(frame) = rx.recv().await {
        let zcl = frame.to_zcl_frame(seq);
        seq = seq.wrapping_add(1);
        tracing::info!(
            "TX {:?} ep {} -> {}/{} cluster {:#06x}: {}",
            frame.kind,
            frame.src_endpoint,
            frame.dst,
            frame.dst_endpoint,
            frame.cluster_id,
            hex(&zcl.serialize())
        );
    }
    tracing::debug!("Frame queue closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zcl_core=debug,zcl_node=info".into()),
        )
        .init();

    tracing::info!("Starting ZCL node");

    let settings = config::Settings::from_env();
    let node_config = config::load_config(&settings.config_path).await;

    let clock = Clock::new();
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let frames = tokio::spawn(log_frames(frame_rx));

    let registry = node::build_registry(&node_config, Arc::new(frame_tx), clock.now())?;
    for ep_id in registry.endpoint_ids() {
        registry.with_endpoint(ep_id, |ep| {
            let desc = ep.simple_descriptor();
            tracing::info!(
                "Endpoint {}: device {:#06x}, in {:04x?}, out {:04x?}",
                desc.endpoint,
                desc.device_id,
                desc.in_clusters,
                desc.out_clusters
            );
        })?;
    }

    let engine = Arc::new(ReportingEngine::new(registry.clone()));
    let scheduler = ReportingScheduler::start(engine, clock, settings.tick);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    drop(scheduler);
    for ep_id in registry.endpoint_ids() {
        registry.remove_endpoint(ep_id)?;
    }
    // The registry holds the last sender; dropping it lets the logger drain
    drop(registry);
    frames.await?;

    Ok(())
}
