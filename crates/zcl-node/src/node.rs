//! Builds the node's endpoints from its config

use crate::config::{EndpointConfig, NodeConfig, ReportingConfig};
use anyhow::Context;
use std::sync::Arc;
use zcl_core::{
    build_endpoint, ClusterRole, DeviceEvent, EndpointRegistry, FrameSink, ReportDestination,
    ReportingInfo,
};
use zcl_types::AttrValue;

/// Register every configured endpoint and its reporting entries
pub fn build_registry(
    config: &NodeConfig,
    sink: Arc<dyn FrameSink>,
    now: u32,
) -> anyhow::Result<Arc<EndpointRegistry>> {
    let registry = Arc::new(EndpointRegistry::new(sink));

    for ep_config in &config.endpoints {
        add_endpoint(&registry, ep_config, now)
            .with_context(|| format!("endpoint {}", ep_config.id))?;
    }

    Ok(registry)
}

fn add_endpoint(
    registry: &EndpointRegistry,
    ep_config: &EndpointConfig,
    now: u32,
) -> anyhow::Result<()> {
    let mut clusters = ep_config.clusters.clone();
    clusters.fill_defaults(ep_config.device_type);

    let endpoint = build_endpoint(ep_config.id, ep_config.device_type, &clusters)?;
    registry.insert_endpoint(endpoint)?;

    let ep_id = ep_config.id;
    registry.set_device_handler(
        ep_id,
        Arc::new(move |event: &DeviceEvent| match event.as_error() {
            Some(e) => tracing::warn!("Endpoint {}: {}", ep_id, e),
            None => tracing::info!("Endpoint {}: {:?}", ep_id, event),
        }),
    )?;
    registry.set_identify_handler(
        ep_id,
        Arc::new(move |seconds: u16| {
            if seconds > 0 {
                tracing::info!("Endpoint {} identifying for {}s", ep_id, seconds);
            } else {
                tracing::info!("Endpoint {} stopped identifying", ep_id);
            }
        }),
    )?;

    for reporting in &ep_config.reporting {
        let info = reporting_info(registry, ep_id, reporting, now).with_context(|| {
            format!(
                "reporting for cluster {:#06x} attr {:#06x}",
                reporting.cluster_id, reporting.attr_id
            )
        })?;
        registry.configure_reporting(info)?;
    }

    Ok(())
}

fn reporting_info(
    registry: &EndpointRegistry,
    ep_id: u8,
    reporting: &ReportingConfig,
    now: u32,
) -> anyhow::Result<ReportingInfo> {
    let delta = match reporting.delta {
        Some(delta) => {
            // The delta takes the attribute's own type
            let data_type = registry.with_endpoint(ep_id, |ep| {
                ep.clusters()
                    .find(reporting.cluster_id, ClusterRole::Server)
                    .ok()
                    .and_then(|c| c.attributes().get(reporting.attr_id))
                    .map(zcl_core::Attribute::data_type)
            })?;
            let data_type = data_type.context("attribute not found")?;
            Some(AttrValue::from_i64(data_type, delta)?)
        }
        None => None,
    };

    Ok(ReportingInfo::send(
        ep_id,
        reporting.cluster_id,
        reporting.attr_id,
        reporting.min_interval,
        reporting.max_interval,
        delta,
        ReportDestination::new(reporting.dst_short_addr, reporting.dst_endpoint),
        now,
    ))
}
