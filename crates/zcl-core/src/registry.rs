//! Endpoint registry: the node's endpoints and the command ingress

use crate::attribute::Attribute;
use crate::cluster::ClusterRole;
use crate::endpoint::{DeviceHandler, Endpoint, IdentifyHandler, Notification};
use crate::error::{Missing, ZclError};
use crate::reporting::ReportingInfo;
use crate::stack::{FrameSink, InboundCommand};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use zcl_types::{AttrValue, ZclStatus};

/// Registry events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    EndpointAdded(u8),
    EndpointRemoved {
        endpoint: u8,
        cancelled_reports: usize,
    },
    ClusterAdded {
        endpoint: u8,
        cluster_id: u16,
        role: ClusterRole,
    },
    ClusterRemoved {
        endpoint: u8,
        cluster_id: u16,
        role: ClusterRole,
        cancelled_reports: usize,
    },
}

/// Attribute operation routed by [`EndpointRegistry::dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum AttrOp {
    Read,
    /// Remote write, subject to the WRITE bit
    Write(AttrValue),
    /// Local write from the application
    Set(AttrValue),
}

/// All local endpoints of the node.
///
/// Each endpoint sits behind its own lock, so operations on distinct
/// endpoints never wait on each other. Callbacks and outbound frames are
/// delivered after the endpoint lock is released.
pub struct EndpointRegistry {
    endpoints: DashMap<u8, Arc<Mutex<Endpoint>>>,
    sink: Arc<dyn FrameSink>,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.endpoint_ids())
            .finish_non_exhaustive()
    }
}

impl EndpointRegistry {
    #[must_use]
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            endpoints: DashMap::new(),
            sink,
            event_tx,
        }
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn FrameSink> {
        &self.sink
    }

    /// Subscribe to registry events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Register an empty endpoint
    pub fn add_endpoint(&self, ep_id: u8, profile_id: u16) -> Result<(), ZclError> {
        self.insert_endpoint(Endpoint::new(ep_id, profile_id)?)
    }

    /// Register a prebuilt endpoint and run its pending cluster init hooks
    pub fn insert_endpoint(&self, mut endpoint: Endpoint) -> Result<(), ZclError> {
        let ep_id = endpoint.id();
        match self.endpoints.entry(ep_id) {
            Entry::Occupied(_) => return Err(ZclError::DuplicateEndpoint(ep_id)),
            Entry::Vacant(slot) => {
                endpoint.initialize_clusters();
                tracing::info!(
                    "Registered endpoint {} (profile {:#06x}, device {:#06x}, {} clusters)",
                    ep_id,
                    endpoint.profile_id(),
                    endpoint.device_id(),
                    endpoint.clusters().len()
                );
                slot.insert(Arc::new(Mutex::new(endpoint)));
            }
        }
        self.publish(RegistryEvent::EndpointAdded(ep_id));
        Ok(())
    }

    /// Unregister an endpoint and cancel its reporting entries.
    /// Frames already handed to the stack are not recalled.
    pub fn remove_endpoint(&self, ep_id: u8) -> Result<usize, ZclError> {
        let (_, endpoint) = self
            .endpoints
            .remove(&ep_id)
            .ok_or(ZclError::NotFound(Missing::Endpoint(ep_id)))?;
        let cancelled_reports = endpoint.lock().cancel_reporting();
        tracing::info!(
            "Removed endpoint {}, cancelled {} reporting entries",
            ep_id,
            cancelled_reports
        );
        self.publish(RegistryEvent::EndpointRemoved {
            endpoint: ep_id,
            cancelled_reports,
        });
        Ok(cancelled_reports)
    }

    /// Registered endpoint ids in ascending order
    #[must_use]
    pub fn endpoint_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.endpoints.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn contains(&self, ep_id: u8) -> bool {
        self.endpoints.contains_key(&ep_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn handle(&self, ep_id: u8) -> Result<Arc<Mutex<Endpoint>>, ZclError> {
        self.endpoints
            .get(&ep_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(ZclError::NotFound(Missing::Endpoint(ep_id)))
    }

    /// Run `f` with the endpoint locked
    pub fn with_endpoint<R>(
        &self,
        ep_id: u8,
        f: impl FnOnce(&Endpoint) -> R,
    ) -> Result<R, ZclError> {
        let endpoint = self.handle(ep_id)?;
        let guard = endpoint.lock();
        Ok(f(&guard))
    }

    /// Run `f` with the endpoint locked for mutation, then deliver any
    /// callbacks it queued
    pub fn with_endpoint_mut<R>(
        &self,
        ep_id: u8,
        f: impl FnOnce(&mut Endpoint) -> R,
    ) -> Result<R, ZclError> {
        let endpoint = self.handle(ep_id)?;
        let (result, notifications, device, identify) = {
            let mut guard = endpoint.lock();
            let result = f(&mut guard);
            (
                result,
                guard.take_notifications(),
                guard.device_handler(),
                guard.identify_handler(),
            )
        };

        for notification in notifications {
            match notification {
                Notification::Identify(param) => {
                    if let Some(handler) = &identify {
                        handler.identify(param);
                    }
                }
                Notification::Device(event) => {
                    if let Some(handler) = &device {
                        handler.handle(&event);
                    }
                }
            }
        }
        Ok(result)
    }

    pub fn add_cluster(
        &self,
        ep_id: u8,
        cluster_id: u16,
        role: ClusterRole,
        attrs: Vec<Attribute>,
        manuf_code: Option<u16>,
    ) -> Result<(), ZclError> {
        self.with_endpoint_mut(ep_id, |ep| {
            ep.add_cluster(cluster_id, role, attrs, manuf_code)?;
            ep.initialize_clusters();
            Ok::<_, ZclError>(())
        })??;
        self.publish(RegistryEvent::ClusterAdded {
            endpoint: ep_id,
            cluster_id,
            role,
        });
        Ok(())
    }

    pub fn remove_cluster(
        &self,
        ep_id: u8,
        cluster_id: u16,
        role: ClusterRole,
    ) -> Result<usize, ZclError> {
        let cancelled_reports =
            self.with_endpoint_mut(ep_id, |ep| ep.remove_cluster(cluster_id, role))??;
        self.publish(RegistryEvent::ClusterRemoved {
            endpoint: ep_id,
            cluster_id,
            role,
            cancelled_reports,
        });
        Ok(cancelled_reports)
    }

    pub fn set_device_handler(
        &self,
        ep_id: u8,
        handler: Arc<dyn DeviceHandler>,
    ) -> Result<(), ZclError> {
        self.with_endpoint_mut(ep_id, |ep| ep.set_device_handler(handler))
    }

    pub fn set_identify_handler(
        &self,
        ep_id: u8,
        handler: Arc<dyn IdentifyHandler>,
    ) -> Result<(), ZclError> {
        self.with_endpoint_mut(ep_id, |ep| ep.set_identify_handler(handler))
    }

    /// Create or update a reporting entry on the entry's endpoint
    pub fn configure_reporting(&self, info: ReportingInfo) -> Result<(), ZclError> {
        self.with_endpoint_mut(info.endpoint, |ep| ep.configure_reporting(info))?
    }

    /// Route an attribute operation. Returns the value read, or the value
    /// stored by a write.
    pub fn dispatch(
        &self,
        ep_id: u8,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
        op: AttrOp,
        now: u32,
    ) -> Result<AttrValue, ZclError> {
        self.with_endpoint_mut(ep_id, |ep| match op {
            AttrOp::Read => ep.read_attribute(cluster_id, role, attr_id).cloned(),
            AttrOp::Write(value) => {
                ep.write_attribute(cluster_id, role, attr_id, value.clone(), now)?;
                Ok(value)
            }
            AttrOp::Set(value) => {
                ep.set_attribute(cluster_id, role, attr_id, value.clone(), now)?;
                Ok(value)
            }
        })?
    }

    /// Sole ingress for commands from the stack.
    ///
    /// Failures never propagate; they become the status of the response
    /// frame, which is also returned.
    pub fn deliver_command(&self, cmd: InboundCommand, now: u32) -> ZclStatus {
        tracing::debug!(
            "Command {:?} from {} to ep {} cluster {:#06x} attr {:#06x}",
            cmd.opcode,
            cmd.src,
            cmd.endpoint,
            cmd.cluster_id,
            cmd.attr_id
        );

        match self.with_endpoint_mut(cmd.endpoint, |ep| ep.handle_command(&cmd, now)) {
            Ok(outcome) => {
                if let Some(frame) = outcome.response {
                    self.sink.emit_frame(frame);
                }
                outcome.status
            }
            Err(e) => {
                tracing::debug!("Dropping command for unknown endpoint: {}", e);
                e.status()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Access;
    use crate::cluster::{id, identify_attrs, on_off_attrs, Cluster, ClusterInit};
    use crate::endpoint::DeviceEvent;
    use crate::reporting::ReportDestination;
    use crate::stack::{FrameKind, Opcode};
    use crate::testing::RecordingSink;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::mpsc;
    use zcl_types::{profiles, Address};

    const LEVEL_ATTR: u16 = 0x0010;

    fn registry() -> (Arc<EndpointRegistry>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(EndpointRegistry::new(sink.clone()));
        for ep_id in [1, 2] {
            registry
                .add_endpoint(ep_id, profiles::HOME_AUTOMATION)
                .unwrap();
            registry
                .add_cluster(
                    ep_id,
                    id::ON_OFF,
                    ClusterRole::Server,
                    vec![
                        Attribute::new(
                            on_off_attrs::ON_OFF,
                            Access::READ_REPORTING,
                            AttrValue::Bool(false),
                        ),
                        Attribute::new(LEVEL_ATTR, Access::READ_WRITE, AttrValue::U16(0)),
                    ],
                    None,
                )
                .unwrap();
        }
        (registry, sink)
    }

    #[test]
    fn test_endpoint_out_of_range_not_registered() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.add_endpoint(241, profiles::HOME_AUTOMATION),
            Err(ZclError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.add_endpoint(0, profiles::HOME_AUTOMATION),
            Err(ZclError::InvalidArgument(_))
        ));
        assert_eq!(registry.endpoint_ids(), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_endpoint() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.add_endpoint(1, profiles::HOME_AUTOMATION),
            Err(ZclError::DuplicateEndpoint(1))
        ));
        // The first endpoint keeps its clusters
        let clusters = registry.with_endpoint(1, |ep| ep.clusters().len()).unwrap();
        assert_eq!(clusters, 1);
    }

    #[test]
    fn test_dispatch_round_trip_and_missing() {
        let (registry, _) = registry();
        registry
            .dispatch(
                1,
                id::ON_OFF,
                ClusterRole::Server,
                LEVEL_ATTR,
                AttrOp::Write(AttrValue::U16(42)),
                0,
            )
            .unwrap();
        let value = registry
            .dispatch(1, id::ON_OFF, ClusterRole::Server, LEVEL_ATTR, AttrOp::Read, 0)
            .unwrap();
        assert_eq!(value, AttrValue::U16(42));

        assert!(matches!(
            registry.dispatch(9, id::ON_OFF, ClusterRole::Server, LEVEL_ATTR, AttrOp::Read, 0),
            Err(ZclError::NotFound(Missing::Endpoint(9)))
        ));
        assert!(matches!(
            registry.dispatch(1, id::LEVEL_CONTROL, ClusterRole::Server, 0, AttrOp::Read, 0),
            Err(ZclError::NotFound(Missing::Cluster { .. }))
        ));
        assert!(matches!(
            registry.dispatch(1, id::ON_OFF, ClusterRole::Client, LEVEL_ATTR, AttrOp::Read, 0),
            Err(ZclError::NotFound(Missing::Cluster { .. }))
        ));
    }

    #[test]
    fn test_deliver_command_emits_response() {
        let (registry, sink) = registry();
        let cmd = InboundCommand::new(
            Address::Short(0x2222),
            1,
            id::ON_OFF,
            on_off_attrs::ON_OFF,
            Opcode::WriteAttributes,
            vec![0x10, 0x01],
        );
        assert_eq!(registry.deliver_command(cmd, 0), ZclStatus::ReadOnly);

        let frames = sink.take();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::WriteResponse(ZclStatus::ReadOnly));
        assert_eq!(frames[0].dst, Address::Short(0x2222));

        let cmd = InboundCommand::new(
            Address::Short(0x2222),
            77,
            id::ON_OFF,
            on_off_attrs::ON_OFF,
            Opcode::ReadAttributes,
            vec![],
        );
        assert_eq!(
            registry.deliver_command(cmd, 0),
            ZclStatus::UnsupportedCluster
        );
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_handlers_run_after_unlock() {
        let (registry, _) = registry();
        registry
            .add_cluster(
                1,
                id::IDENTIFY,
                ClusterRole::Server,
                vec![Attribute::new(
                    identify_attrs::IDENTIFY_TIME,
                    Access::READ_WRITE,
                    AttrValue::U16(0),
                )],
                None,
            )
            .unwrap();

        // The identify handler reads back through the registry; this would
        // deadlock if it ran under the endpoint lock.
        let seen = Arc::new(AtomicU16::new(u16::MAX));
        let weak = Arc::downgrade(&registry);
        let observed = seen.clone();
        registry
            .set_identify_handler(
                1,
                Arc::new(move |_param: u16| {
                    if let Some(registry) = weak.upgrade() {
                        let value = registry
                            .dispatch(
                                1,
                                id::IDENTIFY,
                                ClusterRole::Server,
                                identify_attrs::IDENTIFY_TIME,
                                AttrOp::Read,
                                0,
                            )
                            .unwrap();
                        if let AttrValue::U16(t) = value {
                            observed.store(t, Ordering::SeqCst);
                        }
                    }
                }),
            )
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        registry
            .set_device_handler(
                1,
                Arc::new(move |event: &DeviceEvent| recorded.lock().push(event.clone())),
            )
            .unwrap();

        let cmd = InboundCommand::new(
            Address::Short(0x2222),
            1,
            id::IDENTIFY,
            0,
            Opcode::ClusterSpecific(identify_attrs::CMD_IDENTIFY),
            vec![0x05, 0x00],
        );
        assert_eq!(registry.deliver_command(cmd, 0), ZclStatus::Success);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert!(matches!(
            events.lock().as_slice(),
            [DeviceEvent::Command {
                cluster_id: id::IDENTIFY,
                command_id: 0x00,
                ..
            }]
        ));
    }

    #[test]
    fn test_missing_handlers_are_skipped() {
        let (registry, sink) = registry();
        let cmd = InboundCommand::new(
            Address::Short(0x2222),
            2,
            id::ON_OFF,
            0,
            Opcode::ClusterSpecific(0x01),
            vec![],
        );
        assert_eq!(registry.deliver_command(cmd, 0), ZclStatus::Success);
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn test_remove_endpoint_cancels_reporting() {
        let (registry, _) = registry();
        let mut events = registry.subscribe();
        registry
            .configure_reporting(ReportingInfo::send(
                2,
                id::ON_OFF,
                on_off_attrs::ON_OFF,
                0,
                60,
                None,
                ReportDestination::new(0x0000, 1),
                0,
            ))
            .unwrap();

        assert_eq!(registry.remove_endpoint(2).unwrap(), 1);
        assert!(!registry.contains(2));
        assert_eq!(
            events.try_recv().unwrap(),
            RegistryEvent::EndpointRemoved {
                endpoint: 2,
                cancelled_reports: 1
            }
        );
        assert!(matches!(
            registry.remove_endpoint(2),
            Err(ZclError::NotFound(Missing::Endpoint(2)))
        ));
    }

    #[test]
    fn test_distinct_endpoints_do_not_block() {
        let (registry, _) = registry();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                registry
                    .with_endpoint(1, |_| {
                        locked_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };

        locked_rx.recv().unwrap();
        // Endpoint 1 is held; endpoint 2 must still make progress
        registry
            .dispatch(
                2,
                id::ON_OFF,
                ClusterRole::Server,
                LEVEL_ATTR,
                AttrOp::Write(AttrValue::U16(7)),
                0,
            )
            .unwrap();
        release_tx.send(()).unwrap();
        holder.join().unwrap();

        let value = registry
            .dispatch(2, id::ON_OFF, ClusterRole::Server, LEVEL_ATTR, AttrOp::Read, 0)
            .unwrap();
        assert_eq!(value, AttrValue::U16(7));
    }

    #[test]
    fn test_same_endpoint_writers_serialized() {
        let (registry, _) = registry();
        let writers: Vec<_> = (1..=8u16)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry
                            .dispatch(
                                1,
                                id::ON_OFF,
                                ClusterRole::Server,
                                LEVEL_ATTR,
                                AttrOp::Write(AttrValue::U16(n)),
                                0,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let value = registry
            .dispatch(1, id::ON_OFF, ClusterRole::Server, LEVEL_ATTR, AttrOp::Read, 0)
            .unwrap();
        let AttrValue::U16(n) = value else {
            panic!("unexpected value {value:?}");
        };
        assert!((1..=8).contains(&n));
    }

    #[test]
    fn test_registration_runs_init_hooks() {
        let (registry, _) = registry();
        let calls = Arc::new(AtomicU16::new(0));
        let counter = calls.clone();
        let hook: Arc<dyn ClusterInit> = Arc::new(move |cluster_id: u16| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(cluster_id, id::IDENTIFY);
        });

        let mut endpoint = Endpoint::new(3, profiles::HOME_AUTOMATION).unwrap();
        endpoint
            .insert_cluster(Cluster::new(id::IDENTIFY, ClusterRole::Server).with_init(hook))
            .unwrap();
        registry.insert_endpoint(endpoint).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry
            .add_cluster(3, id::ON_OFF, ClusterRole::Server, Vec::new(), None)
            .unwrap();
        let initialized = registry
            .with_endpoint(3, |ep| ep.clusters().iter().all(Cluster::is_initialized))
            .unwrap();
        assert!(initialized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_lists_endpoints() {
        let (registry, _) = registry();
        assert!(format!("{registry:?}").contains("endpoints: [1, 2]"));
    }
}
