//! ZCL (Zigbee Cluster Library) clusters and the per-endpoint cluster table

use crate::arena::{Arena, Handle};
use crate::attribute::{Attribute, AttributeRegistry};
use crate::error::{Missing, ZclError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Common ZCL cluster IDs
pub mod id {
    // General Clusters
    pub const BASIC: u16 = 0x0000;
    pub const POWER_CONFIG: u16 = 0x0001;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const TIME: u16 = 0x000A;

    // Closures Clusters
    pub const SHADE_CONFIG: u16 = 0x0100;
    pub const DOOR_LOCK: u16 = 0x0101;

    // Lighting Clusters
    pub const COLOR_CONTROL: u16 = 0x0300;

    // Measurement Clusters
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
}

/// Basic cluster attributes
pub mod basic_attrs {
    pub const ZCL_VERSION: u16 = 0x0000;
    pub const POWER_SOURCE: u16 = 0x0007;
}

/// Identify cluster attributes and commands
pub mod identify_attrs {
    pub const IDENTIFY_TIME: u16 = 0x0000;

    /// Identify command (payload: identify time, u16 seconds)
    pub const CMD_IDENTIFY: u8 = 0x00;
}

/// Groups cluster attributes
pub mod groups_attrs {
    pub const NAME_SUPPORT: u16 = 0x0000;
}

/// Scenes cluster attributes
pub mod scenes_attrs {
    pub const SCENE_COUNT: u16 = 0x0000;
    pub const CURRENT_SCENE: u16 = 0x0001;
    pub const CURRENT_GROUP: u16 = 0x0002;
    pub const SCENE_VALID: u16 = 0x0003;
    pub const NAME_SUPPORT: u16 = 0x0004;
}

/// On/Off cluster attributes
pub mod on_off_attrs {
    pub const ON_OFF: u16 = 0x0000;
}

/// Level Control cluster attributes
pub mod level_attrs {
    pub const CURRENT_LEVEL: u16 = 0x0000;
}

/// Color Control cluster attributes
pub mod color_attrs {
    pub const CURRENT_X: u16 = 0x0003;
    pub const CURRENT_Y: u16 = 0x0004;
    pub const COLOR_MODE: u16 = 0x0008;
    pub const OPTIONS: u16 = 0x000F;
    pub const ENHANCED_COLOR_MODE: u16 = 0x4001;
    pub const COLOR_CAPABILITIES: u16 = 0x400A;
}

/// Time cluster attributes
pub mod time_attrs {
    pub const TIME: u16 = 0x0000;
    pub const TIME_STATUS: u16 = 0x0001;
}

/// Shade Configuration cluster attributes
pub mod shade_config_attrs {
    pub const STATUS: u16 = 0x0002;
    pub const CLOSED_LIMIT: u16 = 0x0010;
    pub const MODE: u16 = 0x0011;
}

/// Door Lock cluster attributes
pub mod door_lock_attrs {
    pub const LOCK_STATE: u16 = 0x0000;
    pub const LOCK_TYPE: u16 = 0x0001;
    pub const ACTUATOR_ENABLED: u16 = 0x0002;
}

/// Temperature Measurement cluster attributes
pub mod temperature_attrs {
    pub const MEASURED_VALUE: u16 = 0x0000;
    pub const MIN_MEASURED_VALUE: u16 = 0x0001;
    pub const MAX_MEASURED_VALUE: u16 = 0x0002;
}

/// On/Off cluster commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnOffCommand {
    Off = 0x00,
    On = 0x01,
    Toggle = 0x02,
}

impl OnOffCommand {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(OnOffCommand::Off),
            0x01 => Some(OnOffCommand::On),
            0x02 => Some(OnOffCommand::Toggle),
            _ => None,
        }
    }
}

/// Side of the cluster an endpoint implements
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ClusterRole {
    /// Input cluster: holds the attributes
    #[default]
    Server = 0x01,
    /// Output cluster: sends commands to servers
    Client = 0x02,
}

/// One-shot hook run when a cluster becomes active
pub trait ClusterInit: Send + Sync {
    fn init(&self, cluster_id: u16);
}

impl<F> ClusterInit for F
where
    F: Fn(u16) + Send + Sync,
{
    fn init(&self, cluster_id: u16) {
        self(cluster_id);
    }
}

/// A cluster instance on an endpoint
pub struct Cluster {
    id: u16,
    role: ClusterRole,
    manuf_code: Option<u16>,
    attrs: AttributeRegistry,
    init: Option<Arc<dyn ClusterInit>>,
    initialized: bool,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &format_args!("{:#06x}", self.id))
            .field("role", &self.role)
            .field("manuf_code", &self.manuf_code)
            .field("attrs", &self.attrs.len())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Create an empty cluster
    #[must_use]
    pub fn new(id: u16, role: ClusterRole) -> Self {
        Self {
            id,
            role,
            manuf_code: None,
            attrs: AttributeRegistry::new(id),
            init: None,
            initialized: false,
        }
    }

    /// Create a cluster holding the given attributes
    pub fn with_attributes(
        id: u16,
        role: ClusterRole,
        attrs: Vec<Attribute>,
    ) -> Result<Self, ZclError> {
        let mut cluster = Self::new(id, role);
        for attr in attrs {
            cluster.attrs.insert(attr)?;
        }
        Ok(cluster)
    }

    /// Scope the cluster and its attributes to a manufacturer
    #[must_use]
    pub fn with_manufacturer(mut self, code: u16) -> Self {
        self.manuf_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_init(mut self, hook: Arc<dyn ClusterInit>) -> Self {
        self.init = Some(hook);
        self
    }

    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> ClusterRole {
        self.role
    }

    #[must_use]
    pub fn manuf_code(&self) -> Option<u16> {
        self.manuf_code
    }

    #[must_use]
    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attrs
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeRegistry {
        &mut self.attrs
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the init hook. Only the first call succeeds.
    pub fn initialize(&mut self) -> Result<(), ZclError> {
        if self.initialized {
            return Err(ZclError::FailedPrecondition(format!(
                "cluster {:#06x} ({:?}) already initialized",
                self.id, self.role
            )));
        }
        if let Some(hook) = &self.init {
            hook.init(self.id);
        }
        self.initialized = true;
        tracing::debug!("Initialized cluster {:#06x} ({:?})", self.id, self.role);
        Ok(())
    }

    /// Whether a request carrying `manuf_code` addresses this cluster
    #[must_use]
    pub fn matches_manufacturer(&self, manuf_code: Option<u16>) -> bool {
        match (self.manuf_code, manuf_code) {
            (None, None) => true,
            (Some(own), Some(requested)) => own == requested,
            _ => false,
        }
    }
}

/// Clusters of one endpoint, keyed by `(cluster_id, role)`
#[derive(Debug, Default)]
pub struct ClusterTable {
    endpoint: u8,
    clusters: Arena<Cluster>,
}

impl ClusterTable {
    #[must_use]
    pub fn new(endpoint: u8) -> Self {
        Self {
            endpoint,
            clusters: Arena::new(),
        }
    }

    /// Register a cluster built from an attribute list.
    ///
    /// The table is untouched unless every attribute is valid.
    pub fn add_cluster(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attrs: Vec<Attribute>,
        manuf_code: Option<u16>,
    ) -> Result<Handle, ZclError> {
        self.check_free(cluster_id, role)?;
        let mut cluster = Cluster::with_attributes(cluster_id, role, attrs)?;
        cluster.manuf_code = manuf_code;
        self.insert(cluster)
    }

    /// Register a prebuilt cluster
    pub fn insert(&mut self, cluster: Cluster) -> Result<Handle, ZclError> {
        self.check_free(cluster.id, cluster.role)?;
        tracing::debug!(
            "Endpoint {}: added cluster {:#06x} ({:?}) with {} attributes",
            self.endpoint,
            cluster.id,
            cluster.role,
            cluster.attrs.len()
        );
        Ok(self.clusters.insert(cluster))
    }

    fn check_free(&self, cluster_id: u16, role: ClusterRole) -> Result<(), ZclError> {
        if self.handle_of(cluster_id, role).is_some() {
            return Err(ZclError::DuplicateCluster {
                endpoint: self.endpoint,
                cluster_id,
                role,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn handle_of(&self, cluster_id: u16, role: ClusterRole) -> Option<Handle> {
        self.clusters
            .iter()
            .find(|(_, c)| c.id == cluster_id && c.role == role)
            .map(|(h, _)| h)
    }

    pub fn find(&self, cluster_id: u16, role: ClusterRole) -> Result<&Cluster, ZclError> {
        self.handle_of(cluster_id, role)
            .and_then(|h| self.clusters.get(h))
            .ok_or(ZclError::NotFound(Missing::Cluster { cluster_id }))
    }

    pub fn find_mut(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
    ) -> Result<&mut Cluster, ZclError> {
        let handle = self
            .handle_of(cluster_id, role)
            .ok_or(ZclError::NotFound(Missing::Cluster { cluster_id }))?;
        self.clusters
            .get_mut(handle)
            .ok_or(ZclError::NotFound(Missing::Cluster { cluster_id }))
    }

    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&Cluster> {
        self.clusters.get(handle)
    }

    pub fn remove(&mut self, cluster_id: u16, role: ClusterRole) -> Result<Cluster, ZclError> {
        let handle = self
            .handle_of(cluster_id, role)
            .ok_or(ZclError::NotFound(Missing::Cluster { cluster_id }))?;
        self.clusters
            .remove(handle)
            .ok_or(ZclError::NotFound(Missing::Cluster { cluster_id }))
    }

    /// Clusters in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().map(|(_, c)| c)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.values_mut()
    }

    /// Input (server) cluster IDs
    #[must_use]
    pub fn in_clusters(&self) -> Vec<u16> {
        self.ids_with_role(ClusterRole::Server)
    }

    /// Output (client) cluster IDs
    #[must_use]
    pub fn out_clusters(&self) -> Vec<u16> {
        self.ids_with_role(ClusterRole::Client)
    }

    fn ids_with_role(&self, role: ClusterRole) -> Vec<u16> {
        self.iter().filter(|c| c.role == role).map(Cluster::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
