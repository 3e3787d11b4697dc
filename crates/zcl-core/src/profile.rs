//! Home Automation device profiles
//!
//! Each [`DeviceType`] names the server clusters it must carry and the
//! client clusters it drives. Server clusters are populated from the
//! matching config in [`ProfileConfig`]; every config deserializes with
//! the HA default values for fields that are left out.

use crate::attribute::{Access, Attribute};
use crate::cluster::{
    basic_attrs, color_attrs, door_lock_attrs, groups_attrs, id, identify_attrs, level_attrs,
    on_off_attrs, scenes_attrs, shade_config_attrs, temperature_attrs, time_attrs, ClusterRole,
};
use crate::endpoint::Endpoint;
use crate::error::ZclError;
use serde::{Deserialize, Serialize};
use zcl_types::{profiles, AttrValue};

/// Application device version advertised in the simple descriptor
pub const DEVICE_VERSION: u8 = 0;

/// HA device types with a canonical cluster set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    OnOffLight,
    OnOffSwitch,
    ColorDimmableLight,
    ColorDimmableSwitch,
    MainsPowerOutlet,
    Shade,
    ShadeController,
    DoorLock,
    DoorLockController,
    TemperatureSensor,
}

impl DeviceType {
    /// HA device id
    #[must_use]
    pub fn device_id(&self) -> u16 {
        match self {
            DeviceType::OnOffSwitch => 0x0000,
            DeviceType::MainsPowerOutlet => 0x0009,
            DeviceType::DoorLock => 0x000A,
            DeviceType::DoorLockController => 0x000B,
            DeviceType::OnOffLight => 0x0100,
            DeviceType::ColorDimmableLight => 0x0102,
            DeviceType::ColorDimmableSwitch => 0x0105,
            DeviceType::Shade => 0x0200,
            DeviceType::ShadeController => 0x0201,
            DeviceType::TemperatureSensor => 0x0302,
        }
    }

    /// Server clusters, in registration order
    #[must_use]
    pub fn server_clusters(&self) -> &'static [u16] {
        match self {
            DeviceType::OnOffLight | DeviceType::MainsPowerOutlet => {
                &[id::BASIC, id::IDENTIFY, id::GROUPS, id::SCENES, id::ON_OFF]
            }
            DeviceType::ColorDimmableLight => &[
                id::BASIC,
                id::IDENTIFY,
                id::GROUPS,
                id::SCENES,
                id::ON_OFF,
                id::LEVEL_CONTROL,
                id::COLOR_CONTROL,
            ],
            DeviceType::Shade => &[
                id::BASIC,
                id::IDENTIFY,
                id::GROUPS,
                id::SCENES,
                id::ON_OFF,
                id::LEVEL_CONTROL,
                id::SHADE_CONFIG,
            ],
            DeviceType::DoorLock => &[
                id::BASIC,
                id::IDENTIFY,
                id::GROUPS,
                id::SCENES,
                id::DOOR_LOCK,
            ],
            DeviceType::TemperatureSensor => {
                &[id::BASIC, id::IDENTIFY, id::TEMPERATURE_MEASUREMENT]
            }
            DeviceType::OnOffSwitch
            | DeviceType::ColorDimmableSwitch
            | DeviceType::ShadeController
            | DeviceType::DoorLockController => &[id::BASIC, id::IDENTIFY],
        }
    }

    /// Client clusters, in registration order
    #[must_use]
    pub fn client_clusters(&self) -> &'static [u16] {
        match self {
            DeviceType::OnOffSwitch => &[id::IDENTIFY, id::ON_OFF],
            DeviceType::ColorDimmableSwitch => &[
                id::IDENTIFY,
                id::ON_OFF,
                id::LEVEL_CONTROL,
                id::COLOR_CONTROL,
            ],
            DeviceType::ShadeController => &[id::IDENTIFY, id::ON_OFF, id::LEVEL_CONTROL],
            DeviceType::DoorLockController => {
                &[id::IDENTIFY, id::GROUPS, id::SCENES, id::DOOR_LOCK]
            }
            DeviceType::TemperatureSensor => &[id::IDENTIFY],
            DeviceType::OnOffLight
            | DeviceType::ColorDimmableLight
            | DeviceType::MainsPowerOutlet
            | DeviceType::Shade
            | DeviceType::DoorLock => &[],
        }
    }
}

/// Server-side attribute set of one cluster
pub trait ClusterConfig {
    const CLUSTER_ID: u16;

    fn attributes(&self) -> Vec<Attribute>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub zcl_version: u8,
    pub power_source: u8,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            zcl_version: 8,
            power_source: 0x00,
        }
    }
}

impl ClusterConfig for BasicConfig {
    const CLUSTER_ID: u16 = id::BASIC;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                basic_attrs::ZCL_VERSION,
                Access::READ_ONLY,
                AttrValue::U8(self.zcl_version),
            ),
            Attribute::new(
                basic_attrs::POWER_SOURCE,
                Access::READ_ONLY,
                AttrValue::Enum8(self.power_source),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyConfig {
    pub identify_time: u16,
}

impl ClusterConfig for IdentifyConfig {
    const CLUSTER_ID: u16 = id::IDENTIFY;

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::new(
            identify_attrs::IDENTIFY_TIME,
            Access::READ_WRITE,
            AttrValue::U16(self.identify_time),
        )]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub name_support: u8,
}

impl ClusterConfig for GroupsConfig {
    const CLUSTER_ID: u16 = id::GROUPS;

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::new(
            groups_attrs::NAME_SUPPORT,
            Access::READ_ONLY,
            AttrValue::Bitmap8(self.name_support),
        )]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenesConfig {
    pub scene_count: u8,
    pub current_scene: u8,
    pub current_group: u16,
    pub scene_valid: bool,
    pub name_support: u8,
}

impl ClusterConfig for ScenesConfig {
    const CLUSTER_ID: u16 = id::SCENES;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                scenes_attrs::SCENE_COUNT,
                Access::READ_ONLY,
                AttrValue::U8(self.scene_count),
            ),
            Attribute::new(
                scenes_attrs::CURRENT_SCENE,
                Access::READ_ONLY,
                AttrValue::U8(self.current_scene),
            ),
            Attribute::new(
                scenes_attrs::CURRENT_GROUP,
                Access::READ_ONLY,
                AttrValue::U16(self.current_group),
            ),
            Attribute::new(
                scenes_attrs::SCENE_VALID,
                Access::READ_ONLY,
                AttrValue::Bool(self.scene_valid),
            ),
            Attribute::new(
                scenes_attrs::NAME_SUPPORT,
                Access::READ_ONLY,
                AttrValue::Bitmap8(self.name_support),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnOffConfig {
    pub on_off: bool,
}

impl ClusterConfig for OnOffConfig {
    const CLUSTER_ID: u16 = id::ON_OFF;

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::new(
            on_off_attrs::ON_OFF,
            Access::READ_REPORTING | Access::SCENE,
            AttrValue::Bool(self.on_off),
        )]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub current_level: u8,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            current_level: 0xFF,
        }
    }
}

impl ClusterConfig for LevelConfig {
    const CLUSTER_ID: u16 = id::LEVEL_CONTROL;

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::new(
            level_attrs::CURRENT_LEVEL,
            Access::READ_REPORTING | Access::SCENE,
            AttrValue::U8(self.current_level),
        )]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub current_x: u16,
    pub current_y: u16,
    pub color_mode: u8,
    pub options: u8,
    pub enhanced_color_mode: u8,
    pub color_capabilities: u16,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            current_x: 0x616B,
            current_y: 0x607D,
            color_mode: 0x01,
            options: 0x00,
            enhanced_color_mode: 0x01,
            color_capabilities: 0x0008,
        }
    }
}

impl ClusterConfig for ColorConfig {
    const CLUSTER_ID: u16 = id::COLOR_CONTROL;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                color_attrs::CURRENT_X,
                Access::READ_REPORTING | Access::SCENE,
                AttrValue::U16(self.current_x),
            ),
            Attribute::new(
                color_attrs::CURRENT_Y,
                Access::READ_REPORTING | Access::SCENE,
                AttrValue::U16(self.current_y),
            ),
            Attribute::new(
                color_attrs::COLOR_MODE,
                Access::READ_ONLY,
                AttrValue::Enum8(self.color_mode),
            ),
            Attribute::new(
                color_attrs::OPTIONS,
                Access::READ_WRITE,
                AttrValue::Bitmap8(self.options),
            ),
            Attribute::new(
                color_attrs::ENHANCED_COLOR_MODE,
                Access::READ_ONLY,
                AttrValue::Enum8(self.enhanced_color_mode),
            ),
            Attribute::new(
                color_attrs::COLOR_CAPABILITIES,
                Access::READ_ONLY,
                AttrValue::Bitmap16(self.color_capabilities),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Seconds since 2000-01-01 UTC
    pub time: u32,
    pub time_status: u8,
}

impl ClusterConfig for TimeConfig {
    const CLUSTER_ID: u16 = id::TIME;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                time_attrs::TIME,
                Access::READ_WRITE,
                AttrValue::UtcTime(self.time),
            ),
            Attribute::new(
                time_attrs::TIME_STATUS,
                Access::READ_WRITE,
                AttrValue::Bitmap8(self.time_status),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadeConfig {
    pub status: u8,
    pub closed_limit: u16,
    pub mode: u8,
}

impl Default for ShadeConfig {
    fn default() -> Self {
        Self {
            status: 0x00,
            closed_limit: 0x0001,
            mode: 0x00,
        }
    }
}

impl ClusterConfig for ShadeConfig {
    const CLUSTER_ID: u16 = id::SHADE_CONFIG;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                shade_config_attrs::STATUS,
                Access::READ_WRITE,
                AttrValue::Bitmap8(self.status),
            ),
            Attribute::new(
                shade_config_attrs::CLOSED_LIMIT,
                Access::READ_WRITE,
                AttrValue::U16(self.closed_limit),
            ),
            Attribute::new(
                shade_config_attrs::MODE,
                Access::READ_WRITE,
                AttrValue::Enum8(self.mode),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorLockConfig {
    pub lock_state: u8,
    pub lock_type: u8,
    pub actuator_enabled: bool,
}

impl Default for DoorLockConfig {
    fn default() -> Self {
        Self {
            lock_state: 0x00,
            lock_type: 0x00,
            actuator_enabled: true,
        }
    }
}

impl ClusterConfig for DoorLockConfig {
    const CLUSTER_ID: u16 = id::DOOR_LOCK;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                door_lock_attrs::LOCK_STATE,
                Access::READ_REPORTING,
                AttrValue::Enum8(self.lock_state),
            ),
            Attribute::new(
                door_lock_attrs::LOCK_TYPE,
                Access::READ_ONLY,
                AttrValue::Enum8(self.lock_type),
            ),
            Attribute::new(
                door_lock_attrs::ACTUATOR_ENABLED,
                Access::READ_ONLY,
                AttrValue::Bool(self.actuator_enabled),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    /// Hundredths of a degree Celsius; `i16::MIN` means unknown
    pub measured_value: i16,
    pub min_value: i16,
    pub max_value: i16,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            measured_value: i16::MIN,
            min_value: i16::MIN,
            max_value: i16::MIN,
        }
    }
}

impl ClusterConfig for TemperatureConfig {
    const CLUSTER_ID: u16 = id::TEMPERATURE_MEASUREMENT;

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            Attribute::new(
                temperature_attrs::MEASURED_VALUE,
                Access::READ_REPORTING,
                AttrValue::I16(self.measured_value),
            ),
            Attribute::new(
                temperature_attrs::MIN_MEASURED_VALUE,
                Access::READ_ONLY,
                AttrValue::I16(self.min_value),
            ),
            Attribute::new(
                temperature_attrs::MAX_MEASURED_VALUE,
                Access::READ_ONLY,
                AttrValue::I16(self.max_value),
            ),
        ]
    }
}

/// Cluster configs for building an endpoint. A device type needs a config
/// for each of its server clusters; `time` is optional for every type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub basic: Option<BasicConfig>,
    pub identify: Option<IdentifyConfig>,
    pub groups: Option<GroupsConfig>,
    pub scenes: Option<ScenesConfig>,
    pub on_off: Option<OnOffConfig>,
    pub level: Option<LevelConfig>,
    pub color: Option<ColorConfig>,
    pub time: Option<TimeConfig>,
    pub shade_config: Option<ShadeConfig>,
    pub door_lock: Option<DoorLockConfig>,
    pub temperature: Option<TemperatureConfig>,
}

impl ProfileConfig {
    /// HA defaults for every server cluster of `device_type`
    #[must_use]
    pub fn home_automation(device_type: DeviceType) -> Self {
        let mut config = Self::default();
        config.fill_defaults(device_type);
        config
    }

    /// Add default configs for any server cluster of `device_type` that
    /// has none
    pub fn fill_defaults(&mut self, device_type: DeviceType) {
        for &cluster_id in device_type.server_clusters() {
            match cluster_id {
                id::BASIC => fill(&mut self.basic),
                id::IDENTIFY => fill(&mut self.identify),
                id::GROUPS => fill(&mut self.groups),
                id::SCENES => fill(&mut self.scenes),
                id::ON_OFF => fill(&mut self.on_off),
                id::LEVEL_CONTROL => fill(&mut self.level),
                id::COLOR_CONTROL => fill(&mut self.color),
                id::SHADE_CONFIG => fill(&mut self.shade_config),
                id::DOOR_LOCK => fill(&mut self.door_lock),
                id::TEMPERATURE_MEASUREMENT => fill(&mut self.temperature),
                _ => {}
            }
        }
    }

    fn server_attributes(&self, cluster_id: u16) -> Option<Vec<Attribute>> {
        match cluster_id {
            id::BASIC => attributes_of(&self.basic),
            id::IDENTIFY => attributes_of(&self.identify),
            id::GROUPS => attributes_of(&self.groups),
            id::SCENES => attributes_of(&self.scenes),
            id::ON_OFF => attributes_of(&self.on_off),
            id::LEVEL_CONTROL => attributes_of(&self.level),
            id::COLOR_CONTROL => attributes_of(&self.color),
            id::TIME => attributes_of(&self.time),
            id::SHADE_CONFIG => attributes_of(&self.shade_config),
            id::DOOR_LOCK => attributes_of(&self.door_lock),
            id::TEMPERATURE_MEASUREMENT => attributes_of(&self.temperature),
            _ => None,
        }
    }
}

fn fill<C: Default>(slot: &mut Option<C>) {
    if slot.is_none() {
        *slot = Some(C::default());
    }
}

fn attributes_of<C: ClusterConfig>(config: &Option<C>) -> Option<Vec<Attribute>> {
    config.as_ref().map(C::attributes)
}

/// Build an endpoint for `device_type` on the HA profile.
///
/// Fails with `InvalidArgument` if a required server cluster config is
/// missing. The builder keeps no state; identical inputs give identical
/// endpoints.
pub fn build_endpoint(
    ep_id: u8,
    device_type: DeviceType,
    config: &ProfileConfig,
) -> Result<Endpoint, ZclError> {
    let mut endpoint = Endpoint::new(ep_id, profiles::HOME_AUTOMATION)?
        .with_device(device_type.device_id(), DEVICE_VERSION);

    for &cluster_id in device_type.server_clusters() {
        let attrs = config.server_attributes(cluster_id).ok_or_else(|| {
            ZclError::InvalidArgument(format!(
                "{device_type:?} on endpoint {ep_id} needs a config for cluster {cluster_id:#06x}"
            ))
        })?;
        endpoint.add_cluster(cluster_id, ClusterRole::Server, attrs, None)?;
    }

    if let Some(time) = &config.time {
        endpoint.add_cluster(TimeConfig::CLUSTER_ID, ClusterRole::Server, time.attributes(), None)?;
    }

    for &cluster_id in device_type.client_clusters() {
        endpoint.add_cluster(cluster_id, ClusterRole::Client, Vec::new(), None)?;
    }

    tracing::debug!(
        "Built {:?} endpoint {} with {} clusters",
        device_type,
        ep_id,
        endpoint.clusters().len()
    );
    Ok(endpoint)
}
