//! Property query surface
//!
//! The host asks a supply for one property at a time. Every answer comes from
//! the cached snapshot; a query never touches the bus.

use crate::estimator::BatterySnapshot;
use crate::snapshot::SnapshotStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("Unsupported property: {0}")]
    Unsupported(String),
}

/// Property identifiers the host may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Status,
    Capacity,
    CapacityLevel,
    TimeToEmptyNow,
    TimeToEmptyAvg,
    TimeToFullNow,
    TimeToFullAvg,
    VoltageNow,
    CurrentNow,
    EnergyNow,
    EnergyFull,
    Present,
    Technology,
    ModelName,
    Manufacturer,
    Online,
}

impl Property {
    pub fn name(&self) -> &'static str {
        match self {
            Property::Status => "STATUS",
            Property::Capacity => "CAPACITY",
            Property::CapacityLevel => "CAPACITY_LEVEL",
            Property::TimeToEmptyNow => "TIME_TO_EMPTY_NOW",
            Property::TimeToEmptyAvg => "TIME_TO_EMPTY_AVG",
            Property::TimeToFullNow => "TIME_TO_FULL_NOW",
            Property::TimeToFullAvg => "TIME_TO_FULL_AVG",
            Property::VoltageNow => "VOLTAGE_NOW",
            Property::CurrentNow => "CURRENT_NOW",
            Property::EnergyNow => "ENERGY_NOW",
            Property::EnergyFull => "ENERGY_FULL",
            Property::Present => "PRESENT",
            Property::Technology => "TECHNOLOGY",
            Property::ModelName => "MODEL_NAME",
            Property::Manufacturer => "MANUFACTURER",
            Property::Online => "ONLINE",
        }
    }

    /// Parse `STATUS`, `status` or `POWER_SUPPLY_STATUS`
    pub fn from_name(name: &str) -> Result<Self, PropertyError> {
        let upper = name.trim().to_uppercase();
        let bare = upper.strip_prefix("POWER_SUPPLY_").unwrap_or(&upper);

        Self::all()
            .iter()
            .copied()
            .find(|p| p.name() == bare)
            .ok_or_else(|| PropertyError::Unsupported(name.to_string()))
    }

    pub fn all() -> &'static [Property] {
        &[
            Property::Status,
            Property::Capacity,
            Property::CapacityLevel,
            Property::TimeToEmptyNow,
            Property::TimeToEmptyAvg,
            Property::TimeToFullNow,
            Property::TimeToFullAvg,
            Property::VoltageNow,
            Property::CurrentNow,
            Property::EnergyNow,
            Property::EnergyFull,
            Property::Present,
            Property::Technology,
            Property::ModelName,
            Property::Manufacturer,
            Property::Online,
        ]
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Properties served by the battery supply, in reporting order
pub const BATTERY_PROPERTIES: &[Property] = &[
    Property::Status,
    Property::Capacity,
    Property::CapacityLevel,
    Property::TimeToEmptyNow,
    Property::TimeToEmptyAvg,
    Property::TimeToFullNow,
    Property::TimeToFullAvg,
    Property::VoltageNow,
    Property::CurrentNow,
    Property::Present,
    Property::EnergyFull,
    Property::EnergyNow,
    Property::Technology,
    Property::ModelName,
    Property::Manufacturer,
];

/// Properties served by the AC adapter supply
pub const ADAPTER_PROPERTIES: &[Property] = &[Property::Online];

pub const TECHNOLOGY: &str = "lithium-ion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            PropertyValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupplyType {
    Battery,
    Mains,
}

impl SupplyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyType::Battery => "Battery",
            SupplyType::Mains => "Mains",
        }
    }
}

/// Static description of a supply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyDescriptor {
    pub name: String,
    pub supply_type: SupplyType,
    pub model_name: String,
    pub manufacturer: String,
}

impl SupplyDescriptor {
    pub fn battery(name: &str, model_name: &str, manufacturer: &str) -> Self {
        Self {
            name: name.to_string(),
            supply_type: SupplyType::Battery,
            model_name: model_name.to_string(),
            manufacturer: manufacturer.to_string(),
        }
    }

    pub fn mains(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supply_type: SupplyType::Mains,
            model_name: String::new(),
            manufacturer: String::new(),
        }
    }
}

/// A power supply the host can query
pub trait PowerSupply {
    fn descriptor(&self) -> &SupplyDescriptor;

    /// Supported properties, in reporting order
    fn properties(&self) -> &'static [Property];

    fn get_property(&self, property: Property) -> Result<PropertyValue, PropertyError>;

    /// Look up a property by its textual name
    fn get_named(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        self.get_property(Property::from_name(name)?)
    }

    /// `POWER_SUPPLY_<NAME>=<value>` lines, name and type first
    fn uevent(&self) -> Vec<String> {
        let descriptor = self.descriptor();
        let mut lines = vec![
            format!("POWER_SUPPLY_NAME={}", descriptor.name),
            format!("POWER_SUPPLY_TYPE={}", descriptor.supply_type.as_str()),
        ];

        for property in self.properties() {
            match self.get_property(*property) {
                Ok(value) => lines.push(format!("POWER_SUPPLY_{}={}", property.name(), value)),
                Err(e) => tracing::debug!("Skipping {} in uevent: {}", property, e),
            }
        }

        lines
    }
}

/// Battery view over the snapshot cache
#[derive(Debug, Clone)]
pub struct BatterySupply {
    descriptor: Arc<SupplyDescriptor>,
    store: Arc<SnapshotStore>,
}

impl BatterySupply {
    pub fn new(descriptor: SupplyDescriptor, store: Arc<SnapshotStore>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            store,
        }
    }

    pub fn snapshot(&self) -> BatterySnapshot {
        self.store.battery()
    }
}

impl PowerSupply for BatterySupply {
    fn descriptor(&self) -> &SupplyDescriptor {
        &self.descriptor
    }

    fn properties(&self) -> &'static [Property] {
        BATTERY_PROPERTIES
    }

    fn get_property(&self, property: Property) -> Result<PropertyValue, PropertyError> {
        let snapshot = self.store.battery();

        let value = match property {
            Property::Status => PropertyValue::Text(snapshot.state.as_str().into()),
            Property::Capacity => PropertyValue::Int(snapshot.capacity_percent.into()),
            Property::CapacityLevel => PropertyValue::Text(snapshot.capacity_level.as_str().into()),
            Property::TimeToEmptyNow | Property::TimeToEmptyAvg => {
                PropertyValue::Int(snapshot.time_to_empty_seconds.into())
            }
            Property::TimeToFullNow | Property::TimeToFullAvg => {
                PropertyValue::Int(snapshot.time_to_full_seconds.into())
            }
            Property::VoltageNow => PropertyValue::Int(snapshot.voltage_millivolts.into()),
            Property::CurrentNow => PropertyValue::Int(snapshot.current_milliamps.into()),
            // Reported in µWh
            Property::EnergyNow => {
                PropertyValue::Int(i64::from(snapshot.energy_now_milliwatthours) * 1000)
            }
            Property::EnergyFull => {
                PropertyValue::Int(i64::from(snapshot.energy_full_milliwatthours) * 1000)
            }
            Property::Present => PropertyValue::Bool(true),
            Property::Technology => PropertyValue::Text(TECHNOLOGY.into()),
            Property::ModelName => PropertyValue::Text(self.descriptor.model_name.clone()),
            Property::Manufacturer => PropertyValue::Text(self.descriptor.manufacturer.clone()),
            Property::Online => {
                tracing::error!("Unknown battery property {} queried", property);
                return Err(PropertyError::Unsupported(property.name().into()));
            }
        };

        Ok(value)
    }
}

/// AC adapter view over the snapshot cache
#[derive(Debug, Clone)]
pub struct AdapterSupply {
    descriptor: Arc<SupplyDescriptor>,
    store: Arc<SnapshotStore>,
}

impl AdapterSupply {
    pub fn new(descriptor: SupplyDescriptor, store: Arc<SnapshotStore>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            store,
        }
    }

    pub fn is_online(&self) -> bool {
        self.store.adapter().online
    }
}

impl PowerSupply for AdapterSupply {
    fn descriptor(&self) -> &SupplyDescriptor {
        &self.descriptor
    }

    fn properties(&self) -> &'static [Property] {
        ADAPTER_PROPERTIES
    }

    fn get_property(&self, property: Property) -> Result<PropertyValue, PropertyError> {
        match property {
            Property::Online => Ok(PropertyValue::Bool(self.store.adapter().online)),
            other => {
                tracing::error!("Unknown adapter property {} queried", other);
                Err(PropertyError::Unsupported(other.name().into()))
            }
        }
    }
}
