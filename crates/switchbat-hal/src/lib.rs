//! Battery and AC adapter telemetry for the Acer Switch 11
//!
//! The laptop's ACPI tables do not describe its battery, so the fuel gauge and
//! the AC adapter status are read directly from the embedded controller over
//! I2C. This crate turns those raw registers into the usual power-supply
//! properties (status, capacity, time to empty/full, voltage, current, energy).
//!
//! Data flows one way: bus transport, raw sample, classification, estimation,
//! snapshot cache, query surface. A background poller drives the pipeline and
//! is the only component that talks to the bus.
//!
//! # Example
//!
//! ```no_run
//! use switchbat_hal::{BoxedBus, ChannelNotifier, Engine, EngineConfig, PowerSupply, Property};
//! use switchbat_hal::mock::MockBus;
//!
//! fn main() -> switchbat_hal::Result<()> {
//!     let controller = MockBus::with_discharging_battery(0x70);
//!     let (notifier, _events) = ChannelNotifier::channel();
//!
//!     let engine = Engine::start(
//!         EngineConfig::default(),
//!         Box::new(controller.clone()),
//!         Some(Box::new(controller.sharing(0x70)) as BoxedBus),
//!         notifier,
//!     )?;
//!
//!     let status = engine.battery().get_property(Property::Status);
//!     println!("BAT0 status: {:?}", status);
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod classifier;
pub mod engine;
pub mod estimator;
pub mod mock;
pub mod poller;
pub mod query;
pub mod registers;
pub mod sample;
pub mod snapshot;
pub mod transport;

pub use bus::{BoxedBus, BusError, I2cBus};
#[cfg(target_os = "linux")]
pub use bus::LinuxI2cBus;
pub use classifier::{BatteryState, SampleError};
pub use engine::{Engine, EngineConfig};
pub use estimator::{BatterySnapshot, CapacityLevel, Estimator};
pub use poller::{ChangeNotifier, ChannelNotifier, NullNotifier, SupplyKind};
pub use query::{
    AdapterSupply, BatterySupply, PowerSupply, Property, PropertyError, PropertyValue,
    SupplyDescriptor, SupplyType,
};
pub use sample::RawSample;
pub use snapshot::{AcAdapterSnapshot, SnapshotStore};
pub use transport::{RegisterTransport, TransportError};

use thiserror::Error;

/// Engine startup errors
#[derive(Debug, Error)]
pub enum HalError {
    #[error("Failed to open I2C device 0x{address:02X} on bus {bus}: {source}")]
    BusOpen {
        bus: u8,
        address: u16,
        #[source]
        source: BusError,
    },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;
