//! Telemetry engine
//!
//! [`Engine`] ties the pipeline together: it takes ownership of the bus handles,
//! hands them to a poller thread, and exposes the battery and adapter supplies
//! that read from the shared snapshot cache.

use crate::HalError;
use crate::bus::BoxedBus;
use crate::estimator::{DEFAULT_DESIGN_FULL_CAPACITY, Estimator};
use crate::poller::{ChangeNotifier, Poller};
use crate::query::{AdapterSupply, BatterySupply, SupplyDescriptor};
use crate::snapshot::SnapshotStore;
use crate::transport::{DEFAULT_MAX_ATTEMPTS, RegisterTransport};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Engine parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Attempts per transaction phase
    pub max_attempts: u32,
    /// Initial remembered full capacity, raw units
    pub design_full_capacity: u32,
    pub battery: SupplyDescriptor,
    pub adapter: SupplyDescriptor,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            design_full_capacity: DEFAULT_DESIGN_FULL_CAPACITY,
            battery: SupplyDescriptor::battery("BAT0", "Acer Switch 11 Battery", "Acer"),
            adapter: SupplyDescriptor::mains("ADP1"),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), HalError> {
        if self.poll_interval.is_zero() {
            return Err(HalError::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.max_attempts == 0 {
            return Err(HalError::InvalidConfig("max attempts must be at least 1".into()));
        }
        if self.battery.name.is_empty() {
            return Err(HalError::InvalidConfig("battery supply needs a name".into()));
        }
        Ok(())
    }
}

/// Running telemetry engine
///
/// Dropping the engine stops the poller and releases the bus handles.
pub struct Engine {
    battery: BatterySupply,
    adapter: Option<AdapterSupply>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start polling `gauge` and, if present, `adapter`
    pub fn start(
        config: EngineConfig,
        gauge: BoxedBus,
        adapter: Option<BoxedBus>,
        notifier: impl ChangeNotifier,
    ) -> Result<Self, HalError> {
        config.validate()?;

        let store = Arc::new(SnapshotStore::new(config.design_full_capacity));
        let battery = BatterySupply::new(config.battery.clone(), Arc::clone(&store));
        let adapter_supply = adapter
            .is_some()
            .then(|| AdapterSupply::new(config.adapter.clone(), Arc::clone(&store)));

        let poller = Poller::new(
            RegisterTransport::with_max_attempts(gauge, config.max_attempts),
            adapter.map(|bus| RegisterTransport::with_max_attempts(bus, config.max_attempts)),
            Estimator::new(config.design_full_capacity),
            store,
            Box::new(notifier),
        );

        // On spawn failure the closure, and the bus handles in it, are dropped here
        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = config.poll_interval;
        let worker = thread::Builder::new()
            .name("switchbat-poller".into())
            .spawn(move || poller.run(interval, stop_rx))?;

        tracing::info!(
            "Telemetry engine started for {}{}",
            config.battery.name,
            if adapter_supply.is_some() {
                format!(" and {}", config.adapter.name)
            } else {
                String::new()
            }
        );

        Ok(Self {
            battery,
            adapter: adapter_supply,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Open the Linux i2c-dev handles and start the engine
    ///
    /// Handles are acquired gauge first, then adapter; a failure releases what
    /// was already acquired in reverse order.
    #[cfg(target_os = "linux")]
    pub fn open_linux(
        config: EngineConfig,
        bus_index: u8,
        gauge_address: u16,
        adapter_address: Option<u16>,
        notifier: impl ChangeNotifier,
    ) -> Result<Self, HalError> {
        use crate::bus::LinuxI2cBus;

        let gauge = LinuxI2cBus::open(bus_index, gauge_address).map_err(|source| {
            HalError::BusOpen {
                bus: bus_index,
                address: gauge_address,
                source,
            }
        })?;

        let adapter = match adapter_address {
            Some(address) => {
                let bus = LinuxI2cBus::open(bus_index, address).map_err(|source| {
                    tracing::error!("Adapter device unavailable, releasing fuel-gauge handle");
                    HalError::BusOpen {
                        bus: bus_index,
                        address,
                        source,
                    }
                })?;
                Some(Box::new(bus) as BoxedBus)
            }
            None => None,
        };

        Self::start(config, Box::new(gauge), adapter, notifier)
    }

    pub fn battery(&self) -> &BatterySupply {
        &self.battery
    }

    pub fn adapter(&self) -> Option<&AdapterSupply> {
        self.adapter.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the poller and wait for it to release the bus
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Poller thread panicked");
            } else {
                tracing::info!("Telemetry engine stopped");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
