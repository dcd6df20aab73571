//! Background polling
//!
//! The poller owns both bus handles and is the only writer of the snapshot
//! cache. Each tick refreshes the AC adapter and the fuel gauge, then sleeps
//! until the next tick or until it is told to stop.

use crate::bus::I2cBus;
use crate::classifier::BatteryState;
use crate::estimator::Estimator;
use crate::registers;
use crate::sample::RawSample;
use crate::snapshot::{AcAdapterSnapshot, SnapshotStore};
use crate::transport::RegisterTransport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Which supply a change notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SupplyKind {
    Battery,
    Adapter,
}

/// Receives change notifications from the poller thread
pub trait ChangeNotifier: Send + 'static {
    fn supply_changed(&self, supply: SupplyKind);
}

/// Forwards notifications over an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<SupplyKind>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, Receiver<SupplyKind>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ChangeNotifier for ChannelNotifier {
    fn supply_changed(&self, supply: SupplyKind) {
        if self.tx.send(supply).is_err() {
            tracing::debug!("Dropped {:?} change notification, receiver gone", supply);
        }
    }
}

/// Notifier for hosts that only poll
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn supply_changed(&self, _supply: SupplyKind) {}
}

/// What one tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub adapter_changed: bool,
    pub battery_changed: bool,
    /// The fuel-gauge sample was rejected and the snapshot left stale
    pub battery_stale: bool,
}

pub struct Poller<G, A> {
    gauge: RegisterTransport<G>,
    adapter: Option<RegisterTransport<A>>,
    estimator: Estimator,
    store: Arc<SnapshotStore>,
    notifier: Box<dyn ChangeNotifier>,
    last_reported_online: bool,
    last_reported_state: BatteryState,
    last_reported_critical: bool,
}

impl<G: I2cBus, A: I2cBus> Poller<G, A> {
    pub fn new(
        gauge: RegisterTransport<G>,
        adapter: Option<RegisterTransport<A>>,
        estimator: Estimator,
        store: Arc<SnapshotStore>,
        notifier: Box<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            gauge,
            adapter,
            estimator,
            store,
            notifier,
            last_reported_online: false,
            last_reported_state: BatteryState::Unknown,
            last_reported_critical: false,
        }
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Run one refresh cycle
    pub fn tick(&mut self) -> TickOutcome {
        let adapter_changed = self.refresh_adapter();
        let (battery_changed, battery_stale) = self.refresh_battery();

        TickOutcome {
            adapter_changed,
            battery_changed,
            battery_stale,
        }
    }

    fn refresh_adapter(&mut self) -> bool {
        let Some(transport) = self.adapter.as_mut() else {
            return false;
        };

        let status = transport.read_byte_or_zero(registers::ADAPTER_STATUS);
        let online = status & registers::ADAPTER_ONLINE_MASK != 0;
        self.store.set_adapter(AcAdapterSnapshot { online });

        if online == self.last_reported_online {
            return false;
        }

        tracing::info!("AC adapter {}", if online { "plugged in" } else { "unplugged" });
        self.last_reported_online = online;
        self.notifier.supply_changed(SupplyKind::Adapter);
        true
    }

    fn refresh_battery(&mut self) -> (bool, bool) {
        let sample = RawSample::acquire(&mut self.gauge);
        let estimator = &mut self.estimator;
        let result = self
            .store
            .update_battery(|snapshot| estimator.update(&sample, snapshot));

        match result {
            Ok(state) => {
                let snapshot = self.store.battery();
                tracing::debug!(
                    "Battery {}: {}% {} mV {} mA, empty in {} s, full in {} s",
                    state.as_str(),
                    snapshot.capacity_percent,
                    snapshot.voltage_millivolts,
                    snapshot.current_milliamps,
                    snapshot.time_to_empty_seconds,
                    snapshot.time_to_full_seconds
                );
                self.report_critical(snapshot.critical, snapshot.capacity_percent);

                if state == self.last_reported_state {
                    return (false, false);
                }

                tracing::info!(
                    "Battery state changed: {} -> {}",
                    self.last_reported_state.as_str(),
                    state.as_str()
                );
                self.last_reported_state = state;
                self.notifier.supply_changed(SupplyKind::Battery);
                (true, false)
            }
            Err(e) => {
                tracing::warn!("Discarding fuel-gauge sample: {}", e);
                (false, true)
            }
        }
    }

    /// Log critical-level transitions
    fn report_critical(&mut self, critical: bool, capacity_percent: u32) {
        if critical == self.last_reported_critical {
            return;
        }

        if critical {
            tracing::warn!("Battery reports critical level ({}%)", capacity_percent);
        } else {
            tracing::info!("Battery left critical level ({}%)", capacity_percent);
        }
        self.last_reported_critical = critical;
    }

    /// Tick every `interval` until `stop` receives a message or hangs up
    ///
    /// The bus handles are released when this returns.
    pub fn run(mut self, interval: Duration, stop: Receiver<()>) {
        tracing::info!("Poller started ({} ms interval)", interval.as_millis());

        loop {
            self.tick();

            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Poller stopped, releasing bus handles");
    }
}
