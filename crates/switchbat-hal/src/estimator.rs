//! Derived battery metrics
//!
//! All quantities are computed in unsigned integer arithmetic from one
//! [`RawSample`]. Capacities stay in raw register units (10 mWh each) until they
//! are reported; the time constants fold that scaling in.

use crate::classifier::{self, BatteryState, Classification, SampleError};
use crate::registers::ENERGY_SCALE;
use crate::sample::RawSample;
use serde::Serialize;

/// Design capacity of the stock battery, raw units (37500 mWh)
pub const DEFAULT_DESIGN_FULL_CAPACITY: u32 = 3750;

/// Seconds per hour times [`ENERGY_SCALE`]
const TIME_TO_EMPTY_FACTOR: u64 = 36_000;
const SECONDS_PER_HOUR: u64 = 3_600;

/// Coarse charge level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CapacityLevel {
    #[default]
    Unknown,
    Critical,
    Low,
    Normal,
    Full,
}

impl CapacityLevel {
    pub fn from_percent(percent: u32) -> Self {
        match percent {
            100.. => CapacityLevel::Full,
            0..=5 => CapacityLevel::Critical,
            6..=15 => CapacityLevel::Low,
            _ => CapacityLevel::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityLevel::Unknown => "Unknown",
            CapacityLevel::Critical => "Critical",
            CapacityLevel::Low => "Low",
            CapacityLevel::Normal => "Normal",
            CapacityLevel::Full => "Full",
        }
    }
}

/// Latest computed battery state, as the host sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatterySnapshot {
    pub state: BatteryState,
    pub critical: bool,
    pub capacity_percent: u32,
    pub capacity_level: CapacityLevel,
    /// Only meaningful while discharging
    pub time_to_empty_seconds: u32,
    /// Only meaningful while charging
    pub time_to_full_seconds: u32,
    pub voltage_millivolts: u32,
    pub current_milliamps: u32,
    /// Rate magnitude times voltage
    pub rate_milliwatts: u32,
    pub energy_now_milliwatthours: u32,
    pub energy_full_milliwatthours: u32,
}

impl BatterySnapshot {
    /// Snapshot before the first valid sample
    pub fn initial(full_capacity: u32) -> Self {
        Self {
            state: BatteryState::Unknown,
            critical: false,
            capacity_percent: 0,
            capacity_level: CapacityLevel::Unknown,
            time_to_empty_seconds: 0,
            time_to_full_seconds: 0,
            voltage_millivolts: 0,
            current_milliamps: 0,
            rate_milliwatts: 0,
            energy_now_milliwatthours: 0,
            energy_full_milliwatthours: full_capacity.saturating_mul(ENERGY_SCALE),
        }
    }
}

impl Default for BatterySnapshot {
    fn default() -> Self {
        Self::initial(DEFAULT_DESIGN_FULL_CAPACITY)
    }
}

/// Turns samples into snapshots and tracks the remembered full capacity
#[derive(Debug, Clone)]
pub struct Estimator {
    remembered_full_capacity: u32,
}

impl Estimator {
    pub fn new(design_full_capacity: u32) -> Self {
        Self {
            remembered_full_capacity: design_full_capacity,
        }
    }

    /// Current full-charge baseline, raw units
    pub fn remembered_full_capacity(&self) -> u32 {
        self.remembered_full_capacity
    }

    /// Apply `sample` to `snapshot`
    ///
    /// A rejected sample leaves both the snapshot and the remembered full
    /// capacity untouched.
    pub fn update(
        &mut self,
        sample: &RawSample,
        snapshot: &mut BatterySnapshot,
    ) -> Result<BatteryState, SampleError> {
        let Classification { state, critical } = classifier::classify(sample)?;

        let remaining = u64::from(sample.capacity_raw);
        let voltage = u64::from(sample.voltage_raw);
        let rate = u64::from(sample.rate) * voltage;
        let watts = rate / 1000;

        let mut time_to_empty = 0;
        let mut time_to_full = 0;

        match state {
            BatteryState::Discharging => {
                if watts != 0 {
                    time_to_empty = remaining * TIME_TO_EMPTY_FACTOR / watts;
                }
            }
            BatteryState::Charging => {
                let full = u64::from(self.remembered_full_capacity);
                let missing = full.saturating_sub(remaining) * u64::from(ENERGY_SCALE);
                if watts != 0 {
                    time_to_full = missing * SECONDS_PER_HOUR / watts;
                }
            }
            BatteryState::Full => {
                if sample.capacity_raw != 0 && sample.capacity_raw != self.remembered_full_capacity {
                    tracing::info!(
                        "Full capacity recalibrated: {} -> {} mWh",
                        u64::from(self.remembered_full_capacity) * u64::from(ENERGY_SCALE),
                        remaining * u64::from(ENERGY_SCALE)
                    );
                    self.remembered_full_capacity = sample.capacity_raw;
                }
            }
            BatteryState::Unknown => return Err(SampleError::UnknownStatus(sample.status)),
        }

        let full = u64::from(self.remembered_full_capacity);
        if full != 0 {
            let percent = (remaining * 100 / full).min(100);
            snapshot.capacity_percent = saturate(percent);
            snapshot.capacity_level = CapacityLevel::from_percent(snapshot.capacity_percent);
        }

        snapshot.state = state;
        snapshot.critical = critical;
        snapshot.time_to_empty_seconds = saturate(time_to_empty);
        snapshot.time_to_full_seconds = saturate(time_to_full);
        snapshot.voltage_millivolts = sample.voltage_raw;
        snapshot.rate_milliwatts = saturate(rate);
        snapshot.current_milliamps = if voltage == 0 { 0 } else { saturate(rate / voltage) };
        snapshot.energy_now_milliwatthours = sample.energy_milliwatthours();
        snapshot.energy_full_milliwatthours = saturate(full * u64::from(ENERGY_SCALE));

        Ok(state)
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(DEFAULT_DESIGN_FULL_CAPACITY)
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: u32, rate: u32, capacity_raw: u32, voltage_raw: u32) -> RawSample {
        RawSample {
            status,
            rate,
            capacity_raw,
            voltage_raw,
            ..Default::default()
        }
    }

    #[test]
    fn test_discharging_end_to_end_numbers() {
        let mut estimator = Estimator::new(20_000);
        let mut snapshot = BatterySnapshot::initial(20_000);

        let state = estimator
            .update(&sample(0x01, 100, 1000, 3000), &mut snapshot)
            .unwrap();

        assert_eq!(state, BatteryState::Discharging);
        assert_eq!(snapshot.rate_milliwatts, 300_000);
        // 1000 * 36000 / (300000 / 1000)
        assert_eq!(snapshot.time_to_empty_seconds, 120_000);
        assert_eq!(snapshot.time_to_full_seconds, 0);
        assert_eq!(snapshot.capacity_percent, 5);
        assert_eq!(snapshot.capacity_level, CapacityLevel::Critical);
        assert_eq!(snapshot.current_milliamps, 100);
        assert_eq!(snapshot.voltage_millivolts, 3000);
        assert_eq!(snapshot.energy_now_milliwatthours, 10_000);
        assert_eq!(snapshot.energy_full_milliwatthours, 200_000);
    }

    #[test]
    fn test_time_to_empty_zero_below_one_watt() {
        let mut estimator = Estimator::default();
        let mut snapshot = BatterySnapshot::default();

        // 1 * 999 < 1000
        estimator
            .update(&sample(0x01, 1, 3000, 999), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.rate_milliwatts, 999);
        assert_eq!(snapshot.time_to_empty_seconds, 0);
    }

    #[test]
    fn test_time_to_empty_positive_above_one_watt() {
        let mut estimator = Estimator::default();
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x01, 1, 1, 1000), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.time_to_empty_seconds, 36_000);
    }

    #[test]
    fn test_charging_time_to_full() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        let state = estimator
            .update(&sample(0x02, 200, 3000, 4000), &mut snapshot)
            .unwrap();

        assert_eq!(state, BatteryState::Charging);
        // (3750 - 3000) * 10 * 3600 / 800
        assert_eq!(snapshot.time_to_full_seconds, 33_750);
        assert_eq!(snapshot.time_to_empty_seconds, 0);
        assert_eq!(snapshot.capacity_percent, 80);
        assert_eq!(snapshot.capacity_level, CapacityLevel::Normal);
    }

    #[test]
    fn test_charging_above_remembered_full_clamps() {
        let mut estimator = Estimator::new(3000);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x02, 200, 3500, 4000), &mut snapshot)
            .unwrap();

        assert_eq!(snapshot.time_to_full_seconds, 0);
        assert_eq!(snapshot.capacity_percent, 100);
        assert_eq!(snapshot.capacity_level, CapacityLevel::Full);
    }

    #[test]
    fn test_charging_without_rate() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x02, 0, 3000, 4000), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.time_to_full_seconds, 0);
    }

    #[test]
    fn test_full_recalibrates_remembered_capacity() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x00, 0, 3600, 4200), &mut snapshot)
            .unwrap();

        assert_eq!(estimator.remembered_full_capacity(), 3600);
        assert_eq!(snapshot.state, BatteryState::Full);
        assert_eq!(snapshot.capacity_percent, 100);
        assert_eq!(snapshot.voltage_millivolts, 4200);
        assert_eq!(snapshot.energy_full_milliwatthours, 36_000);
    }

    #[test]
    fn test_full_with_zero_capacity_keeps_baseline() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x00, 0, 0, 4200), &mut snapshot)
            .unwrap();

        assert_eq!(estimator.remembered_full_capacity(), 3750);
        assert_eq!(snapshot.state, BatteryState::Full);
        assert_eq!(snapshot.voltage_millivolts, 4200);
    }

    #[test]
    fn test_recalibration_feeds_later_percentages() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x00, 0, 3000, 4200), &mut snapshot)
            .unwrap();
        estimator
            .update(&sample(0x01, 100, 1500, 3800), &mut snapshot)
            .unwrap();

        assert_eq!(snapshot.capacity_percent, 50);
    }

    #[test]
    fn test_zero_baseline_leaves_percent_unchanged() {
        let mut estimator = Estimator::new(0);
        let mut snapshot = BatterySnapshot::default();
        snapshot.capacity_percent = 42;

        estimator
            .update(&sample(0x01, 100, 1000, 3000), &mut snapshot)
            .unwrap();

        assert_eq!(snapshot.capacity_percent, 42);
        assert_eq!(snapshot.state, BatteryState::Discharging);
    }

    #[test]
    fn test_all_zero_sample_is_a_no_op() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();
        estimator
            .update(&sample(0x01, 100, 1000, 3000), &mut snapshot)
            .unwrap();
        let before = snapshot;

        for _ in 0..3 {
            let result = estimator.update(&RawSample::default(), &mut snapshot);
            assert_eq!(result, Err(SampleError::AllZero));
        }

        assert_eq!(snapshot, before);
        assert_eq!(estimator.remembered_full_capacity(), 3750);
    }

    #[test]
    fn test_current_derived_from_rate() {
        let mut estimator = Estimator::default();
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x01, 250, 2000, 0), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.current_milliamps, 0);
        assert_eq!(snapshot.rate_milliwatts, 0);

        estimator
            .update(&sample(0x01, 250, 2000, 3800), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.current_milliamps, 250);
    }

    #[test]
    fn test_times_cleared_on_state_change() {
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x01, 500, 2000, 3800), &mut snapshot)
            .unwrap();
        assert!(snapshot.time_to_empty_seconds > 0);

        estimator
            .update(&sample(0x02, 500, 2000, 3800), &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.time_to_empty_seconds, 0);
        assert!(snapshot.time_to_full_seconds > 0);
    }

    #[test]
    fn test_critical_flag_recorded() {
        let mut estimator = Estimator::default();
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x05, 500, 100, 3400), &mut snapshot)
            .unwrap();
        assert!(snapshot.critical);

        estimator
            .update(&sample(0x01, 500, 100, 3400), &mut snapshot)
            .unwrap();
        assert!(!snapshot.critical);
    }

    #[test]
    fn test_capacity_level_thresholds() {
        assert_eq!(CapacityLevel::from_percent(0), CapacityLevel::Critical);
        assert_eq!(CapacityLevel::from_percent(5), CapacityLevel::Critical);
        assert_eq!(CapacityLevel::from_percent(6), CapacityLevel::Low);
        assert_eq!(CapacityLevel::from_percent(15), CapacityLevel::Low);
        assert_eq!(CapacityLevel::from_percent(16), CapacityLevel::Normal);
        assert_eq!(CapacityLevel::from_percent(99), CapacityLevel::Normal);
        assert_eq!(CapacityLevel::from_percent(100), CapacityLevel::Full);
    }

    #[test]
    fn test_extreme_register_values_do_not_overflow() {
        let mut estimator = Estimator::new(1);
        let mut snapshot = BatterySnapshot::default();

        estimator
            .update(&sample(0x01, 0x8000, 0xFFFF, 0xFFFF), &mut snapshot)
            .unwrap();

        assert_eq!(snapshot.capacity_percent, 100);
        assert_eq!(snapshot.rate_milliwatts, 0x8000 * 0xFFFF);
        assert_eq!(snapshot.current_milliamps, 0x8000);
    }

    #[test]
    fn test_unreadable_status_keeps_remembered_capacity() {
        use crate::mock::MockBus;
        use crate::transport::RegisterTransport;

        let bus = MockBus::new(0x70);
        bus.load_battery(0x01, 1500, 3800, 0xFE0C);
        let mut transport = RegisterTransport::new(bus.clone());
        let mut estimator = Estimator::new(3750);
        let mut snapshot = BatterySnapshot::default();

        let sample = RawSample::acquire(&mut transport);
        estimator.update(&sample, &mut snapshot).unwrap();
        assert_eq!(snapshot.capacity_percent, 40);
        let before = snapshot;

        // Status select fails on every attempt, the word reads succeed
        bus.fail_next_writes(5);
        let sample = RawSample::acquire(&mut transport);
        let result = estimator.update(&sample, &mut snapshot);

        assert_eq!(result, Err(SampleError::StatusUnreadable));
        assert_eq!(estimator.remembered_full_capacity(), 3750);
        assert_eq!(snapshot, before);
    }
}
