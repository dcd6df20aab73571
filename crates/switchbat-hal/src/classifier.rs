//! Battery state classification

use crate::registers;
use crate::sample::RawSample;
use serde::Serialize;
use thiserror::Error;

/// Battery charging state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BatteryState {
    #[default]
    Unknown,
    Discharging,
    Charging,
    Full,
}

impl BatteryState {
    /// Decode bits 0 and 1 of the status byte
    pub fn from_status(status: u32) -> Self {
        let discharging = u32::from(registers::STATUS_DISCHARGING);
        let charging = u32::from(registers::STATUS_CHARGING);

        if status & discharging != 0 {
            BatteryState::Discharging
        } else if status & charging != 0 {
            BatteryState::Charging
        } else if status & (discharging | charging) == 0 {
            BatteryState::Full
        } else {
            BatteryState::Unknown
        }
    }

    /// Name as reported in the STATUS property
    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryState::Unknown => "Unknown",
            BatteryState::Discharging => "Discharging",
            BatteryState::Charging => "Charging",
            BatteryState::Full => "Full",
        }
    }
}

/// Why a sample was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("All fuel-gauge registers read as zero, bus transfer failed")]
    AllZero,

    #[error("Unrecognized battery status 0x{0:02X}")]
    UnknownStatus(u32),

    #[error("Battery status register could not be read")]
    StatusUnreadable,
}

/// Result of classifying one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub state: BatteryState,
    /// Status bit 2 while discharging
    pub critical: bool,
}

pub fn classify(sample: &RawSample) -> Result<Classification, SampleError> {
    if sample.is_all_zero() {
        return Err(SampleError::AllZero);
    }
    if sample.status_unreadable {
        return Err(SampleError::StatusUnreadable);
    }

    let state = BatteryState::from_status(sample.status);
    if state == BatteryState::Unknown {
        return Err(SampleError::UnknownStatus(sample.status));
    }

    let critical =
        state == BatteryState::Discharging && sample.status & u32::from(registers::STATUS_CRITICAL) != 0;

    Ok(Classification { state, critical })
}
