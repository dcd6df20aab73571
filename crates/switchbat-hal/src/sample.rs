//! Raw fuel-gauge samples

use crate::bus::I2cBus;
use crate::registers;
use crate::transport::RegisterTransport;

/// One pass over the fuel-gauge registers
///
/// The four reads are separate transactions, so the controller may update its
/// registers mid-sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Status byte
    pub status: u32,
    /// Sign-corrected magnitude of the rate word
    pub rate: u32,
    /// Remaining capacity, 10 mWh per unit
    pub capacity_raw: u32,
    /// Voltage, mV
    pub voltage_raw: u32,
    /// The status read exhausted its retries; `status` is the sentinel, not data
    pub status_unreadable: bool,
}

impl RawSample {
    /// Read status, capacity, voltage and rate, in that order
    ///
    /// Failed reads come back as the sentinel value; see [`RawSample::is_all_zero`].
    /// A failed status read is also flagged, since a zero status byte is
    /// otherwise indistinguishable from Full.
    pub fn acquire<B: I2cBus>(transport: &mut RegisterTransport<B>) -> Self {
        let (status, status_unreadable) = match transport.read_byte(registers::GAUGE_STATUS) {
            Ok(status) => (status, false),
            Err(_) => (registers::SENTINEL, true),
        };
        let capacity_raw = transport.read_word_or_zero(registers::GAUGE_CAPACITY);
        let voltage_raw = transport.read_word_or_zero(registers::GAUGE_VOLTAGE);
        let rate = transport.read_word_or_zero(registers::GAUGE_RATE);

        Self {
            status: u32::from(status),
            rate: registers::correct_rate(rate),
            capacity_raw: u32::from(capacity_raw),
            voltage_raw: u32::from(voltage_raw),
            status_unreadable,
        }
    }

    /// Every field holds the read-failure sentinel
    pub fn is_all_zero(&self) -> bool {
        let sentinel = u32::from(registers::SENTINEL);
        self.status == sentinel
            && self.rate == sentinel
            && self.capacity_raw == sentinel
            && self.voltage_raw == sentinel
    }

    /// Remaining energy in mWh
    pub fn energy_milliwatthours(&self) -> u32 {
        self.capacity_raw.saturating_mul(registers::ENERGY_SCALE)
    }
}
