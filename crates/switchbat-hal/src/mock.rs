//! Mock embedded controller for testing without real hardware
//!
//! [`MockBus`] speaks the controller's select-then-read protocol against an
//! in-memory register file. Handles created with [`MockBus::sharing`] see the same
//! controller state, so a test can keep one handle while the poller owns another.
//!
//! # Usage
//!
//! ```no_run
//! use switchbat_hal::mock::MockBus;
//! use switchbat_hal::registers;
//!
//! let gauge = MockBus::new(0x70);
//! gauge.load_battery(registers::STATUS_DISCHARGING, 3000, 3900, 0xFE0C);
//!
//! // Same controller, AC adapter handle
//! let adapter = gauge.sharing(0x70);
//! adapter.set_register(registers::ADAPTER_STATUS, registers::ADAPTER_ONLINE_MASK);
//! ```

use crate::bus::{BusError, I2cBus};
use crate::registers;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared controller state behind every handle of one mock bus
#[derive(Debug, Default)]
pub struct MockBusState {
    /// Register file keyed by (slave address, register)
    registers: HashMap<(u16, u8), u8>,
    /// Sub-register last selected per slave address
    selected: HashMap<u16, u8>,
    /// Number of upcoming writes that fail
    write_failures: u32,
    /// Number of upcoming reads that fail
    read_failures: u32,
    /// Fail every transaction
    offline: bool,
    writes: usize,
    reads: usize,
    last_frame: Vec<u8>,
}

/// Mock I2C device handle
#[derive(Debug, Clone)]
pub struct MockBus {
    address: u16,
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    /// Create a mock controller with an empty register file
    pub fn new(address: u16) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(MockBusState::default())),
        }
    }

    /// Mock controller preloaded with a discharging battery at about 80%
    pub fn with_discharging_battery(address: u16) -> Self {
        let bus = Self::new(address);
        bus.load_battery(registers::STATUS_DISCHARGING, 3000, 3900, 0xFE0C);
        tracing::debug!("[MOCK] Controller 0x{:02X} loaded with discharging battery", address);
        bus
    }

    /// Another handle on the same controller, addressed to `address`
    pub fn sharing(&self, address: u16) -> Self {
        Self {
            address,
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_register(&self, register: u8, value: u8) {
        self.state().registers.insert((self.address, register), value);
    }

    pub fn register(&self, register: u8) -> u8 {
        self.state()
            .registers
            .get(&(self.address, register))
            .copied()
            .unwrap_or(0)
    }

    /// Store a little-endian word at `register` / `register + 1`
    pub fn set_word(&self, register: u8, value: u16) {
        Self::store_word(&mut self.state(), self.address, register, value);
    }

    fn store_word(state: &mut MockBusState, address: u16, register: u8, value: u16) {
        let [low, high] = value.to_le_bytes();
        state.registers.insert((address, register), low);
        state
            .registers
            .insert((address, register.wrapping_add(1)), high);
    }

    /// Load every fuel-gauge register under one lock
    ///
    /// A concurrent poller sees either the old register set or the new one.
    pub fn load_battery(&self, status: u8, capacity_raw: u16, voltage_mv: u16, rate_raw: u16) {
        let address = self.address;
        let mut state = self.state();
        state
            .registers
            .insert((address, registers::GAUGE_STATUS), status);
        Self::store_word(&mut state, address, registers::GAUGE_CAPACITY, capacity_raw);
        Self::store_word(&mut state, address, registers::GAUGE_VOLTAGE, voltage_mv);
        Self::store_word(&mut state, address, registers::GAUGE_RATE, rate_raw);
    }

    pub fn set_adapter_online(&self, online: bool) {
        let value = if online { registers::ADAPTER_ONLINE_MASK } else { 0 };
        self.set_register(registers::ADAPTER_STATUS, value);
    }

    /// Fail the next `count` write transactions
    pub fn fail_next_writes(&self, count: u32) {
        self.state().write_failures = count;
    }

    /// Fail the next `count` read transactions
    pub fn fail_next_reads(&self, count: u32) {
        self.state().read_failures = count;
    }

    /// Fail every transaction until switched back on
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Write transactions attempted so far, including failed ones
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Read transactions attempted so far, including failed ones
    pub fn reads(&self) -> usize {
        self.state().reads
    }

    pub fn transactions(&self) -> usize {
        let state = self.state();
        state.writes + state.reads
    }

    /// Live handles on this controller, this one included
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    pub fn last_frame(&self) -> Vec<u8> {
        self.state().last_frame.clone()
    }
}

impl I2cBus for MockBus {
    fn address(&self) -> u16 {
        self.address
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let address = self.address;
        let mut state = self.state();
        state.writes += 1;
        state.last_frame = bytes.to_vec();

        if state.offline {
            return Err(BusError::Nack);
        }
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(BusError::Busy);
        }

        // Only the sub-register select frame is understood
        match bytes {
            [0x02, 0x80, register, 0x00, 0x00] => {
                state.selected.insert(address, *register);
                Ok(())
            }
            _ => Err(BusError::Nack),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let address = self.address;
        let mut state = self.state();
        state.reads += 1;

        if state.offline {
            return Err(BusError::Nack);
        }
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(BusError::Timeout);
        }

        let register = state.selected.get(&address).copied().unwrap_or(0);
        let value = state
            .registers
            .get(&(address, register))
            .copied()
            .unwrap_or(0);

        buf.fill(0);
        if let Some(first) = buf.first_mut() {
            *first = value;
        }
        Ok(())
    }
}
