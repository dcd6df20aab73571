//! Retrying register access
//!
//! A register read is two bus transactions: the 5-byte sub-register select frame,
//! then a 1-byte read from the same address. The bus on this machine drops
//! transfers regularly, so each phase is retried before the read is given up.

use crate::bus::{BusError, I2cBus};
use crate::registers::{self, SENTINEL};
use std::fmt;
use thiserror::Error;

/// Attempts per transaction phase
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Which half of a register read failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Select,
    Read,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Select => f.write_str("Write to"),
            Phase::Read => f.write_str("Read of"),
        }
    }
}

/// A register read that exhausted its retries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} register 0x{register:02X} failed after {attempts} attempts (result {code})")]
pub struct TransportError {
    pub phase: Phase,
    pub register: u8,
    pub attempts: u32,
    /// Result code of the last attempt
    pub code: i32,
}

/// Register reader for one device
pub struct RegisterTransport<B> {
    bus: B,
    max_attempts: u32,
}

impl<B: I2cBus> RegisterTransport<B> {
    pub fn new(bus: B) -> Self {
        Self::with_max_attempts(bus, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(bus: B, max_attempts: u32) -> Self {
        Self {
            bus,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Read one byte register
    pub fn read_byte(&mut self, register: u8) -> Result<u8, TransportError> {
        let frame = registers::select_frame(register);
        self.with_retry(Phase::Select, register, |bus| bus.write(&frame))?;

        let mut value = [0u8; 1];
        self.with_retry(Phase::Read, register, |bus| bus.read(&mut value))?;

        Ok(value[0])
    }

    /// Read one byte register, degrading a failed read to [`SENTINEL`]
    pub fn read_byte_or_zero(&mut self, register: u8) -> u8 {
        self.read_byte(register).unwrap_or(SENTINEL)
    }

    /// Read a little-endian word register pair
    pub fn read_word(&mut self, register: u8) -> Result<u16, TransportError> {
        let low = self.read_byte(register)?;
        let high = self.read_byte(register.wrapping_add(1))?;
        Ok(registers::assemble_word(low, high))
    }

    /// Read a word register pair; each failed half reads as [`SENTINEL`]
    pub fn read_word_or_zero(&mut self, register: u8) -> u16 {
        let low = self.read_byte_or_zero(register);
        let high = self.read_byte_or_zero(register.wrapping_add(1));
        registers::assemble_word(low, high)
    }

    fn with_retry<F>(&mut self, phase: Phase, register: u8, mut op: F) -> Result<(), TransportError>
    where
        F: FnMut(&mut B) -> Result<(), BusError>,
    {
        let mut code = 0;
        for attempt in 1..=self.max_attempts {
            match op(&mut self.bus) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    code = e.code();
                    tracing::warn!(
                        "{} register 0x{:02X} failed (result {}, try {}/{})",
                        phase,
                        register,
                        code,
                        attempt,
                        self.max_attempts
                    );
                }
            }
        }

        Err(TransportError {
            phase,
            register,
            attempts: self.max_attempts,
            code,
        })
    }
}
