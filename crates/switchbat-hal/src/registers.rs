//! Register map of the Acer Switch 11 embedded controller
//!
//! Word registers are little-endian: low byte at `addr`, high byte at `addr + 1`.

/// Battery status byte
pub const GAUGE_STATUS: u8 = 0xC1;
/// Remaining capacity word, 10 mWh per unit
pub const GAUGE_CAPACITY: u8 = 0xC2;
/// Battery voltage word, mV
pub const GAUGE_VOLTAGE: u8 = 0xC6;
/// Signed (dis-)charge current word
pub const GAUGE_RATE: u8 = 0xD0;

/// AC adapter status byte
pub const ADAPTER_STATUS: u8 = 0x6F;
pub const ADAPTER_ONLINE_MASK: u8 = 0x10;

pub const STATUS_DISCHARGING: u8 = 0x01;
pub const STATUS_CHARGING: u8 = 0x02;
/// Only meaningful together with [`STATUS_DISCHARGING`]
pub const STATUS_CRITICAL: u8 = 0x04;

/// Value substituted for a register whose read exhausted its retries
pub const SENTINEL: u8 = 0x00;

/// Capacity register units per mWh
pub const ENERGY_SCALE: u32 = 10;

/// Sub-register select frame written before every byte read
pub fn select_frame(register: u8) -> [u8; 5] {
    [0x02, 0x80, register, 0x00, 0x00]
}

pub fn assemble_word(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Magnitude of a two's-complement rate word
pub fn correct_rate(raw: u16) -> u32 {
    let raw = u32::from(raw);
    if raw > 0x7FFF { 0x10000 - raw } else { raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_frame_layout() {
        assert_eq!(select_frame(0xC1), [0x02, 0x80, 0xC1, 0x00, 0x00]);
        assert_eq!(select_frame(ADAPTER_STATUS), [0x02, 0x80, 0x6F, 0x00, 0x00]);
    }

    #[test]
    fn test_assemble_word_little_endian() {
        assert_eq!(assemble_word(0xE8, 0x03), 1000);
        assert_eq!(assemble_word(0x00, 0x80), 0x8000);
        assert_eq!(assemble_word(0xFF, 0x00), 0x00FF);
    }

    #[test]
    fn test_correct_rate_positive() {
        assert_eq!(correct_rate(0x0000), 0);
        assert_eq!(correct_rate(0x0064), 100);
        assert_eq!(correct_rate(0x7FFF), 0x7FFF);
    }

    #[test]
    fn test_correct_rate_negative() {
        assert_eq!(correct_rate(0xFFFF), 1);
        assert_eq!(correct_rate(0xFF9C), 100);
        assert_eq!(correct_rate(0x8000), 0x8000);
    }

    #[test]
    fn test_correct_rate_boundary_sweep() {
        for raw in [0x7FFEu16, 0x7FFF, 0x8000, 0x8001, 0xFFFE] {
            let expected = if raw > 0x7FFF {
                0x10000 - u32::from(raw)
            } else {
                u32::from(raw)
            };
            assert_eq!(correct_rate(raw), expected, "raw 0x{:04X}", raw);
        }
    }
}
