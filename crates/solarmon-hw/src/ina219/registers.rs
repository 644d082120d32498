//! INA219 register map and value codecs.

use crate::{Error, Result};

/// Configuration register.
pub const REG_CONFIG: u8 = 0x00;
/// Shunt voltage register.
pub const REG_SHUNT_VOLTAGE: u8 = 0x01;
/// Bus voltage register.
pub const REG_BUS_VOLTAGE: u8 = 0x02;
/// Calibration register.
pub const REG_CALIBRATION: u8 = 0x05;

/// 16V bus range, /8 gain (±320mV), 12-bit ADCs, shunt and bus continuous.
pub const CONFIG_16V_320MV: u16 = 0x199F;

/// Shunt voltage LSB in millivolts.
const SHUNT_LSB_MV: f64 = 0.01;
/// Bus voltage LSB in volts.
const BUS_LSB_V: f64 = 0.004;
/// Fixed scaling constant from the datasheet calibration equation.
const CALIBRATION_SCALE: f64 = 0.04096;

/// Decodes the signed shunt voltage register into millivolts.
pub fn decode_shunt_millivolts(raw: u16) -> f64 {
    (raw as i16) as f64 * SHUNT_LSB_MV
}

/// Decodes the bus voltage register into volts.
///
/// Bits 15..3 hold the reading; bit 0 flags a math overflow in the
/// power/current registers which does not affect the bus value itself.
pub fn decode_bus_volts(raw: u16) -> f64 {
    (raw >> 3) as f64 * BUS_LSB_V
}

/// Computes the calibration register value for a shunt and expected current.
pub fn calibration(shunt_ohms: f64, max_expected_amps: f64) -> Result<u16> {
    let current_lsb = max_expected_amps / 32768.0;
    let cal = (CALIBRATION_SCALE / (current_lsb * shunt_ohms)).trunc();
    if !cal.is_finite() || cal < 1.0 || cal > 0xFFFE as f64 {
        return Err(Error::InvalidRegister {
            register: REG_CALIBRATION,
            value: 0,
        });
    }
    // Bit 0 is read-only and always zero.
    Ok((cal as u16) & 0xFFFE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_shunt() {
        assert!((decode_shunt_millivolts(0x0FA0) - 40.0).abs() < 1e-9);
        // 0xF060 is -4000 in two's complement
        assert!((decode_shunt_millivolts(0xF060) + 40.0).abs() < 1e-9);
        assert_eq!(decode_shunt_millivolts(0), 0.0);
    }

    #[test]
    fn test_decode_bus() {
        // 12V = 3000 LSB, shifted left by 3, with CNVR bit set
        let raw = (3000u16 << 3) | 0b10;
        assert!((decode_bus_volts(raw) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_calibration() {
        // 0.1 ohm shunt, 3A expected current
        assert_eq!(calibration(0.1, 3.0).unwrap(), 4472);
        assert!(calibration(0.0, 3.0).is_err());
    }
}
