//! INA219 device communication over the Raspberry Pi I2C controller.

use super::registers::{
    calibration, decode_bus_volts, decode_shunt_millivolts, CONFIG_16V_320MV, REG_BUS_VOLTAGE,
    REG_CALIBRATION, REG_CONFIG, REG_SHUNT_VOLTAGE,
};
use crate::{Error, Result};
use rppal::i2c::I2c;
use tracing::{debug, info};

/// Expected maximum current through the shunt, in amps.
const MAX_EXPECTED_AMPS: f64 = 3.0;

/// One raw sample from an INA219.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ina219Reading {
    /// Voltage across the shunt in millivolts.
    pub shunt_millivolts: f64,
    /// Bus voltage in volts.
    pub bus_volts: f64,
}

/// INA219 sensor bound to one address on an I2C bus.
pub struct Ina219 {
    i2c: I2c,
    address: u16,
}

impl Ina219 {
    /// Opens the bus, selects the sensor and writes configuration and calibration.
    pub fn open(bus: u8, address: u16, shunt_ohms: f64) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|source| {
            debug!("Failed to open I2C bus {}: {}", bus, source);
            Error::BusNotFound { bus, source }
        })?;
        i2c.set_slave_address(address)
            .map_err(|_| Error::SensorNotFound(address))?;

        // Registers are big-endian; the SMBus word calls are little-endian.
        i2c.smbus_write_word_swapped(REG_CONFIG, CONFIG_16V_320MV)
            .map_err(|_| Error::SensorNotFound(address))?;
        i2c.smbus_write_word_swapped(REG_CALIBRATION, calibration(shunt_ohms, MAX_EXPECTED_AMPS)?)?;

        info!("INA219 opened on I2C bus {} at 0x{:02X}", bus, address);
        Ok(Self { i2c, address })
    }

    /// Reads shunt and bus voltage.
    pub fn read(&mut self) -> Result<Ina219Reading> {
        let shunt = self.i2c.smbus_read_word_swapped(REG_SHUNT_VOLTAGE)?;
        let bus = self.i2c.smbus_read_word_swapped(REG_BUS_VOLTAGE)?;
        Ok(Ina219Reading {
            shunt_millivolts: decode_shunt_millivolts(shunt),
            bus_volts: decode_bus_volts(bus),
        })
    }

    /// Returns the sensor address.
    pub fn address(&self) -> u16 {
        self.address
    }
}
