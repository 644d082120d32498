//! Error types for the Solarmon hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// I2C bus could not be opened.
    #[error("I2C bus {bus} not available: {source}")]
    BusNotFound {
        bus: u8,
        #[source]
        source: rppal::i2c::Error,
    },

    /// No sensor acknowledged at the given address.
    #[error("INA219 not responding at address 0x{0:02X}")]
    SensorNotFound(u16),

    /// I2C transfer error.
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    /// GPIO line could not be claimed.
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    /// Indicator output could not be written.
    #[error("Indicator error at {path}: {source}")]
    Indicator {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Register value outside of what the sensor can report.
    #[error("Invalid register value 0x{value:04X} in register 0x{register:02X}")]
    InvalidRegister { register: u8, value: u16 },
}
