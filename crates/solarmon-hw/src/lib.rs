//! Solarmon Hardware Library
//!
//! Provides hardware abstraction for the INA219 shunt-voltage sensors and the
//! single status indicator on a headless Raspberry Pi telemetry node.

pub mod error;
pub mod ina219;
pub mod indicator;

pub use error::{Error, Result};
pub use ina219::{Ina219, Ina219Reading};
pub use indicator::{play, GpioIndicator, Indicator, NullIndicator, PulsePattern, SysfsIndicator};

/// I2C bus exposed on the Raspberry Pi header pins.
pub const DEFAULT_I2C_BUS: u8 = 1;
