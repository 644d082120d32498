//! INA219 shunt-voltage sensor module.
//!
//! Provides register-level access to INA219 sensors on the Raspberry Pi I2C bus.

mod device;
pub mod registers;

pub use device::{Ina219, Ina219Reading};
