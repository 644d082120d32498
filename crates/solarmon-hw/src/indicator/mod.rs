//! Status indicator module.
//!
//! Provides control over the single on/off status light and the timed pulse
//! patterns used to make faults legible without a console.

mod device;
mod pattern;

pub use device::{GpioIndicator, Indicator, NullIndicator, SysfsIndicator};
pub use pattern::{play, PulsePattern};
