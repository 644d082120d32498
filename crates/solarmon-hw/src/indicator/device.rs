//! Indicator outputs backed by sysfs.

use crate::{Error, Result};
use rppal::gpio::{Gpio, OutputPin};
use std::fs;
use tracing::{debug, info};

/// A binary on/off output with no feedback.
pub trait Indicator: Send {
    /// Switches the output on or off.
    fn set(&mut self, on: bool) -> Result<()>;
}

/// Indicator wired to a Raspberry Pi GPIO line (BCM numbering).
pub struct GpioIndicator {
    pin: OutputPin,
}

impl GpioIndicator {
    /// Claims the line as an output, initially off.
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_output_low();
        info!("Status indicator on GPIO {}", bcm_pin);
        Ok(Self { pin })
    }

    /// Returns the BCM pin number.
    pub fn pin(&self) -> u8 {
        self.pin.pin()
    }
}

impl Indicator for GpioIndicator {
    fn set(&mut self, on: bool) -> Result<()> {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

/// Indicator driven through an LED class attribute
/// (`/sys/class/leds/<name>/brightness`), such as the board's ACT LED.
pub struct SysfsIndicator {
    path: String,
}

impl SysfsIndicator {
    /// Creates a new indicator writing to the given attribute file.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    /// Returns the attribute path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Indicator for SysfsIndicator {
    fn set(&mut self, on: bool) -> Result<()> {
        let value = if on { "1" } else { "0" };
        fs::write(&self.path, value).map_err(|source| Error::Indicator {
            path: self.path.clone(),
            source,
        })?;
        debug!("Indicator {} set to {}", self.path, value);
        Ok(())
    }
}

/// Indicator for hosts without a status light.
#[derive(Debug, Default)]
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn set(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }
}
