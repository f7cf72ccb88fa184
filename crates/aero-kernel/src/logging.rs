//! `log` backend that writes through the HAL debug console.

use alloc::boxed::Box;

use aero_hal::HAL;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Logger forwarding every record to `HAL::debug_write`.
///
/// Lines read `[LEVEL target] message`.
pub struct HalLogger<H: HAL> {
    hal: H,
    level: LevelFilter,
}

impl<H: HAL> HalLogger<H> {
    pub fn new(hal: H, level: LevelFilter) -> Self {
        Self { hal, level }
    }

    /// Console the logger writes to
    pub fn hal(&self) -> &H {
        &self.hal
    }
}

impl<H: HAL> Log for HalLogger<H> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.hal.debug_write(&alloc::format!(
            "[{} {}] {}",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Install a `HalLogger` as the global logger.
///
/// Can only succeed once per program; later calls return the error from
/// `log::set_logger`.
pub fn init_logger<H: HAL>(hal: H, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger: &'static HalLogger<H> = Box::leak(Box::new(HalLogger::new(hal, level)));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}
