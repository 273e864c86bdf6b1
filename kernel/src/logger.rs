//! Kernel log output through the `log` facade.

use crate::sync::Mutex;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record};

#[cfg(debug_assertions)]
pub const MAX_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
pub const MAX_LEVEL: LevelFilter = LevelFilter::Info;

/// Formats records as `[LEVEL] target: message` lines into `W`.
pub struct KernelLogger<W> {
    writer: Mutex<W>,
    level: LevelFilter,
}

impl<W> KernelLogger<W> {
    pub const fn new(writer: W, level: LevelFilter) -> Self {
        Self {
            writer: Mutex::new(writer),
            level,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Log for KernelLogger<W> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Nowhere to report a failed write.
        let _ = writeln!(
            self.writer.lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "x86")]
lazy_static::lazy_static! {
    static ref SERIAL_LOGGER: KernelLogger<kidneyos_shared::serial::SerialWriter> =
        KernelLogger::new(kidneyos_shared::serial::SerialWriter::new(), MAX_LEVEL);
}

/// Routes `log` output to the first serial port.
#[cfg(target_arch = "x86")]
pub fn init() -> Result<(), log::SetLoggerError> {
    log::set_logger(&*SERIAL_LOGGER)?;
    log::set_max_level(MAX_LEVEL);
    Ok(())
}
