pub const KB: usize = 1024;

/// Bytes per device sector.
pub const SECTOR_SIZE: u32 = 512;
