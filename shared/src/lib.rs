#![cfg_attr(not(test), no_std)]

pub mod mem;
pub mod paging;
#[cfg(target_arch = "x86")]
pub mod serial;
pub mod sizes;
