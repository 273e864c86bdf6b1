#![cfg_attr(target_os = "none", no_std)]

//! Demand paging for user address spaces: frames are populated on first
//! touch, evicted to a swap device under memory pressure and restored when
//! touched again.

pub mod block;
pub mod drivers;
pub mod interrupts;
pub mod logger;
pub mod mem;
pub mod pager;
pub mod paging;
pub mod swapping;
pub mod sync;

#[cfg(test)]
mod test_utils;

extern crate alloc;

pub use pager::{Pager, PagingError};
