// https://wiki.osdev.org/Paging
// https://wiki.osdev.org/Setting_Up_Paging

// Avoids lots of warnings about casting usize to u32 which cannot result in
// truncation on a 32-bit platform, which is all we support. It would be nice if
// you could tell clippy that you were only dealing with 32-bit usizes...
#![allow(clippy::cast_possible_truncation)]

use crate::mem::PAGE_FRAME_SIZE;
use arbitrary_int::{u10, u12, u20};
use bitbybit::bitfield;
use core::{
    mem::{align_of, size_of},
    ops::{Deref, DerefMut},
};
use static_assertions::const_assert_eq;

pub const PAGE_DIRECTORY_LEN: usize = PAGE_FRAME_SIZE / size_of::<PageDirectoryEntry>();

#[repr(align(4096))]
pub struct PageDirectory(pub [PageDirectoryEntry; PAGE_DIRECTORY_LEN]);

impl Default for PageDirectory {
    fn default() -> Self {
        Self([PageDirectoryEntry::default(); PAGE_DIRECTORY_LEN])
    }
}

impl Deref for PageDirectory {
    type Target = [PageDirectoryEntry; PAGE_DIRECTORY_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageDirectory {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[bitfield(u32, default = 0)]
pub struct PageDirectoryEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(3, rw)]
    write_through: bool,
    #[bit(4, rw)]
    cache_disable: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(7, rw)]
    page_size: bool,
    #[bits(12..=31, rw)]
    page_table_address: u20,
}

pub const PAGE_TABLE_LEN: usize = PAGE_FRAME_SIZE / size_of::<PageTableEntry>();

#[repr(align(4096))]
pub struct PageTable(pub [PageTableEntry; PAGE_TABLE_LEN]);

impl Default for PageTable {
    fn default() -> Self {
        Self([PageTableEntry::default(); PAGE_TABLE_LEN])
    }
}

impl Deref for PageTable {
    type Target = [PageTableEntry; PAGE_TABLE_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

// Both levels must occupy exactly one frame for the MMU to walk them.
const_assert_eq!(size_of::<PageDirectory>(), PAGE_FRAME_SIZE);
const_assert_eq!(size_of::<PageTable>(), PAGE_FRAME_SIZE);
const_assert_eq!(align_of::<PageTable>(), PAGE_FRAME_SIZE);

/// A leaf entry. Bits 9 through 11 are ignored by the MMU; bit 9 marks an
/// entry whose page lives in swap, in which case the address bits hold the
/// swap run instead of a frame number. The kernel never sets present and
/// swapped together.
#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(3, rw)]
    write_through: bool,
    #[bit(4, rw)]
    cache_disable: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bit(7, rw)]
    page_attribute_table: bool,
    #[bit(8, rw)]
    global: bool,
    #[bit(9, rw)]
    swapped: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

impl PageTableEntry {
    /// The swap run recorded in a swapped entry. Meaningless unless
    /// [`Self::swapped`] is set.
    pub fn swap_run(&self) -> u20 {
        self.page_frame_address()
    }

    pub fn with_swap_run(&self, run: u20) -> Self {
        self.with_page_frame_address(run)
    }
}

#[bitfield(u32)]
pub struct VirtualAddress {
    #[bits(22..=31, r)]
    page_directory_index: u10,
    #[bits(12..=21, r)]
    page_table_index: u10,
    #[bits(0..=11, r)]
    offset: u12,
}

impl VirtualAddress {
    pub fn from_usize(addr: usize) -> Self {
        Self::new_with_raw_value(addr as u32)
    }

    /// Rebuilds the page-aligned address that the given indices select.
    pub const fn compose(page_directory_index: usize, page_table_index: usize) -> usize {
        (page_directory_index << 22) | (page_table_index << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapped_bit_is_bit_nine() {
        let entry = PageTableEntry::default().with_swapped(true);
        assert_eq!(entry.raw_value(), 1 << 9);
        assert!(!entry.present());
    }

    #[test]
    fn swap_run_shares_the_frame_address_bits() {
        let entry = PageTableEntry::default()
            .with_swapped(true)
            .with_read_write(true)
            .with_swap_run(u20::new(0x2A));
        assert_eq!(entry.raw_value(), 0x2A << 12 | 1 << 9 | 1 << 1);
        assert_eq!(entry.page_frame_address().value(), 0x2A);
    }

    #[test]
    fn virtual_address_indices() {
        let addr = VirtualAddress::from_usize(0x0040_3123);
        assert_eq!(addr.page_directory_index().value(), 1);
        assert_eq!(addr.page_table_index().value(), 3);
        assert_eq!(addr.offset().value(), 0x123);
        assert_eq!(VirtualAddress::compose(1, 3), 0x0040_3000);
    }
}
