pub mod pte;
pub mod tlb;
mod walker;

pub use pte::{Permissions, Pte};
pub use tlb::TranslationCache;

use crate::sync::{Mutex, MutexGuard};
use alloc::{boxed::Box, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};
use kidneyos_shared::paging::{
    PageDirectory, PageTable, PageTableEntry, VirtualAddress, PAGE_DIRECTORY_LEN,
};

/// A process's page directory and the page tables reachable from it.
///
/// The directory is what the MMU walks. Page tables are additionally kept by
/// directory index so the kernel can reach them without translating the
/// physical addresses stored in directory entries.
pub struct AddressSpace {
    directory: Box<PageDirectory>,
    tables: Vec<Option<Box<PageTable>>>,
}

impl AddressSpace {
    pub fn new() -> Self {
        let mut tables = Vec::with_capacity(PAGE_DIRECTORY_LEN);
        tables.resize_with(PAGE_DIRECTORY_LEN, || None);
        Self {
            directory: Box::default(),
            tables,
        }
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// Every leaf entry in a page table that exists, with the page-aligned
    /// virtual address it maps, in ascending address order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(pdi, table)| table.as_ref().map(|table| (pdi, table)))
            .flat_map(|(pdi, table)| {
                table
                    .iter()
                    .enumerate()
                    .map(move |(pti, entry)| (VirtualAddress::compose(pdi, pti), *entry))
            })
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (usize, &mut PageTableEntry)> + '_ {
        self.tables
            .iter_mut()
            .enumerate()
            .filter_map(|(pdi, table)| table.as_mut().map(|table| (pdi, table)))
            .flat_map(|(pdi, table)| {
                table
                    .iter_mut()
                    .enumerate()
                    .map(move |(pti, entry)| (VirtualAddress::compose(pdi, pti), entry))
            })
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// An address space as the contexts that fault on it share it.
///
/// Next to the lock it counts every page resolved through it, so a fault can
/// tell whether anything became present between the moment it was raised and
/// the moment it got the lock.
#[derive(Default)]
pub struct SharedAddressSpace {
    space: Mutex<AddressSpace>,
    resolutions: AtomicUsize,
}

impl SharedAddressSpace {
    pub fn new(space: AddressSpace) -> Self {
        Self {
            space: Mutex::new(space),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn lock(&self) -> MutexGuard<AddressSpace> {
        self.space.lock()
    }

    /// How many pages have been resolved so far. Only compared for equality,
    /// so wrapping is harmless.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Acquire)
    }

    /// Counts one resolution. Called with the lock still held, so any fault
    /// that gets the lock afterwards sees the new count.
    pub(crate) fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Release);
    }
}
