//! Two-level page table walks.

// Frame numbers of kernel heap memory fit in 20 bits on a 32-bit kernel.
#![allow(clippy::cast_possible_truncation)]

use super::AddressSpace;
use alloc::boxed::Box;
use arbitrary_int::{u20, Number};
use kidneyos_shared::{
    mem::{OFFSET, PAGE_FRAME_SIZE},
    paging::{PageDirectoryEntry, PageTable, PageTableEntry, VirtualAddress},
};

fn indices(vaddr: usize) -> (usize, usize) {
    let vaddr = VirtualAddress::from_usize(vaddr);
    (
        vaddr.page_directory_index().value().into(),
        vaddr.page_table_index().value().into(),
    )
}

/// The physical frame of a page table allocated from the kernel heap, which is
/// mapped at [`OFFSET`].
fn table_frame_number(table: &PageTable) -> u20 {
    let phys_addr = (table as *const PageTable as usize).wrapping_sub(OFFSET);
    u20::new((phys_addr / PAGE_FRAME_SIZE) as u32 & u20::MAX.value())
}

impl AddressSpace {
    /// Reads the entry for the page containing `vaddr` without creating
    /// anything. [`None`] means no page table covers the address yet.
    pub fn lookup(&self, vaddr: usize) -> Option<PageTableEntry> {
        let (pdi, pti) = indices(vaddr);
        self.tables[pdi].as_ref().map(|table| table[pti])
    }

    pub fn lookup_mut(&mut self, vaddr: usize) -> Option<&mut PageTableEntry> {
        let (pdi, pti) = indices(vaddr);
        self.tables[pdi].as_mut().map(|table| &mut table[pti])
    }

    /// Returns the entry slot for the page containing `vaddr`, first installing
    /// a zeroed page table if none covers it. The directory entry gets every
    /// permission; leaf entries are what restrict access.
    pub fn lookup_or_create(&mut self, vaddr: usize) -> &mut PageTableEntry {
        let (pdi, pti) = indices(vaddr);
        let directory = &mut self.directory;
        let table = self.tables[pdi].get_or_insert_with(|| {
            let table = Box::<PageTable>::default();
            directory[pdi] = PageDirectoryEntry::DEFAULT
                .with_present(true)
                .with_read_write(true)
                .with_user_supervisor(true)
                .with_page_table_address(table_frame_number(&table));
            log::trace!("installed page table for directory index {pdi}");
            table
        });
        &mut table[pti]
    }

    /// Walks to the entry for `vaddr`, creating the page table only when
    /// `create` is set.
    pub fn walk(&mut self, vaddr: usize, create: bool) -> Option<&mut PageTableEntry> {
        if create {
            Some(self.lookup_or_create(vaddr))
        } else {
            self.lookup_mut(vaddr)
        }
    }
}
