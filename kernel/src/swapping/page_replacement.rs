use crate::paging::AddressSpace;
use alloc::vec::Vec;
use kidneyos_shared::{
    mem::{OFFSET, PAGE_FRAME_SIZE},
    paging::PageTableEntry,
};

/// Chooses which resident page to give up when frames run out.
pub trait PageReplacementPolicy: Send {
    /// Returns the address of one evictable page in `space`, never `in_flight`
    /// (the page whose fault is being resolved). [`None`] if nothing in
    /// `space` can be evicted.
    fn select_victim(&mut self, space: &mut AddressSpace, in_flight: usize) -> Option<usize>;
}

/// Whether the page at `vaddr` may be swapped out: resident, user-owned, and
/// below the kernel's half of the address space.
pub fn is_evictable(vaddr: usize, entry: PageTableEntry) -> bool {
    entry.present() && !entry.swapped() && entry.user_supervisor() && vaddr < OFFSET
}

/// Second chance: sweep resident pages in address order from where the last
/// sweep stopped, clearing accessed bits, and take the first page found with
/// its accessed bit already clear.
///
/// One hand serves every address space the pager handles. It is only a hint
/// for where a sweep starts: a sweep begins at the first candidate at or
/// above it, or wraps to the lowest, and always covers every candidate of the
/// space it is given.
#[derive(Debug, Default)]
pub struct ClockEviction {
    hand: usize,
}

impl ClockEviction {
    pub const fn new() -> Self {
        Self { hand: 0 }
    }
}

impl PageReplacementPolicy for ClockEviction {
    fn select_victim(&mut self, space: &mut AddressSpace, in_flight: usize) -> Option<usize> {
        let candidates: Vec<usize> = space
            .entries()
            .filter(|&(vaddr, entry)| vaddr != in_flight && is_evictable(vaddr, entry))
            .map(|(vaddr, _)| vaddr)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let start = candidates
            .iter()
            .position(|&vaddr| vaddr >= self.hand)
            .unwrap_or(0);

        // The first lap clears every accessed bit it passes, so the second lap
        // cannot come up empty.
        for i in 0..2 * candidates.len() {
            let vaddr = candidates[(start + i) % candidates.len()];
            let entry = space.lookup_mut(vaddr)?;
            if entry.accessed() {
                // The MMU sets this again on the next access that misses the TLB.
                *entry = entry.with_accessed(false);
                continue;
            }

            self.hand = vaddr + PAGE_FRAME_SIZE;
            log::trace!("clock selected {vaddr:#X}");
            return Some(vaddr);
        }

        None
    }
}
