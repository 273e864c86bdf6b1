mod evict;
pub mod page_replacement;
mod restore;

pub use evict::swap_out;
pub use page_replacement::{ClockEviction, PageReplacementPolicy};
pub use restore::swap_in;

use crate::{
    block::{Block, BlockError, BlockSector, BLOCK_SECTOR_SIZE},
    pager::InvariantViolation,
    sync::Mutex,
};
use alloc::{boxed::Box, vec};
use arbitrary_int::{u20, Number};
use core::fmt;
use kidneyos_shared::mem::{PAGE_FRAME_SIZE, SECTORS_PER_PAGE};

const BITMAP_WORD_BITS: u32 = u32::BITS;

/// A page-sized run of consecutive swap sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapRun(u32);

impl SwapRun {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SwapRun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Swap storage shared by every address space. Implementations serialize
/// their own operations; I/O calls may block.
pub trait SwapStore: Sync {
    /// Reserves a run for one page, or returns [`None`] when swap is full.
    fn allocate_run(&self) -> Option<SwapRun>;

    /// Releases a run so it can be reused.
    fn free_run(&self, run: SwapRun) -> Result<(), InvariantViolation>;

    fn write_page(&self, run: SwapRun, src: &[u8; PAGE_FRAME_SIZE]) -> Result<(), BlockError>;

    fn read_page(&self, run: SwapRun, dst: &mut [u8; PAGE_FRAME_SIZE]) -> Result<(), BlockError>;
}

struct SwapState {
    device: Block,
    start: BlockSector,
    bitmap: Box<[u32]>,
    runs: u32,
    runs_in_use: u32,
    /// Where the next-fit scan resumes.
    next: u32,
}

impl SwapState {
    fn is_allocated(&self, run: u32) -> bool {
        self.bitmap[(run / BITMAP_WORD_BITS) as usize] & (1 << (run % BITMAP_WORD_BITS)) != 0
    }

    fn set_allocated(&mut self, run: u32, allocated: bool) {
        let word = &mut self.bitmap[(run / BITMAP_WORD_BITS) as usize];
        let mask = 1 << (run % BITMAP_WORD_BITS);
        if allocated {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    fn first_sector(&self, run: SwapRun) -> BlockSector {
        debug_assert!(self.is_allocated(run.id()), "I/O on free swap run {run}");
        self.start + run.id() * SECTORS_PER_PAGE
    }
}

/// Swap space carved out of a block device, starting at a given sector. Run
/// `k` occupies sectors `start + 8k` through `start + 8k + 7`.
pub struct SwapSpace {
    state: Mutex<SwapState>,
}

impl SwapSpace {
    pub fn new(device: Block, start: BlockSector) -> Self {
        let sectors = device.get_size().saturating_sub(start);
        // Run ids have to fit in the address bits of a page table entry.
        let runs = (sectors / SECTORS_PER_PAGE).min(u20::MAX.value() + 1);
        let words = runs.div_ceil(BITMAP_WORD_BITS) as usize;

        log::info!(
            "swap on {}: {} runs from sector {}",
            device.get_name(),
            runs,
            start
        );

        Self {
            state: Mutex::new(SwapState {
                device,
                start,
                bitmap: vec![0; words].into_boxed_slice(),
                runs,
                runs_in_use: 0,
                next: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().runs as usize
    }

    pub fn runs_in_use(&self) -> usize {
        self.state.lock().runs_in_use as usize
    }

    pub fn is_allocated(&self, run: SwapRun) -> bool {
        let state = self.state.lock();
        run.id() < state.runs && state.is_allocated(run.id())
    }
}

impl SwapStore for SwapSpace {
    fn allocate_run(&self) -> Option<SwapRun> {
        let mut state = self.state.lock();
        let runs = state.runs;
        let run = (0..runs)
            .map(|i| (state.next + i) % runs)
            .find(|&run| !state.is_allocated(run))?;

        state.set_allocated(run, true);
        state.runs_in_use += 1;
        state.next = (run + 1) % runs;
        Some(SwapRun::new(run))
    }

    fn free_run(&self, run: SwapRun) -> Result<(), InvariantViolation> {
        let mut state = self.state.lock();
        if run.id() >= state.runs || !state.is_allocated(run.id()) {
            return Err(InvariantViolation::RunNotInUse { run: run.id() });
        }

        state.set_allocated(run.id(), false);
        state.runs_in_use -= 1;
        Ok(())
    }

    fn write_page(&self, run: SwapRun, src: &[u8; PAGE_FRAME_SIZE]) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        let first = state.first_sector(run);
        for (sector, chunk) in (first..).zip(src.chunks_exact(BLOCK_SECTOR_SIZE)) {
            state.device.write(sector, chunk)?;
        }
        Ok(())
    }

    fn read_page(&self, run: SwapRun, dst: &mut [u8; PAGE_FRAME_SIZE]) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        let first = state.first_sector(run);
        for (sector, chunk) in (first..).zip(dst.chunks_exact_mut(BLOCK_SECTOR_SIZE)) {
            state.device.read(sector, chunk)?;
        }
        Ok(())
    }
}
