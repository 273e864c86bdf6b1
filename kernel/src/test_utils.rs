use crate::{
    block::{Block, BlockError, BlockOp, BlockSector, BlockType},
    drivers::ram_disk::RamDisk,
    interrupts::FaultAddressRegister,
    mem::{Frame, FrameAllocator, FramePool, PageFrame},
    paging::{AddressSpace, Pte, TranslationCache},
    swapping::{ClockEviction, SwapRun, SwapSpace},
    sync::Mutex,
    Pager,
};
use alloc::{boxed::Box, vec, vec::Vec};
use kidneyos_shared::mem::{PAGE_FRAME_SIZE, SECTORS_PER_PAGE};

pub const BASE_FRAME: Frame = Frame::new(0x100);

pub type TestPager = Pager<FramePool, SwapSpace, ClockEviction, RecordingTlb>;

/// Leaks `frames` zeroed page frames for a test pool to own.
pub fn frame_region(frames: usize) -> &'static mut [PageFrame] {
    Box::leak(vec![PageFrame::ZERO; frames].into_boxed_slice())
}

pub fn swap_space(sectors: BlockSector, start: BlockSector) -> SwapSpace {
    SwapSpace::new(
        Block::new("swap", BlockType::Swap, sectors, Box::new(RamDisk::new(sectors))),
        start,
    )
}

/// A pager with `frames` frames and room for `runs` swapped pages.
pub fn pager(frames: usize, runs: u32) -> TestPager {
    pager_on(frames, swap_space(runs * SECTORS_PER_PAGE, 0))
}

pub fn pager_on(frames: usize, swap: SwapSpace) -> TestPager {
    Pager::new(
        FramePool::from_region(frame_region(frames), BASE_FRAME),
        swap,
        ClockEviction::new(),
        RecordingTlb::default(),
    )
}

/// Remembers every invalidated address, in order.
#[derive(Default)]
pub struct RecordingTlb {
    invalidated: Mutex<Vec<usize>>,
}

impl RecordingTlb {
    pub fn invalidated(&self) -> Vec<usize> {
        self.invalidated.lock().clone()
    }
}

impl TranslationCache for RecordingTlb {
    fn invalidate(&self, vaddr: usize) {
        self.invalidated.lock().push(vaddr);
    }
}

pub struct FixedAddress(pub usize);

impl FaultAddressRegister for FixedAddress {
    fn read(&self) -> usize {
        self.0
    }
}

/// A RAM disk whose reads or writes can be made to fail.
pub struct FaultyDisk {
    inner: RamDisk,
    fail_reads: bool,
    fail_writes: bool,
}

impl FaultyDisk {
    pub fn swap(sectors: BlockSector, fail_reads: bool, fail_writes: bool) -> SwapSpace {
        let disk = Self {
            inner: RamDisk::new(sectors),
            fail_reads,
            fail_writes,
        };
        SwapSpace::new(
            Block::new("faulty", BlockType::Swap, sectors, Box::new(disk)),
            0,
        )
    }
}

impl BlockOp for FaultyDisk {
    fn read(&mut self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        if self.fail_reads {
            return Err(BlockError::ReadError);
        }
        self.inner.read(sector, buf)
    }

    fn write(&mut self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        if self.fail_writes {
            return Err(BlockError::WriteError);
        }
        self.inner.write(sector, buf)
    }
}

pub fn resident_frame(space: &AddressSpace, vaddr: usize) -> Option<Frame> {
    match Pte::decode(space.lookup(vaddr)?) {
        Ok(Pte::Frame { frame, .. }) => Some(frame),
        _ => None,
    }
}

pub fn swapped_run(space: &AddressSpace, vaddr: usize) -> Option<SwapRun> {
    match Pte::decode(space.lookup(vaddr)?) {
        Ok(Pte::Swapped { run, .. }) => Some(run),
        _ => None,
    }
}

/// The contents of the resident page at `vaddr`. Only valid while `space`
/// stays locked by the caller.
pub fn page<'a>(pager: &'a TestPager, space: &AddressSpace, vaddr: usize) -> &'a mut [u8; PAGE_FRAME_SIZE] {
    let frame = resident_frame(space, vaddr).expect("page is not resident");
    // SAFETY: Tests only touch a page while holding its address space.
    unsafe { pager.frames().frame_memory(frame).as_mut() }
}
