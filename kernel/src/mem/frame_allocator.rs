use super::{Frame, FrameAllocator, PageFrame};
use crate::sync::Mutex;
use alloc::{boxed::Box, vec};
use arbitrary_int::{u20, Number};
use bitbybit::bitfield;
use core::ptr::NonNull;
use kidneyos_shared::mem::PAGE_FRAME_SIZE;

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
}

struct CoreMap {
    entries: Box<[CoreMapEntry]>,
    /// Where the next-fit scan resumes.
    position: usize,
    frames_allocated: usize,
}

impl CoreMap {
    fn next_fit(&self) -> Option<usize> {
        let len = self.entries.len();
        (0..len)
            .map(|i| (self.position + i) % len)
            .find(|&i| !self.entries[i].allocated())
    }
}

/// A pool of contiguous frames tracked by a core map.
pub struct FramePool {
    start: NonNull<PageFrame>,
    base: Frame,
    core_map: Mutex<CoreMap>,
}

// SAFETY: The region behind `start` is owned by the pool, and all bookkeeping is
// behind the core map's mutex.
unsafe impl Send for FramePool {}
unsafe impl Sync for FramePool {}

impl FramePool {
    /// Creates a pool over `frames` frames starting at `start`, the first of
    /// which has frame number `base`.
    ///
    /// # Safety
    ///
    /// `start` must point to `frames` page frames that nothing else uses for
    /// as long as the pool exists.
    pub unsafe fn new_in(start: NonNull<PageFrame>, base: Frame, frames: usize) -> Self {
        assert!(frames > 0, "frame pool must not be empty");
        assert!(
            base.number() as usize + frames <= u20::MAX.value() as usize + 1,
            "frame numbers must fit in a page table entry"
        );

        Self {
            start,
            base,
            core_map: Mutex::new(CoreMap {
                entries: vec![CoreMapEntry::DEFAULT; frames].into_boxed_slice(),
                position: 0,
                frames_allocated: 0,
            }),
        }
    }

    /// Creates a pool over a region the kernel has set aside for good.
    pub fn from_region(region: &'static mut [PageFrame], base: Frame) -> Self {
        let frames = region.len();
        // SAFETY: The exclusive 'static borrow gives the pool sole use of the region.
        unsafe { Self::new_in(NonNull::from(region).cast(), base, frames) }
    }

    pub fn capacity(&self) -> usize {
        self.core_map.lock().entries.len()
    }

    pub fn free_frames(&self) -> usize {
        let core_map = self.core_map.lock();
        core_map.entries.len() - core_map.frames_allocated
    }

    fn index_of(&self, frame: Frame, len: usize) -> usize {
        let index = frame
            .number()
            .checked_sub(self.base.number())
            .map(|i| i as usize)
            .filter(|&i| i < len);
        match index {
            Some(index) => index,
            None => panic!("frame {:#X} does not belong to this pool", frame.number()),
        }
    }
}

impl FrameAllocator for FramePool {
    fn allocate_frame(&self) -> Option<Frame> {
        let mut core_map = self.core_map.lock();
        let index = core_map.next_fit()?;

        core_map.entries[index] = core_map.entries[index].with_allocated(true);
        core_map.position = index + 1;
        core_map.frames_allocated += 1;

        Some(Frame::new(self.base.number() + index as u32))
    }

    fn free_frame(&self, frame: Frame) {
        let mut core_map = self.core_map.lock();
        let index = self.index_of(frame, core_map.entries.len());

        assert!(
            core_map.entries[index].allocated(),
            "frame {:#X} freed while not allocated",
            frame.number()
        );
        core_map.entries[index] = core_map.entries[index].with_allocated(false);
        core_map.frames_allocated -= 1;
    }

    fn frame_memory(&self, frame: Frame) -> NonNull<[u8; PAGE_FRAME_SIZE]> {
        let index = self.index_of(frame, self.capacity());
        // SAFETY: `index` is within the region handed to `new_in`.
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(index)) }.cast()
    }
}
