pub mod frame_allocator;

pub use frame_allocator::FramePool;

use core::ptr::NonNull;
use kidneyos_shared::mem::PAGE_FRAME_SIZE;

/// A physical frame, identified by its frame number (physical address divided
/// by [`PAGE_FRAME_SIZE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frame(u32);

impl Frame {
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u32 {
        self.0
    }

    pub const fn address(self) -> usize {
        self.0 as usize * PAGE_FRAME_SIZE
    }
}

/// The storage of one frame, for carving frame pools out of memory.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageFrame(pub [u8; PAGE_FRAME_SIZE]);

impl PageFrame {
    pub const ZERO: Self = Self([0; PAGE_FRAME_SIZE]);
}

/// The physical frame pool, shared by every address space. Implementations
/// serialize their own allocate and free operations.
pub trait FrameAllocator: Sync {
    /// Allocates a single frame, or returns [`None`] when every frame is in use.
    fn allocate_frame(&self) -> Option<Frame>;

    /// Returns `frame` to the pool. The frame must not be reachable through any
    /// live mapping or cached translation.
    fn free_frame(&self, frame: Frame);

    /// The kernel's view of `frame`'s contents.
    ///
    /// Dereferencing the pointer is only sound for whoever currently owns the
    /// frame: the page table entry mapping it, under its address space's lock,
    /// or the caller that has just allocated it.
    fn frame_memory(&self, frame: Frame) -> NonNull<[u8; PAGE_FRAME_SIZE]>;
}
