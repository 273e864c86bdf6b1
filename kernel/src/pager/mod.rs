//! Resolves page faults on user address spaces.
//!
//! A fault on a page nobody has touched gets a zeroed frame. A fault on a
//! swapped page reads it back into a fresh frame. When the frame pool is
//! empty, one resident page of the faulting address space is swapped out and
//! the allocation retried once.

mod error;
mod stats;

pub use error::{InvariantViolation, PagingError};
pub use stats::{PagerStatistics, PagerStats};

use crate::{
    mem::{Frame, FrameAllocator},
    paging::{AddressSpace, Permissions, Pte, TranslationCache},
    swapping::{swap_in, swap_out, PageReplacementPolicy, SwapRun, SwapStore},
    sync::Mutex,
};
use kidneyos_shared::mem::is_page_aligned;

/// The paging core, with the services it draws on injected.
pub struct Pager<F, S, P, T> {
    frames: F,
    swap: S,
    policy: Mutex<P>,
    tlb: T,
    stats: PagerStats,
}

impl<F, S, P, T> Pager<F, S, P, T>
where
    F: FrameAllocator,
    S: SwapStore,
    P: PageReplacementPolicy,
    T: TranslationCache,
{
    pub fn new(frames: F, swap: S, policy: P, tlb: T) -> Self {
        Self {
            frames,
            swap,
            policy: Mutex::new(policy),
            tlb,
            stats: PagerStats::new(),
        }
    }

    pub fn frames(&self) -> &F {
        &self.frames
    }

    pub fn swap(&self) -> &S {
        &self.swap
    }

    pub fn tlb(&self) -> &T {
        &self.tlb
    }

    pub fn stats(&self) -> PagerStatistics {
        self.stats.snapshot()
    }

    /// Makes the page at `vaddr` resident. The caller holds `space`
    /// exclusively, which serializes every fault, eviction and restore on it.
    ///
    /// Any address without an entry is treated as a first touch; whether the
    /// process may use it at all is decided elsewhere.
    pub fn map_address(&self, space: &mut AddressSpace, vaddr: usize) -> Result<(), PagingError> {
        debug_assert!(is_page_aligned(vaddr), "unaligned fault address {vaddr:#X}");

        let current = match space.lookup(vaddr) {
            Some(entry) => Pte::decode(entry)?,
            None => Pte::Unmapped,
        };

        match current {
            Pte::Frame { .. } => Err(InvariantViolation::AlreadyPresent { vaddr }.into()),
            Pte::Unmapped => self.zero_fill(space, vaddr),
            Pte::Swapped { .. } => self.restore(space, vaddr),
        }
    }

    /// Swaps out the resident page at `vaddr`.
    pub fn evict(&self, space: &mut AddressSpace, vaddr: usize) -> Result<SwapRun, PagingError> {
        let run = swap_out(space, vaddr, &self.frames, &self.swap, &self.tlb)?;
        self.stats.record_swap_out();
        Ok(run)
    }

    /// Gives back every frame and swap run `space` still holds, leaving those
    /// entries unmapped. Used when a process's address space is torn down.
    ///
    /// An entry that cannot be released is left as it is and the sweep goes
    /// on; the first such error is returned once every other entry is done.
    pub fn release(&self, space: &mut AddressSpace) -> Result<(), PagingError> {
        let mut frames_freed = 0;
        let mut runs_freed = 0;
        let mut first_error = None;

        for (vaddr, entry) in space.entries_mut() {
            let released = match Pte::decode(*entry) {
                Ok(Pte::Unmapped) => continue,
                Ok(Pte::Frame { frame, .. }) => {
                    // The translation goes before the frame does.
                    *entry = Pte::Unmapped.encode();
                    self.tlb.invalidate(vaddr);
                    self.frames.free_frame(frame);
                    frames_freed += 1;
                    Ok(())
                }
                Ok(Pte::Swapped { run, .. }) => self.swap.free_run(run).map(|()| {
                    *entry = Pte::Unmapped.encode();
                    runs_freed += 1;
                }),
                Err(err) => Err(err),
            };

            if let Err(err) = released {
                log::error!("cannot release {vaddr:#X}: {err}");
                first_error.get_or_insert(PagingError::from(err));
            }
        }

        log::debug!("released address space: {frames_freed} frames, {runs_freed} swap runs");
        first_error.map_or(Ok(()), Err)
    }

    fn zero_fill(&self, space: &mut AddressSpace, vaddr: usize) -> Result<(), PagingError> {
        let frame = self.allocate_frame(space, vaddr)?;
        // SAFETY: Nothing maps a frame that was just allocated.
        unsafe { self.frames.frame_memory(frame).as_mut() }.fill(0);

        *space.lookup_or_create(vaddr) = Pte::Frame {
            frame,
            permissions: Permissions::USER_READ_WRITE,
        }
        .encode();
        self.tlb.invalidate(vaddr);

        self.stats.record_zero_fill();
        log::trace!("zero-filled {vaddr:#X} with frame {:#X}", frame.number());
        Ok(())
    }

    fn restore(&self, space: &mut AddressSpace, vaddr: usize) -> Result<(), PagingError> {
        let frame = self.allocate_frame(space, vaddr)?;
        if let Err(err) = swap_in(space, vaddr, frame, &self.frames, &self.swap, &self.tlb) {
            self.frames.free_frame(frame);
            return Err(err);
        }

        self.stats.record_swap_in();
        Ok(())
    }

    /// Allocates a frame for the page at `in_flight`, evicting one other page
    /// of `space` if the pool is empty. A second failure is final.
    fn allocate_frame(&self, space: &mut AddressSpace, in_flight: usize) -> Result<Frame, PagingError> {
        match self.take_frame() {
            Err(err) if err.is_recoverable() => {}
            taken => return taken,
        }

        log::debug!("out of frames resolving {in_flight:#X}, evicting");
        let victim = self
            .policy
            .lock()
            .select_victim(space, in_flight)
            .ok_or(PagingError::FrameExhausted)?;
        if victim == in_flight {
            return Err(InvariantViolation::SelfEviction { vaddr: victim }.into());
        }
        self.evict(space, victim)?;

        self.take_frame().inspect_err(|_| {
            log::warn!("frame taken by another address space before retry for {in_flight:#X}");
        })
    }

    fn take_frame(&self) -> Result<Frame, PagingError> {
        self.frames.allocate_frame().ok_or(PagingError::FrameExhausted)
    }
}
