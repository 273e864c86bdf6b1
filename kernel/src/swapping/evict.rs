use super::{SwapRun, SwapStore};
use crate::{
    mem::FrameAllocator,
    pager::{InvariantViolation, PagingError},
    paging::{AddressSpace, Pte, TranslationCache},
};

/// Moves the resident page at `vaddr` out to a fresh swap run and frees its
/// frame.
///
/// The entry is rewritten to swapped and its translation dropped before the
/// contents are copied, so no access can slip in during the copy and nothing
/// can reach the frame once it is back in the pool. The caller must hold
/// `space` exclusively for the duration, I/O included.
pub fn swap_out<F, S, T>(
    space: &mut AddressSpace,
    vaddr: usize,
    frames: &F,
    swap: &S,
    tlb: &T,
) -> Result<SwapRun, PagingError>
where
    F: FrameAllocator + ?Sized,
    S: SwapStore + ?Sized,
    T: TranslationCache + ?Sized,
{
    let not_present = InvariantViolation::EvictNotPresent { vaddr };
    let entry = space.lookup_mut(vaddr).ok_or(not_present)?;
    let resident = Pte::decode(*entry)?;
    let Pte::Frame { frame, permissions } = resident else {
        return Err(not_present.into());
    };

    let run = swap.allocate_run().ok_or(PagingError::SwapExhausted)?;
    *entry = Pte::Swapped { run, permissions }.encode();
    tlb.invalidate(vaddr);

    // SAFETY: The frame is no longer mapped, and it goes back to the pool only
    // after this copy.
    let contents = unsafe { frames.frame_memory(frame).as_ref() };
    if let Err(err) = swap.write_page(run, contents) {
        log::error!("swap-out of {vaddr:#X} to run {run} failed: {err}");
        if let Some(entry) = space.lookup_mut(vaddr) {
            *entry = resident.encode();
        }
        swap.free_run(run)?;
        return Err(err.into());
    }

    frames.free_frame(frame);
    log::debug!(
        "swapped out {vaddr:#X} from frame {:#X} to run {run}",
        frame.number()
    );
    Ok(run)
}
