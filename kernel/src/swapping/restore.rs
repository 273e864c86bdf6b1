use crate::{
    mem::{Frame, FrameAllocator},
    pager::{InvariantViolation, PagingError},
    paging::{AddressSpace, Pte, TranslationCache},
    swapping::SwapStore,
};

/// Reads the swapped page at `vaddr` into `frame`, maps it with its original
/// permissions and releases the swap run.
///
/// `frame` must be freshly allocated and unmapped. The entry only becomes
/// present after the read completes; on error it is left swapped and the
/// frame is still the caller's.
pub fn swap_in<F, S, T>(
    space: &mut AddressSpace,
    vaddr: usize,
    frame: Frame,
    frames: &F,
    swap: &S,
    tlb: &T,
) -> Result<(), PagingError>
where
    F: FrameAllocator + ?Sized,
    S: SwapStore + ?Sized,
    T: TranslationCache + ?Sized,
{
    let not_swapped = InvariantViolation::RestoreNotSwapped { vaddr };
    let entry = space.lookup_mut(vaddr).ok_or(not_swapped)?;
    let Pte::Swapped { run, permissions } = Pte::decode(*entry)? else {
        return Err(not_swapped.into());
    };

    // SAFETY: Nothing maps `frame` yet.
    let contents = unsafe { frames.frame_memory(frame).as_mut() };
    swap.read_page(run, contents)?;
    swap.free_run(run)?;

    *entry = Pte::Frame { frame, permissions }.encode();
    tlb.invalidate(vaddr);

    log::debug!(
        "swapped in {vaddr:#X} from run {run} to frame {:#X}",
        frame.number()
    );
    Ok(())
}
