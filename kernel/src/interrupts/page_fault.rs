use crate::{
    mem::FrameAllocator,
    pager::{InvariantViolation, Pager, PagingError},
    paging::{SharedAddressSpace, TranslationCache},
    swapping::{PageReplacementPolicy, SwapStore},
};
use kidneyos_shared::mem::page_round_down;

/// Where the faulting address comes from.
pub trait FaultAddressRegister {
    fn read(&self) -> usize;
}

/// The x86 page fault linear address register.
#[cfg(target_arch = "x86")]
pub struct Cr2;

#[cfg(target_arch = "x86")]
impl FaultAddressRegister for Cr2 {
    fn read(&self) -> usize {
        let vaddr: usize;
        // SAFETY: Reading cr2 has no side effects.
        unsafe {
            core::arch::asm!("mov {}, cr2", out(reg) vaddr, options(nomem, nostack, preserves_flags));
        }
        vaddr
    }
}

/// Page fault entry for the running process. Called from the trap stub
/// before interrupts are enabled again, since the fault is captured first.
#[cfg(target_arch = "x86")]
pub fn handle_page_fault<F, S, P, T>(pager: &Pager<F, S, P, T>, space: &SharedAddressSpace)
where
    F: FrameAllocator,
    S: SwapStore,
    P: PageReplacementPolicy,
    T: TranslationCache,
{
    fault_entry(pager, space, &Cr2);
}

/// A page fault as it was taken: the faulting page, and how many pages of the
/// address space had been resolved at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    vaddr: usize,
    seen: usize,
}

impl PageFault {
    /// Records the fault reported by `register`. The count is sampled before
    /// the register is read, so nothing resolved after the fault was raised
    /// can be mistaken for having happened before it.
    pub fn capture<R>(space: &SharedAddressSpace, register: &R) -> Self
    where
        R: FaultAddressRegister + ?Sized,
    {
        let seen = space.resolutions();
        Self {
            vaddr: page_round_down(register.read()),
            seen,
        }
    }

    /// Makes the faulting page resident, or panics if it cannot be.
    ///
    /// `space` stays locked for the whole resolution, swap I/O included. A
    /// page that is already present means another context resolved it while
    /// this fault waited, but only if the count moved since the capture;
    /// otherwise it is a duplicate fault and fatal.
    pub fn resolve<F, S, P, T>(self, pager: &Pager<F, S, P, T>, space: &SharedAddressSpace)
    where
        F: FrameAllocator,
        S: SwapStore,
        P: PageReplacementPolicy,
        T: TranslationCache,
    {
        let vaddr = self.vaddr;
        let mut guard = space.lock();
        match pager.map_address(&mut guard, vaddr) {
            Ok(()) => space.record_resolution(),
            Err(PagingError::Invariant(InvariantViolation::AlreadyPresent { .. }))
                if space.resolutions() != self.seen =>
            {
                log::trace!("fault on {vaddr:#X} was resolved while waiting");
            }
            Err(err) => panic!("unresolvable page fault at {vaddr:#X}: {err}"),
        }
    }
}

/// Resolves the fault reported by `register` in `space`. Returns once the
/// page is resident, so the faulting instruction can be restarted; panics if
/// it cannot be resolved.
pub fn fault_entry<F, S, P, T, R>(pager: &Pager<F, S, P, T>, space: &SharedAddressSpace, register: &R)
where
    F: FrameAllocator,
    S: SwapStore,
    P: PageReplacementPolicy,
    T: TranslationCache,
    R: FaultAddressRegister + ?Sized,
{
    PageFault::capture(space, register).resolve(pager, space);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pager, resident_frame, FixedAddress};
    use std::{sync::Barrier, thread};

    /// Reports its address only after the test has let it through twice,
    /// holding the faulting context between sampling and locking.
    struct GatedAddress {
        vaddr: usize,
        gate: Barrier,
    }

    impl FaultAddressRegister for GatedAddress {
        fn read(&self) -> usize {
            self.gate.wait();
            self.gate.wait();
            self.vaddr
        }
    }

    #[test]
    fn masks_the_address_to_its_page() {
        let pager = pager(2, 2);
        let space = SharedAddressSpace::default();

        fault_entry(&pager, &space, &FixedAddress(0x0804_8ABC));

        assert!(resident_frame(&space.lock(), 0x0804_8000).is_some());
        assert_eq!(pager.tlb().invalidated(), [0x0804_8000]);
        assert_eq!(space.resolutions(), 1);
    }

    #[test]
    fn fault_resolved_by_another_context_meanwhile_returns() {
        let pager = pager(2, 2);
        let space = SharedAddressSpace::default();
        let late = GatedAddress {
            vaddr: 0x5008,
            gate: Barrier::new(2),
        };

        thread::scope(|scope| {
            let waiting = scope.spawn(|| fault_entry(&pager, &space, &late));
            // The waiting fault has sampled the count and is held before it
            // locks; resolve the same page from here and let it go.
            late.gate.wait();
            fault_entry(&pager, &space, &FixedAddress(0x5000));
            late.gate.wait();
            waiting.join().unwrap();
        });

        assert_eq!(pager.stats().zero_fills, 1);
        assert_eq!(space.resolutions(), 1);
        assert!(resident_frame(&space.lock(), 0x5000).is_some());
    }

    #[test]
    fn same_page_faults_from_many_contexts_resolve_once() {
        const CONTEXTS: usize = 4;
        let pager = pager(2, 2);
        let space = SharedAddressSpace::default();
        let raised = Barrier::new(CONTEXTS);

        thread::scope(|scope| {
            for _ in 0..CONTEXTS {
                scope.spawn(|| {
                    let fault = PageFault::capture(&space, &FixedAddress(0x7010));
                    // Every context has taken its fault before any resolves it.
                    raised.wait();
                    fault.resolve(&pager, &space);
                });
            }
        });

        assert_eq!(pager.stats().zero_fills, 1);
        assert_eq!(space.resolutions(), 1);
    }

    #[test]
    #[should_panic(expected = "which is already present")]
    fn duplicate_fault_with_nothing_resolved_meanwhile_is_fatal() {
        let pager = pager(2, 2);
        let space = SharedAddressSpace::default();
        fault_entry(&pager, &space, &FixedAddress(0x5000));
        fault_entry(&pager, &space, &FixedAddress(0x5004));
    }

    #[test]
    #[should_panic(expected = "out of physical frames")]
    fn exhaustion_with_nothing_to_evict_is_fatal() {
        let pager = pager(1, 2);
        let _held_elsewhere = pager.frames().allocate_frame().unwrap();
        let space = SharedAddressSpace::default();
        fault_entry(&pager, &space, &FixedAddress(0x5000));
    }
}
