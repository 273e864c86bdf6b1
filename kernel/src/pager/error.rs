use crate::block::BlockError;
use thiserror::Error;

/// A page table entry or swap run found in a state the operation cannot have
/// been invoked on. These indicate corruption elsewhere and are never
/// recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("page fault on {vaddr:#X}, which is already present")]
    AlreadyPresent { vaddr: usize },
    #[error("cannot evict {vaddr:#X}: page is not resident")]
    EvictNotPresent { vaddr: usize },
    #[error("cannot restore {vaddr:#X}: page is not swapped")]
    RestoreNotSwapped { vaddr: usize },
    #[error("entry {raw:#010X} is both present and swapped")]
    PresentAndSwapped { raw: u32 },
    #[error("victim {vaddr:#X} is the page being resolved")]
    SelfEviction { vaddr: usize },
    #[error("swap run #{run} is not in use")]
    RunNotInUse { run: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PagingError {
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("out of physical frames")]
    FrameExhausted,
    #[error("out of swap space")]
    SwapExhausted,
    #[error("swap I/O failed: {0}")]
    Block(#[from] BlockError),
}

impl PagingError {
    /// Only frame exhaustion has a recovery path, and only once per fault:
    /// evict a page and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn messages_carry_the_address() {
        let err = PagingError::from(InvariantViolation::AlreadyPresent { vaddr: 0x4000 });
        assert_eq!(
            err.to_string(),
            "invariant violation: page fault on 0x4000, which is already present"
        );
        assert_eq!(
            InvariantViolation::PresentAndSwapped { raw: 0x201 }.to_string(),
            "entry 0x00000201 is both present and swapped"
        );
    }

    #[test]
    fn only_frame_exhaustion_is_recoverable() {
        assert!(PagingError::FrameExhausted.is_recoverable());
        assert!(!PagingError::SwapExhausted.is_recoverable());
        assert!(!PagingError::Block(BlockError::ReadError).is_recoverable());
        assert!(!PagingError::from(InvariantViolation::RunNotInUse { run: 1 }).is_recoverable());
    }
}
