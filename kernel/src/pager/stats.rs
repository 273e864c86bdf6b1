use core::sync::atomic::{AtomicUsize, Ordering};

/// Running totals of the work the pager has done.
#[derive(Debug, Default)]
pub struct PagerStats {
    zero_fills: AtomicUsize,
    swap_outs: AtomicUsize,
    swap_ins: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagerStatistics {
    pub zero_fills: usize,
    pub swap_outs: usize,
    pub swap_ins: usize,
}

impl PagerStats {
    pub const fn new() -> Self {
        Self {
            zero_fills: AtomicUsize::new(0),
            swap_outs: AtomicUsize::new(0),
            swap_ins: AtomicUsize::new(0),
        }
    }

    pub(super) fn record_zero_fill(&self) {
        self.zero_fills.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_swap_out(&self) {
        self.swap_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_swap_in(&self) {
        self.swap_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PagerStatistics {
        PagerStatistics {
            zero_fills: self.zero_fills.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
            swap_ins: self.swap_ins.load(Ordering::Relaxed),
        }
    }
}
