/// The hardware cache of virtual-to-physical translations.
pub trait TranslationCache {
    /// Drops any cached translation for the page containing `vaddr`.
    fn invalidate(&self, vaddr: usize);
}

/// Invalidates with `invlpg`, which only affects the executing CPU. That is
/// enough while the kernel runs on a single core.
#[cfg(target_arch = "x86")]
pub struct Invlpg;

#[cfg(target_arch = "x86")]
impl TranslationCache for Invlpg {
    fn invalidate(&self, vaddr: usize) {
        // SAFETY: invlpg has no effect beyond the TLB.
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) vaddr, options(nostack, preserves_flags));
        }
    }
}
