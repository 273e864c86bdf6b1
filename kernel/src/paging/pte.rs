use crate::{mem::Frame, pager::InvariantViolation, swapping::SwapRun};
use arbitrary_int::u20;
use kidneyos_shared::paging::PageTableEntry;

/// Access rights carried by a leaf entry, preserved across swap cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub writable: bool,
    pub user: bool,
}

impl Permissions {
    /// What a demand-zero user page gets.
    pub const USER_READ_WRITE: Self = Self {
        writable: true,
        user: true,
    };

    fn of(entry: PageTableEntry) -> Self {
        Self {
            writable: entry.read_write(),
            user: entry.user_supervisor(),
        }
    }

    fn apply(self, entry: PageTableEntry) -> PageTableEntry {
        entry
            .with_read_write(self.writable)
            .with_user_supervisor(self.user)
    }
}

/// The state of one virtual page. Raw entries overload their address bits
/// with either a frame number or a swap run; this type keeps the two apart,
/// and conversion only happens at the page table boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pte {
    Unmapped,
    Frame {
        frame: Frame,
        permissions: Permissions,
    },
    Swapped {
        run: SwapRun,
        permissions: Permissions,
    },
}

impl Pte {
    pub fn decode(entry: PageTableEntry) -> Result<Self, InvariantViolation> {
        let permissions = Permissions::of(entry);
        match (entry.present(), entry.swapped()) {
            (true, true) => Err(InvariantViolation::PresentAndSwapped {
                raw: entry.raw_value(),
            }),
            (true, false) => Ok(Self::Frame {
                frame: Frame::new(entry.page_frame_address().value()),
                permissions,
            }),
            (false, true) => Ok(Self::Swapped {
                run: SwapRun::new(entry.swap_run().value()),
                permissions,
            }),
            (false, false) => Ok(Self::Unmapped),
        }
    }

    pub fn encode(self) -> PageTableEntry {
        match self {
            Self::Unmapped => PageTableEntry::DEFAULT,
            Self::Frame { frame, permissions } => permissions
                .apply(PageTableEntry::DEFAULT)
                .with_present(true)
                .with_page_frame_address(u20::new(frame.number())),
            Self::Swapped { run, permissions } => permissions
                .apply(PageTableEntry::DEFAULT)
                .with_swapped(true)
                .with_swap_run(u20::new(run.id())),
        }
    }

    pub fn permissions(self) -> Option<Permissions> {
        match self {
            Self::Unmapped => None,
            Self::Frame { permissions, .. } | Self::Swapped { permissions, .. } => {
                Some(permissions)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_ONLY_USER: Permissions = Permissions {
        writable: false,
        user: true,
    };

    #[test]
    fn frame_encoding_sets_present_only() {
        let entry = Pte::Frame {
            frame: Frame::new(0x345),
            permissions: Permissions::USER_READ_WRITE,
        }
        .encode();

        assert!(entry.present());
        assert!(!entry.swapped());
        assert_eq!(entry.raw_value(), 0x345 << 12 | 0b111);
    }

    #[test]
    fn swapped_encoding_clears_present() {
        let entry = Pte::Swapped {
            run: SwapRun::new(7),
            permissions: READ_ONLY_USER,
        }
        .encode();

        assert!(!entry.present());
        assert!(entry.swapped());
        assert!(!entry.read_write());
        assert!(entry.user_supervisor());
        assert_eq!(entry.swap_run().value(), 7);
    }

    #[test]
    fn decoding_keeps_frames_and_runs_apart() {
        let raw = 0x0001_2000 | 1 << 2 | 1 << 1;
        let as_frame = PageTableEntry::new_with_raw_value(raw | 1);
        let as_swapped = PageTableEntry::new_with_raw_value(raw | 1 << 9);

        assert_eq!(
            Pte::decode(as_frame),
            Ok(Pte::Frame {
                frame: Frame::new(0x12),
                permissions: Permissions::USER_READ_WRITE,
            })
        );
        assert_eq!(
            Pte::decode(as_swapped),
            Ok(Pte::Swapped {
                run: SwapRun::new(0x12),
                permissions: Permissions::USER_READ_WRITE,
            })
        );
    }

    #[test]
    fn hardware_bits_do_not_affect_the_variant() {
        let entry = Pte::Frame {
            frame: Frame::new(3),
            permissions: READ_ONLY_USER,
        }
        .encode()
        .with_accessed(true)
        .with_dirty(true);

        assert_eq!(
            Pte::decode(entry),
            Ok(Pte::Frame {
                frame: Frame::new(3),
                permissions: READ_ONLY_USER,
            })
        );
    }

    #[test]
    fn present_and_swapped_together_is_rejected() {
        let entry = PageTableEntry::DEFAULT
            .with_present(true)
            .with_swapped(true);
        assert_eq!(
            Pte::decode(entry),
            Err(InvariantViolation::PresentAndSwapped { raw: 0x201 })
        );
    }

    #[test]
    fn zero_entry_is_unmapped() {
        assert_eq!(Pte::decode(PageTableEntry::DEFAULT), Ok(Pte::Unmapped));
        assert_eq!(Pte::Unmapped.encode().raw_value(), 0);
        assert_eq!(Pte::Unmapped.permissions(), None);
    }
}
