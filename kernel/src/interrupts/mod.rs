pub mod page_fault;

pub use page_fault::{fault_entry, FaultAddressRegister, PageFault};
