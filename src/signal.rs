use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag raised when the user presses Ctrl-C while a command runs.
pub type InterruptFlag = Arc<AtomicBool>;

/// Install the process-wide Ctrl-C handler; it only raises `flag`.
///
/// The dispatch loop polls the flag while it waits on children.
pub fn install_interrupt_handler(flag: InterruptFlag) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
}

pub fn is_interrupted(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

pub fn clear_interrupted(flag: &AtomicBool) {
    flag.store(false, Ordering::SeqCst);
}
