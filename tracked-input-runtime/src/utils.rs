use std::panic;

use crate::context::{TrackedInputContext, TRACKED_INPUT};

/// Helper function to safely execute code that might panic
pub fn execute_safely<F>(func_name: &str, f: F) -> i32
where
    F: FnOnce() -> i32 + panic::UnwindSafe,
{
    match panic::catch_unwind(f) {
        Ok(result) => result,
        Err(e) => {
            log::error!("Panic in {}: {:?}", func_name, e);
            0
        }
    }
}

/// Runs `f` against the process-level context, or returns `default` when it
/// is missing or poisoned.
pub fn with_context<F, R>(f: F, default: R) -> R
where
    F: FnOnce(&mut TrackedInputContext) -> R,
{
    let Some(context) = TRACKED_INPUT.get() else {
        log::error!("Tracked input not initialized");
        return default;
    };
    match context.lock() {
        Ok(mut context) => f(&mut context),
        Err(e) => {
            log::error!("Failed to lock tracked input context: {}", e);
            default
        }
    }
}

/// Borrows a host-owned command buffer.
///
/// # Safety
/// `ptr` must be null or valid for reads and writes of `len` bytes for the
/// duration of the call.
pub unsafe fn host_bytes<'a>(ptr: *mut u8, len: usize) -> Option<&'a mut [u8]> {
    if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts_mut(ptr, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_context_yields_default() {
        assert_eq!(with_context(|_| 1, -1), -1);
    }

    #[test]
    fn panics_become_zero_status() {
        assert_eq!(execute_safely("test", || panic!("boom")), 0);
        assert_eq!(execute_safely("test", || 7), 7);
    }
}
