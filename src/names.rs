//! Process-wide auto-naming for unnamed fields and forms.

use std::sync::atomic::{AtomicU64, Ordering};

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next generated name for `prefix`, e.g. `field#3`
pub(crate) fn auto_name(prefix: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}#{n}")
}

/// Restart generated names from zero
///
/// Names only label cells in logs; resetting between test runs keeps those
/// labels stable.
pub fn reset_name_counter() {
    NAME_COUNTER.store(0, Ordering::Relaxed);
}
