//! Bounded retry for writes that meet a busy database.

use std::time::Duration;

use tutorlink_store::StoreError;

use crate::error::{CoreError, Result};

/// Run `f` until it succeeds, fails with something other than SQLite
/// BUSY/LOCKED, or has been attempted `attempts` times. Exhaustion is a
/// [`CoreError::Conflict`]. Backoff grows linearly from 10 ms.
pub(crate) fn on_busy<T>(
    attempts: u32,
    what: &str,
    mut f: impl FnMut() -> std::result::Result<T, StoreError>,
) -> Result<T> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_busy() => {
                tracing::warn!(operation = what, attempt, "database busy");
                if attempt < attempts {
                    std::thread::sleep(Duration::from_millis(u64::from(attempt) * 10));
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(CoreError::Conflict(format!(
        "{what}: database still busy after {attempts} attempts"
    )))
}
