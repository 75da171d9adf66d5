use crate::error::{VfsError, VfsResult};

use std::fmt;

/// Lowest accepted job priority.
pub const PRIORITY_MIN: i32 = -10;

/// Highest accepted job priority.
pub const PRIORITY_MAX: i32 = 10;

/// Priority used when the caller has no preference.
pub const PRIORITY_DEFAULT: i32 = 0;

/// Opaque identifier of a live job.
///
/// Handles are process-unique and strictly increasing in creation order.
/// They stay valid from the call that created the job until its terminal
/// operation completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value of the handle.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejects priorities outside `PRIORITY_MIN..=PRIORITY_MAX`.
pub(crate) fn validate_priority(priority: i32) -> VfsResult<()> {
    if (PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        Ok(())
    } else {
        Err(VfsError::BadParameters(format!(
            "priority {priority} outside {PRIORITY_MIN}..={PRIORITY_MAX}"
        )))
    }
}
