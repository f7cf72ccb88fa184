//! Desktop admission flag
//!
//! The one piece of process-wide state the gate exposes: set once when the
//! gate reaches `DesktopAdmitted`, read-only afterwards. Other code learns
//! about admission only by reading it.

use spin::Once;

/// Record of the admission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub user_id: u32,
    /// Tick at which the desktop was admitted
    pub tick: u64,
}

/// Set-once admission flag
pub struct AdmissionFlag {
    inner: Once<Admission>,
}

impl AdmissionFlag {
    pub const fn new() -> Self {
        Self { inner: Once::new() }
    }

    /// Set the flag. Returns `false` if it was already set; the first
    /// admission is kept.
    pub fn admit(&self, user_id: u32, tick: u64) -> bool {
        let mut set = false;
        self.inner.call_once(|| {
            set = true;
            Admission { user_id, tick }
        });
        set
    }

    pub fn is_admitted(&self) -> bool {
        self.inner.is_completed()
    }

    pub fn get(&self) -> Option<&Admission> {
        self.inner.get()
    }
}

impl Default for AdmissionFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide flag set once by the boot entry point (`aero-sim` on the host)
pub static ADMISSION: AdmissionFlag = AdmissionFlag::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_once() {
        let flag = AdmissionFlag::new();
        assert!(!flag.is_admitted());
        assert!(flag.admit(1, 50));
        assert!(!flag.admit(2, 60));
        assert_eq!(flag.get(), Some(&Admission { user_id: 1, tick: 50 }));
    }
}
