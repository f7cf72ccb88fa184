//! Biometric verifiers
//!
//! The matching algorithm is pluggable. `ThresholdVerifier` is the
//! reference placeholder (range checks against an enrolled profile, no
//! cryptographic strength); `ScriptedVerifier` returns a fixed sequence of
//! verdicts for tests and simulation.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::collector::SampleWindow;

/// Maximum number of enrolled users
pub const MAX_USERS: usize = 16;

/// Result of a verification attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
    /// Not enough samples yet; ask again later
    Insufficient,
}

/// Decides whether the collected samples belong to `user_id`.
pub trait BiometricVerifier {
    fn verify(&mut self, user_id: u32, window: &SampleWindow) -> Verdict;
}

/// Enrollment errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnrollError {
    #[error("profile table full")]
    ProfilesFull,
    #[error("user {0} already enrolled")]
    AlreadyEnrolled(u32),
}

/// Enrolled biometric profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrolledProfile {
    pub user_id: u32,
    /// Accepted mean heart rate, inclusive (bpm)
    pub heart_rate_min: f32,
    pub heart_rate_max: f32,
    /// Lowest accepted mean HRV score
    pub hrv_score_min: f32,
    /// HRV samples required before a decision
    pub min_samples: usize,
}

impl Default for EnrolledProfile {
    fn default() -> Self {
        Self {
            user_id: 1,
            heart_rate_min: 50.0,
            heart_rate_max: 100.0,
            hrv_score_min: 0.5,
            min_samples: 1,
        }
    }
}

impl EnrolledProfile {
    fn judge(&self, window: &SampleWindow) -> Verdict {
        if window.hrv().len() < self.min_samples.max(1) {
            return Verdict::Insufficient;
        }
        match window.hrv_means() {
            Some((hr, score))
                if hr >= self.heart_rate_min
                    && hr <= self.heart_rate_max
                    && score >= self.hrv_score_min =>
            {
                Verdict::Accept
            }
            _ => Verdict::Reject,
        }
    }
}

/// Range-check verifier over enrolled profiles
#[derive(Clone, Debug, Default)]
pub struct ThresholdVerifier {
    profiles: Vec<EnrolledProfile>,
}

impl ThresholdVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a profile (at most `MAX_USERS`, one per user).
    pub fn enroll(&mut self, profile: EnrolledProfile) -> Result<(), EnrollError> {
        if self.profiles.iter().any(|p| p.user_id == profile.user_id) {
            return Err(EnrollError::AlreadyEnrolled(profile.user_id));
        }
        if self.profiles.len() >= MAX_USERS {
            return Err(EnrollError::ProfilesFull);
        }
        self.profiles.push(profile);
        Ok(())
    }

    pub fn profile(&self, user_id: u32) -> Option<&EnrolledProfile> {
        self.profiles.iter().find(|p| p.user_id == user_id)
    }
}

impl BiometricVerifier for ThresholdVerifier {
    fn verify(&mut self, user_id: u32, window: &SampleWindow) -> Verdict {
        match self.profile(user_id) {
            Some(profile) => profile.judge(window),
            None => Verdict::Reject,
        }
    }
}

/// Verifier returning scripted verdicts in order, then `fallback`.
#[derive(Clone, Debug)]
pub struct ScriptedVerifier {
    script: VecDeque<Verdict>,
    fallback: Verdict,
}

impl ScriptedVerifier {
    pub fn new(script: impl IntoIterator<Item = Verdict>, fallback: Verdict) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback,
        }
    }

    /// Always accept
    pub fn accept() -> Self {
        Self::new([], Verdict::Accept)
    }

    /// Always reject
    pub fn reject() -> Self {
        Self::new([], Verdict::Reject)
    }
}

impl BiometricVerifier for ScriptedVerifier {
    fn verify(&mut self, _user_id: u32, _window: &SampleWindow) -> Verdict {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_ipc::HrvSample;

    fn window_with(hr: f32, score: f32, n: usize) -> SampleWindow {
        let mut w = SampleWindow::default();
        for i in 0..n {
            w.push_hrv(HrvSample {
                timestamp: i as u32,
                heart_rate: hr,
                hrv_score: score,
                stress_level: 0.3,
            });
        }
        w
    }

    #[test]
    fn test_threshold_accepts_resting_sample() {
        let mut v = ThresholdVerifier::new();
        v.enroll(EnrolledProfile::default()).unwrap();
        assert_eq!(v.verify(1, &window_with(72.0, 0.8, 1)), Verdict::Accept);
    }

    #[test]
    fn test_threshold_rejects() {
        let mut v = ThresholdVerifier::new();
        v.enroll(EnrolledProfile {
            min_samples: 3,
            ..EnrolledProfile::default()
        })
        .unwrap();
        // Not enough samples yet
        assert_eq!(v.verify(1, &window_with(72.0, 0.8, 2)), Verdict::Insufficient);
        // Out of range
        assert_eq!(v.verify(1, &window_with(140.0, 0.8, 3)), Verdict::Reject);
        assert_eq!(v.verify(1, &window_with(72.0, 0.1, 3)), Verdict::Reject);
        // Unknown user
        assert_eq!(v.verify(2, &window_with(72.0, 0.8, 3)), Verdict::Reject);
    }

    #[test]
    fn test_enroll_limits() {
        let mut v = ThresholdVerifier::new();
        for id in 0..MAX_USERS as u32 {
            v.enroll(EnrolledProfile {
                user_id: id,
                ..EnrolledProfile::default()
            })
            .unwrap();
        }
        assert_eq!(
            v.enroll(EnrolledProfile {
                user_id: 3,
                ..EnrolledProfile::default()
            }),
            Err(EnrollError::AlreadyEnrolled(3))
        );
        assert_eq!(
            v.enroll(EnrolledProfile {
                user_id: 99,
                ..EnrolledProfile::default()
            }),
            Err(EnrollError::ProfilesFull)
        );
    }

    #[test]
    fn test_scripted_sequence_then_fallback() {
        let mut v = ScriptedVerifier::new([Verdict::Reject, Verdict::Accept], Verdict::Reject);
        let w = SampleWindow::default();
        assert_eq!(v.verify(1, &w), Verdict::Reject);
        assert_eq!(v.verify(1, &w), Verdict::Accept);
        assert_eq!(v.verify(1, &w), Verdict::Reject);
    }
}
