//! AeroDesk Service Programs
//!
//! The user processes the boot sequence starts:
//!
//! | Program | Process | Talks over |
//! |---------|---------|------------|
//! | `AuthService` | `auth_service` | receive Verify-Request, send on channel 1 |
//! | `HrvPublisher` | `hrv_sensor` | publish `heart_rate` |
//! | `EegPublisher` | `eeg_sensor` | publish `eeg_data` |
//! | `DesktopShell` | `desktop_shell` | subscribe `auth_success` |
//!
//! Sensor samples reach the authentication service through a
//! `SampleCollector` subscriber feeding a shared `SampleWindow`; the
//! decision itself is delegated to a `BiometricVerifier`.

#![no_std]
extern crate alloc;

pub mod auth;
pub mod collector;
pub mod desktop;
pub mod sensors;
pub mod verifier;

pub use auth::{session_token, AuthService, DEFAULT_RECHECK_TICKS};
pub use collector::{SampleCollector, SampleWindow, SharedWindow, DEFAULT_WINDOW_CAPACITY};
pub use desktop::{DesktopShell, SessionListener, SessionUser};
pub use sensors::{
    EegPublisher, HrvPublisher, Resting, SampleSource, ScriptedSource, SensorPublisher,
    SensorSample,
};
pub use verifier::{
    BiometricVerifier, EnrollError, EnrolledProfile, ScriptedVerifier, ThresholdVerifier, Verdict,
    MAX_USERS,
};
