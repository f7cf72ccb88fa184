//! SAL Protocol Constants & Wire Formats for AeroDesk
//!
//! This crate defines:
//! - **Reserved identifiers** (idle/init/auth-service pids, the auth channel)
//! - **Message tags** carried in the SAL header
//! - **Topic names** used by the sensor publishers and the boot gate
//! - **Syscall numbers** of the SAL ABI
//! - **Wire codecs** for the message header, Authentication Message and
//!   biometric samples
//!
//! It is the single source of truth for these constants; the kernel,
//! services and init all import them from here.
//!
//! # Reserved Identifiers
//!
//! | Value | Kind    | Meaning                         |
//! |-------|---------|---------------------------------|
//! | 0     | pid     | Idle process                    |
//! | 1     | pid     | Init (runs the auth gate)       |
//! | 2     | pid     | Authentication service          |
//! | 1     | channel | Authentication channel          |
//!
//! Channel identifiers and pids share the 32-bit destination field. A
//! destination that names a reserved channel is routed to the channel's
//! bound listener, never to the process with the same number.
//!
//! # Message Tag Allocation
//!
//! | Range         | Use                               |
//! |---------------|-----------------------------------|
//! | 0x0001-0x000F | Kernel / system                   |
//! | 0x0100-0x010F | Authentication protocol           |
//! | 0x0200-0x020F | Sensor samples (topic payloads)   |
//!
//! # Wire Layout
//!
//! All integers are little-endian with no padding:
//!
//! ```text
//! Header (16 bytes):  sender u32 | destination u32 | tag u32 | length u32
//! Payload:            length bytes, at most MAX_MESSAGE_SIZE
//! ```

#![no_std]
extern crate alloc;

pub mod auth;
pub mod sensor;
pub mod wire;

pub use auth::{AuthKind, AuthMessage, AUTH_MESSAGE_SIZE};
pub use sensor::{EegSample, HrvSample, EEG_SAMPLE_SIZE, HRV_SAMPLE_SIZE};
pub use wire::{decode_frame, encode_frame, FrameHeader, WireError, HEADER_SIZE};

// =============================================================================
// Limits
// =============================================================================

/// Maximum payload carried by one message (the maximum transport unit).
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Maximum topic name length in bytes (63 plus the NUL of the C ABI).
pub const MAX_TOPIC_NAME_LEN: usize = 63;

/// Default size of the topic table.
pub const MAX_TOPICS: usize = 256;

/// Maximum process name length in bytes.
pub const MAX_PROCESS_NAME_LEN: usize = 31;

/// Process-table capacity for user-spawned entries (idle not counted).
pub const MAX_USER_PROCESSES: usize = 16;

/// Size of the security token carried by an Authentication Message.
pub const SECURITY_TOKEN_LEN: usize = 32;

// =============================================================================
// Reserved Process Identifiers
// =============================================================================

/// Well-known process identifiers assigned during boot.
pub mod pid {
    /// Idle process, never assigned to a user process
    pub const IDLE: u32 = 0;
    /// Init process (the boot path, runs the authentication gate)
    pub const INIT: u32 = 1;
    /// Authentication service, first process spawned by init
    pub const AUTH_SERVICE: u32 = 2;
}

// =============================================================================
// Reserved Channels
// =============================================================================

/// Reserved destination identifiers that route to a bound listener.
pub mod channel {
    /// Authentication channel. Bound by the gate while it awaits a verdict.
    pub const AUTH: u32 = 1;

    /// All reserved channel identifiers.
    pub const RESERVED: &[u32] = &[AUTH];

    /// Check whether a destination identifier names a reserved channel.
    pub fn is_reserved(id: u32) -> bool {
        RESERVED.contains(&id)
    }
}

// =============================================================================
// Message Tags
// =============================================================================

/// Kernel / system messages.
pub mod kernel {
    /// Empty wakeup notification.
    pub const MSG_PING: u32 = 0x0001;
}

/// Authentication protocol messages.
pub mod auth_tag {
    /// Authentication Message (kind in payload: verify / success / failure).
    /// Payload: AuthMessage, 44 bytes
    pub const MSG_AUTH: u32 = 0x0100;
}

/// Sensor sample tags, used when samples travel point-to-point.
pub mod sensor_tag {
    /// HRV sample. Payload: HrvSample, 16 bytes
    pub const MSG_HRV_SAMPLE: u32 = 0x0200;
    /// EEG sample. Payload: EegSample, 28 bytes
    pub const MSG_EEG_SAMPLE: u32 = 0x0201;
}

pub use auth_tag::MSG_AUTH;

// =============================================================================
// Topics
// =============================================================================

/// Topic names. Exact, case-sensitive strings.
pub mod topic {
    /// HRV sensor samples
    pub const HEART_RATE: &str = "heart_rate";
    /// EEG sensor samples
    pub const EEG_DATA: &str = "eeg_data";
    /// Published once by the gate when the desktop is admitted
    pub const AUTH_SUCCESS: &str = "auth_success";
}

// =============================================================================
// Process Names
// =============================================================================

/// Names given to the boot-time processes.
pub mod names {
    pub const IDLE: &str = "idle";
    pub const INIT: &str = "init";
    pub const AUTH_SERVICE: &str = "auth_service";
    pub const DESKTOP_SHELL: &str = "desktop_shell";
    pub const HRV_SENSOR: &str = "hrv_sensor";
    pub const EEG_SENSOR: &str = "eeg_sensor";
}

// =============================================================================
// Syscall Numbers
// =============================================================================

/// SAL syscall numbers (the `int 0x80` ABI of the platform layer).
pub mod syscall {
    /// Point-to-point send
    pub const SAL_SEND: u32 = 1;
    /// Point-to-point receive
    pub const SAL_RECV: u32 = 2;
    /// Topic publish
    pub const SAL_PUBLISH: u32 = 3;
    /// Topic subscribe
    pub const SAL_SUBSCRIBE: u32 = 4;

    /// Human-readable syscall name, for logs.
    pub fn name(num: u32) -> &'static str {
        match num {
            SAL_SEND => "sal_send",
            SAL_RECV => "sal_recv",
            SAL_PUBLISH => "sal_publish",
            SAL_SUBSCRIBE => "sal_subscribe",
            _ => "unknown",
        }
    }
}

pub use syscall::*;
