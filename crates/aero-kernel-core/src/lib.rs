//! AeroDesk Kernel Core - Pure State for the Scheduler and SAL Bus
//!
//! This crate contains the **pure, HAL-free** kernel state that the runtime
//! in `aero-kernel` drives.
//!
//! # Design Principles
//!
//! 1. **No HAL calls**: register switches, halting and console output live
//!    in `aero-kernel`; this crate only uses HAL data types
//! 2. **Index ownership**: the process arena owns every process; the
//!    scheduler and bus refer to processes by pid (slot index)
//! 3. **One operation, one critical section**: no method yields
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    aero-kernel-core                         │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                   │
//! │   │  KernelState  │    │   Scheduler   │                   │
//! │   │  - processes  │───▶│  round robin  │                   │
//! │   │  - channels   │    └───────────────┘                   │
//! │   │  - topics     │                                         │
//! │   └───────────────┘    ┌───────────────┐                   │
//! │          │             │  Invariants   │                   │
//! │          ▼             └───────────────┘                   │
//! │   ┌───────────────┐                                         │
//! │   │   SAL bus     │  send / receive / publish / subscribe   │
//! │   └───────────────┘                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      aero-kernel                            │
//! │   - HAL integration (context switch, halt, debug output)    │
//! │   - Program table and syscall handle                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `types` - Process, Message, Source, Dispatch
//! - `table` - Process arena
//! - `scheduler` - Round-robin selection
//! - `bus` - Send/receive, channel bindings, publish/subscribe entry points
//! - `topics` - Topic registry and the `Subscriber` trait
//! - `state` - KernelState and process lifecycle
//! - `invariants` - Runtime invariant checks

#![no_std]
extern crate alloc;

pub mod bus;
pub mod config;
pub mod error;
pub mod invariants;
pub mod scheduler;
pub mod state;
pub mod table;
pub mod topics;
pub mod types;

pub use config::{KernelConfig, PublishPolicy};
pub use error::{DeliveryError, KernelError};
pub use invariants::{check_all_invariants, InvariantViolation};
pub use scheduler::Scheduler;
pub use state::KernelState;
pub use table::ProcessTable;
pub use topics::{
    validate_topic_name, PublishReport, Subscriber, SubscriptionId, TopicMetrics, TopicRegistry,
};
pub use types::{
    Dispatch, Message, Process, ProcessId, ProcessMetrics, ProcessState, Source, SystemMetrics,
    WakeReason, MAX_MESSAGE_SIZE,
};
