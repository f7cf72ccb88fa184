//! Core kernel types
//!
//! This module contains the fundamental types used throughout the kernel core.
//! All types here are pure data - no behavior that depends on HAL.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use aero_hal::{AddressSpace, CpuContext};
use aero_ipc::WireError;
use serde::{Deserialize, Serialize};

/// Process identifier. Equal to the process's slot index in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// The idle process
    pub const IDLE: ProcessId = ProcessId(aero_ipc::pid::IDLE);

    /// Slot index in the process arena
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Process state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Runnable, waiting for the scheduler
    Ready,
    /// Currently executing
    Running,
    /// Waiting in `receive`
    Blocked,
    /// Exited or killed; slot kept, never scheduled again
    Terminated,
}

impl ProcessState {
    /// Short label for process listings
    pub fn label(&self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Blocked => "BLOCKED",
            ProcessState::Terminated => "TERMINATED",
        }
    }
}

/// Why a Blocked process was made Ready again
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// A matching message was queued
    Message,
    /// The receive deadline passed
    Timeout,
}

/// Receive filter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Any sender
    Any,
    /// Point-to-point messages from one process
    Process(ProcessId),
    /// Messages sent to a reserved channel this process listens on
    Channel(u32),
}

impl Source {
    /// Check whether a queued message passes this filter
    pub fn matches(&self, msg: &Message) -> bool {
        match self {
            Source::Any => true,
            Source::Process(pid) => msg.channel.is_none() && msg.sender == *pid,
            Source::Channel(id) => msg.channel == Some(*id),
        }
    }
}

/// Process descriptor
pub struct Process {
    /// Process ID
    pub pid: ProcessId,
    /// Process name (at most `MAX_PROCESS_NAME_LEN` bytes)
    pub name: String,
    /// Current state
    pub state: ProcessState,
    /// Saved registers while not running
    pub context: CpuContext,
    /// Address space handle
    pub address_space: AddressSpace,
    /// Filter of the pending receive, while Blocked or just woken
    pub waiting: Option<Source>,
    /// Tick at which a pending receive times out
    pub deadline: Option<u64>,
    /// Set when a Blocked process is readied
    pub wake_reason: Option<WakeReason>,
    /// Inbound message queue
    pub inbox: VecDeque<Message>,
    /// Exit status, once terminated
    pub exit_code: Option<i32>,
    /// Detailed metrics for this process
    pub metrics: ProcessMetrics,
}

impl Process {
    /// Fresh Ready process
    pub fn new(pid: ProcessId, name: &str, context: CpuContext, address_space: AddressSpace) -> Self {
        Self {
            pid,
            name: truncate_name(name),
            state: ProcessState::Ready,
            context,
            address_space,
            waiting: None,
            deadline: None,
            wake_reason: None,
            inbox: VecDeque::new(),
            exit_code: None,
            metrics: ProcessMetrics::default(),
        }
    }

    /// Not terminated
    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Terminated
    }

    /// Ready or Running
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }

    /// Clear any pending-receive bookkeeping
    pub fn clear_wait(&mut self) {
        self.waiting = None;
        self.deadline = None;
        self.wake_reason = None;
    }
}

/// Cut a name to `MAX_PROCESS_NAME_LEN` bytes on a char boundary.
fn truncate_name(name: &str) -> String {
    let mut end = name.len().min(aero_ipc::MAX_PROCESS_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&name[..end])
}

/// Per-process resource tracking
#[derive(Clone, Debug, Default)]
pub struct ProcessMetrics {
    /// Slices this process was dispatched for
    pub slices: u64,
    /// Times the process was switched in
    pub context_switches_in: u64,
    /// Times the process was preempted by the tick
    pub preemptions: u64,
    /// Messages sent
    pub ipc_sent: u64,
    /// Messages received
    pub ipc_received: u64,
    /// Bytes sent via IPC
    pub ipc_bytes_sent: u64,
    /// Bytes received via IPC
    pub ipc_bytes_received: u64,
    /// Topic publishes issued
    pub publishes: u64,
    /// Highest inbox depth seen
    pub queue_high_water: usize,
    /// Tick at spawn
    pub start_tick: u64,
}

/// System-wide metrics
#[derive(Clone, Debug, Default)]
pub struct SystemMetrics {
    /// Table entries, terminated included
    pub process_count: usize,
    /// Entries not terminated
    pub live_count: usize,
    /// Messages currently queued across all inboxes
    pub total_pending_messages: usize,
    /// Messages sent since boot
    pub total_messages: u64,
    /// Registered topics
    pub topic_count: usize,
    /// Subscriber delivery failures since boot
    pub delivery_failures: u64,
    /// Scheduler decisions
    pub scheduler_decisions: u64,
    /// Context switches performed
    pub context_switches: u64,
    /// Current tick
    pub uptime_ticks: u64,
}

// ============================================================================
// IPC Types
// ============================================================================

/// Maximum IPC message size in bytes
pub const MAX_MESSAGE_SIZE: usize = aero_ipc::MAX_MESSAGE_SIZE;

/// SAL message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Sender process ID
    pub sender: ProcessId,
    /// Destination as addressed (pid or reserved channel)
    pub destination: u32,
    /// Reserved channel the message arrived on, if any
    pub channel: Option<u32>,
    /// Message tag
    pub tag: u32,
    /// Message payload; its length is the header length
    pub data: Vec<u8>,
}

impl Message {
    /// Header length field
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Empty payload
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode to the SAL wire frame
    pub fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        aero_ipc::encode_frame(self.sender.0, self.destination, self.tag, &self.data)
    }

    /// Decode from the SAL wire frame
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        let (header, payload) = aero_ipc::decode_frame(bytes)?;
        let channel = aero_ipc::channel::is_reserved(header.destination).then_some(header.destination);
        Ok(Self {
            sender: ProcessId(header.sender),
            destination: header.destination,
            channel,
            tag: header.tag,
            data: payload.to_vec(),
        })
    }
}

/// Scheduler decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The same process keeps the processor
    Continue(ProcessId),
    /// Save `from` (if anything ran before) and resume `to`
    Switch {
        from: Option<ProcessId>,
        to: ProcessId,
    },
    /// Nothing is runnable; wait for an interrupt
    Idle,
}

impl Dispatch {
    /// The process that runs next, if any
    pub fn next(&self) -> Option<ProcessId> {
        match self {
            Dispatch::Continue(pid) => Some(*pid),
            Dispatch::Switch { to, .. } => Some(*to),
            Dispatch::Idle => None,
        }
    }
}
