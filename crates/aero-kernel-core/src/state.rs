//! Kernel state
//!
//! `KernelState` owns every piece of process-wide mutable state: the process
//! arena, the scheduler's indices, channel bindings and the topic registry.
//! Each method is one critical section; nothing here yields.

use alloc::collections::BTreeMap;

use aero_hal::{AddressSpace, CpuContext};
use log::{debug, error, info};

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::table::ProcessTable;
use crate::topics::TopicRegistry;
use crate::types::{Dispatch, Process, ProcessId, SystemMetrics};

/// Complete kernel state.
pub struct KernelState {
    /// Configuration in effect
    pub config: KernelConfig,
    /// Process arena
    pub processes: ProcessTable,
    /// Round-robin scheduler
    pub scheduler: Scheduler,
    /// Reserved channel → listening process
    pub channels: BTreeMap<u32, ProcessId>,
    /// Topic registry
    pub topics: TopicRegistry,
    /// Last tick seen
    pub now: u64,
    /// Messages sent since boot
    pub total_messages: u64,
}

impl KernelState {
    /// Create an empty kernel state.
    pub fn new(config: KernelConfig) -> Self {
        Self {
            processes: ProcessTable::new(config.max_user_processes),
            scheduler: Scheduler::new(),
            channels: BTreeMap::new(),
            topics: TopicRegistry::new(config.max_topics),
            now: 0,
            total_messages: 0,
            config,
        }
    }

    // ========================================================================
    // Process lifecycle
    // ========================================================================

    /// Create the idle process (pid 0).
    pub fn spawn_idle(&mut self, context: CpuContext) -> Result<ProcessId, KernelError> {
        let pid = self.processes.spawn_idle(context)?;
        self.stamp_start(pid);
        info!(target: "proc", "created idle process (pid 0)");
        Ok(pid)
    }

    /// Create a Ready user process with the next pid.
    pub fn spawn(
        &mut self,
        name: &str,
        context: CpuContext,
        address_space: AddressSpace,
    ) -> Result<ProcessId, KernelError> {
        let pid = self.processes.spawn(name, context, address_space)?;
        self.stamp_start(pid);
        info!(target: "proc", "created process '{}' (pid {})", name, pid);
        Ok(pid)
    }

    fn stamp_start(&mut self, pid: ProcessId) {
        let now = self.now;
        if let Some(proc) = self.processes.get_mut(pid) {
            proc.metrics.start_tick = now;
        }
    }

    /// Terminate a process and release everything it holds on the bus.
    ///
    /// The idle process cannot exit.
    pub fn exit(&mut self, pid: ProcessId, code: i32) -> Result<(), KernelError> {
        if pid == ProcessId::IDLE {
            return Err(KernelError::InvalidState);
        }
        self.processes.terminate(pid, code)?;
        self.scheduler.release(pid);
        let subs = self.topics.remove_owner(pid);
        self.channels.retain(|_, listener| *listener != pid);
        debug!(
            target: "proc",
            "pid {} exited with {} ({} subscriptions dropped)",
            pid, code, subs
        );
        Ok(())
    }

    /// Forced termination from any live state.
    pub fn kill(&mut self, pid: ProcessId) -> Result<(), KernelError> {
        self.exit(pid, -1)?;
        info!(target: "proc", "killed pid {}", pid);
        Ok(())
    }

    /// Fatal fault: log the reason, then kill.
    pub fn fault(&mut self, pid: ProcessId, reason: &str) -> Result<(), KernelError> {
        error!(target: "proc", "pid {} faulted: {}", pid, reason);
        self.kill(pid)
    }

    /// Look up any entry, terminated included
    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(pid)
    }

    /// All entries in slot order
    pub fn list(&self) -> &[Process] {
        self.processes.list()
    }

    /// Entries not terminated
    pub fn live_count(&self) -> usize {
        self.processes.live_count()
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Make a scheduling decision.
    pub fn schedule(&mut self) -> Dispatch {
        self.scheduler.schedule(&mut self.processes)
    }

    /// Voluntary yield of the running process.
    pub fn yield_current(&mut self) -> Option<ProcessId> {
        self.scheduler.yield_current(&mut self.processes)
    }

    /// Tick-driven preemption of the running process.
    pub fn preempt(&mut self) -> Option<ProcessId> {
        self.scheduler.preempt(&mut self.processes)
    }

    /// Process in state Running, if any
    pub fn current(&self) -> Option<ProcessId> {
        self.scheduler.current()
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Snapshot of system-wide counters.
    pub fn system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            process_count: self.processes.len(),
            live_count: self.processes.live_count(),
            total_pending_messages: self.list().iter().map(|p| p.inbox.len()).sum(),
            total_messages: self.total_messages,
            topic_count: self.topics.topic_count(),
            delivery_failures: self.topics.delivery_failures,
            scheduler_decisions: self.scheduler.decisions,
            context_switches: self.scheduler.switches,
            uptime_ticks: self.now,
        }
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::check_all_invariants;
    use crate::types::ProcessState;

    fn booted() -> KernelState {
        let mut state = KernelState::default();
        state.spawn_idle(CpuContext::default()).unwrap();
        state
    }

    fn spawn(state: &mut KernelState, name: &str) -> ProcessId {
        state
            .spawn(name, CpuContext::default(), AddressSpace::Kernel)
            .unwrap()
    }

    #[test]
    fn test_boot_sequence_pids() {
        let mut state = booted();
        assert_eq!(spawn(&mut state, "init"), ProcessId(1));
        assert_eq!(spawn(&mut state, "auth_service"), ProcessId(2));
        let names: alloc::vec::Vec<&str> = state.list().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["idle", "init", "auth_service"]);
        assert!(check_all_invariants(&state).is_empty());
    }

    #[test]
    fn test_exit_excludes_from_scheduling() {
        let mut state = booted();
        let a = spawn(&mut state, "a");
        let b = spawn(&mut state, "b");
        assert_eq!(state.schedule().next(), Some(a));
        state.exit(a, 0).unwrap();
        assert_eq!(state.current(), None);
        for _ in 0..3 {
            assert_eq!(state.schedule().next(), Some(b));
        }
        assert_eq!(state.get(a).unwrap().state, ProcessState::Terminated);
        assert!(check_all_invariants(&state).is_empty());
    }

    #[test]
    fn test_idle_cannot_exit() {
        let mut state = booted();
        assert_eq!(state.exit(ProcessId::IDLE, 0), Err(KernelError::InvalidState));
    }

    #[test]
    fn test_kill_from_blocked_and_twice() {
        let mut state = booted();
        let a = spawn(&mut state, "a");
        state.processes.get_mut(a).unwrap().state = ProcessState::Blocked;
        state.kill(a).unwrap();
        assert_eq!(state.get(a).unwrap().exit_code, Some(-1));
        assert_eq!(state.kill(a), Err(KernelError::ProcessNotFound));
    }

    #[test]
    fn test_fault_terminates() {
        let mut state = booted();
        let a = spawn(&mut state, "a");
        state.fault(a, "page fault").unwrap();
        assert_eq!(state.live_count(), 1);
    }

    #[test]
    fn test_system_metrics() {
        let mut state = booted();
        spawn(&mut state, "a");
        state.schedule();
        let m = state.system_metrics();
        assert_eq!(m.process_count, 2);
        assert_eq!(m.live_count, 2);
        assert_eq!(m.scheduler_decisions, 1);
        assert_eq!(m.context_switches, 1);
    }
}
