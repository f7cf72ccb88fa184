//! Round-robin scheduler
//!
//! Strict round robin over the Ready set. The scan starts at the slot after
//! the last dispatched process, wraps to the head of the table and checks
//! the last dispatched process itself last, so ties go to the lower slot
//! past the wrap point. The idle process (slot 0) is only chosen when no
//! other process is runnable.

use log::trace;

use crate::table::ProcessTable;
use crate::types::{Dispatch, ProcessId, ProcessState};

/// Scheduler bookkeeping. Holds slot indices, never process references.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    /// Process currently in state Running
    current: Option<ProcessId>,
    /// Last process dispatched; the scan starts after it
    cursor: Option<ProcessId>,
    /// Process whose registers are live on the CPU
    on_cpu: Option<ProcessId>,
    /// Scheduling decisions made
    pub decisions: u64,
    /// Decisions that switched to another process
    pub switches: u64,
    /// Decisions that found nothing runnable
    pub idle_decisions: u64,
    /// Tick-driven preemptions
    pub preemptions: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process in state Running, if any
    pub fn current(&self) -> Option<ProcessId> {
        self.current
    }

    /// Pick the next process and mark it Running.
    pub fn schedule(&mut self, table: &mut ProcessTable) -> Dispatch {
        self.decisions += 1;

        // The running process competes again as an ordinary Ready entry
        if let Some(pid) = self.current.take() {
            if let Some(proc) = table.get_mut(pid) {
                if proc.state == ProcessState::Running {
                    proc.state = ProcessState::Ready;
                }
            }
        }

        let Some(next) = self.pick(table) else {
            self.idle_decisions += 1;
            trace!(target: "sched", "nothing runnable");
            return Dispatch::Idle;
        };

        if let Some(proc) = table.get_mut(next) {
            proc.state = ProcessState::Running;
            proc.metrics.slices += 1;
        }
        self.current = Some(next);
        self.cursor = Some(next);

        let from = self.on_cpu;
        if from == Some(next) {
            return Dispatch::Continue(next);
        }

        self.switches += 1;
        self.on_cpu = Some(next);
        if let Some(proc) = table.get_mut(next) {
            proc.metrics.context_switches_in += 1;
        }
        trace!(target: "sched", "switch {:?} -> {}", from, next);
        Dispatch::Switch { from, to: next }
    }

    /// Scan for the next Ready slot.
    fn pick(&self, table: &ProcessTable) -> Option<ProcessId> {
        let procs = table.list();
        let n = procs.len();
        if n == 0 {
            return None;
        }
        let start = self.cursor.map(|p| p.slot() + 1).unwrap_or(1);

        // User slots first: start after the cursor, wrap, cursor itself last
        let user = (0..n)
            .map(|i| (start + i) % n)
            .filter(|slot| *slot != ProcessId::IDLE.slot())
            .find(|slot| procs[*slot].state == ProcessState::Ready);
        if let Some(slot) = user {
            return Some(ProcessId(slot as u32));
        }

        (procs[ProcessId::IDLE.slot()].state == ProcessState::Ready).then_some(ProcessId::IDLE)
    }

    /// Running → Ready, voluntary. The next `schedule` decides who runs.
    pub fn yield_current(&mut self, table: &mut ProcessTable) -> Option<ProcessId> {
        let pid = self.current.take()?;
        if let Some(proc) = table.get_mut(pid) {
            if proc.state == ProcessState::Running {
                proc.state = ProcessState::Ready;
            }
        }
        Some(pid)
    }

    /// Running → Ready, forced by the tick.
    pub fn preempt(&mut self, table: &mut ProcessTable) -> Option<ProcessId> {
        let pid = self.yield_current(table)?;
        self.preemptions += 1;
        if let Some(proc) = table.get_mut(pid) {
            proc.metrics.preemptions += 1;
        }
        trace!(target: "sched", "preempt {}", pid);
        Some(pid)
    }

    /// Forget `pid` as the running process after it blocked or terminated.
    pub fn release(&mut self, pid: ProcessId) {
        if self.current == Some(pid) {
            self.current = None;
        }
    }
}
