//! Process Table
//!
//! Arena of process slots indexed by pid. Slot 0 is reserved for the idle
//! process; user processes take the next slot in order. Slots are never
//! compacted or reused, so a terminated entry keeps its pid and still counts
//! towards the capacity.

use alloc::vec::Vec;

use aero_hal::{AddressSpace, CpuContext};

use crate::error::KernelError;
use crate::types::{Process, ProcessId, ProcessState};

/// Fixed-capacity process arena
pub struct ProcessTable {
    slots: Vec<Process>,
    max_user: usize,
}

impl ProcessTable {
    /// Empty table admitting `max_user` processes besides idle
    pub fn new(max_user: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_user + 1),
            max_user,
        }
    }

    /// Create the idle process in slot 0.
    ///
    /// Must be the first entry; a second call fails with `InvalidState`.
    pub fn spawn_idle(&mut self, context: CpuContext) -> Result<ProcessId, KernelError> {
        if !self.slots.is_empty() {
            return Err(KernelError::InvalidState);
        }
        self.slots.push(Process::new(
            ProcessId::IDLE,
            aero_ipc::names::IDLE,
            context,
            AddressSpace::Kernel,
        ));
        Ok(ProcessId::IDLE)
    }

    /// Allocate the next slot for a user process, in state Ready.
    pub fn spawn(
        &mut self,
        name: &str,
        context: CpuContext,
        address_space: AddressSpace,
    ) -> Result<ProcessId, KernelError> {
        if self.slots.is_empty() {
            // pid 0 is never handed to a user process
            return Err(KernelError::InvalidState);
        }
        if self.user_slots_used() >= self.max_user {
            return Err(KernelError::ProcessTableFull);
        }
        let pid = ProcessId(self.slots.len() as u32);
        self.slots.push(Process::new(pid, name, context, address_space));
        Ok(pid)
    }

    /// Pid the next spawn will receive
    pub fn next_pid(&self) -> ProcessId {
        ProcessId(self.slots.len().max(1) as u32)
    }

    /// Slots taken by user processes, terminated ones included
    pub fn user_slots_used(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    /// User-process capacity
    pub fn capacity(&self) -> usize {
        self.max_user
    }

    /// Look up any entry, terminated included
    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.slots.get(pid.slot())
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.slots.get_mut(pid.slot())
    }

    /// Look up a process that has not terminated
    pub fn live(&self, pid: ProcessId) -> Result<&Process, KernelError> {
        self.get(pid)
            .filter(|p| p.is_live())
            .ok_or(KernelError::ProcessNotFound)
    }

    /// Mutable lookup of a process that has not terminated
    pub fn live_mut(&mut self, pid: ProcessId) -> Result<&mut Process, KernelError> {
        self.get_mut(pid)
            .filter(|p| p.is_live())
            .ok_or(KernelError::ProcessNotFound)
    }

    /// All entries in slot order
    pub fn list(&self) -> &[Process] {
        &self.slots
    }

    /// Mutable iteration in slot order
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Process> {
        self.slots.iter_mut()
    }

    /// Number of entries, terminated included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// No entries at all (not even idle)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entries not terminated
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|p| p.is_live()).count()
    }

    /// Mark an entry Terminated.
    ///
    /// Only the table side of termination; queue, subscription and channel
    /// cleanup is done by `KernelState::exit`.
    pub(crate) fn terminate(&mut self, pid: ProcessId, code: i32) -> Result<(), KernelError> {
        let proc = self.live_mut(pid)?;
        proc.state = ProcessState::Terminated;
        proc.exit_code = Some(code);
        proc.clear_wait();
        proc.inbox.clear();
        Ok(())
    }

    /// Borrow the saved context of `from` mutably and of `to` shared, for a
    /// register switch between two distinct slots.
    pub fn switch_pair(
        &mut self,
        from: ProcessId,
        to: ProcessId,
    ) -> Option<(&mut CpuContext, &CpuContext)> {
        let (a, b) = (from.slot(), to.slot());
        if a == b || a >= self.slots.len() || b >= self.slots.len() {
            return None;
        }
        if a < b {
            let (lo, hi) = self.slots.split_at_mut(b);
            Some((&mut lo[a].context, &hi[0].context))
        } else {
            let (lo, hi) = self.slots.split_at_mut(a);
            Some((&mut hi[0].context, &lo[b].context))
        }
    }
}
