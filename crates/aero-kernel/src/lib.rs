//! AeroDesk Kernel Runtime
//!
//! This crate drives the pure state in `aero-kernel-core` on a real
//! platform:
//! - Tick handling (receive deadlines, slice preemption)
//! - Register save/restore through the HAL on every switch
//! - The program table and the `Syscalls` surface
//! - The HAL-backed `log` logger

#![no_std]
extern crate alloc;

pub mod logging;
pub mod program;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use aero_hal::{CpuContext, HAL};
use aero_kernel_core::{Dispatch, KernelConfig, KernelError, KernelState, ProcessId, ProcessState};
use log::{debug, error, warn};

pub use aero_hal::{HalError, HAL as HalTrait};
pub use logging::{init_logger, HalLogger};
pub use program::{IdleProgram, Program, Resume, Syscalls, DEFAULT_STACK_SIZE, PROGRAM_ENTRY};

/// Outcome of one kernel step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// `pid` ran a slice that ended with `resume`
    Ran { pid: ProcessId, resume: Resume },
    /// Nothing runnable; the processor waited for an interrupt
    Idle,
    /// The dispatched process had no program attached and was killed
    Faulted(ProcessId),
}

/// The kernel runtime
pub struct Kernel<H: HAL> {
    hal: H,
    state: KernelState,
    programs: BTreeMap<ProcessId, Box<dyn Program>>,
    /// Register save area for whatever ran before the first dispatch
    boot_context: CpuContext,
    stack_size: usize,
    last_tick: u64,
    slice_started: u64,
}

impl<H: HAL> Kernel<H> {
    /// Create a kernel with an empty process table.
    pub fn new(hal: H, config: KernelConfig) -> Self {
        let now = hal.now_ticks();
        let mut state = KernelState::new(config);
        state.tick(now);
        hal.debug_write("[kernel] AeroDesk kernel initialization");
        Self {
            hal,
            state,
            programs: BTreeMap::new(),
            boot_context: CpuContext::default(),
            stack_size: DEFAULT_STACK_SIZE,
            last_tick: now,
            slice_started: now,
        }
    }

    /// Override the stack size given to later spawns.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Get a reference to the HAL
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Kernel state
    pub fn state(&self) -> &KernelState {
        &self.state
    }

    /// Mutable kernel state, for boot code and tests
    pub fn state_mut(&mut self) -> &mut KernelState {
        &mut self.state
    }

    // ========================================================================
    // Process creation
    // ========================================================================

    /// Create the idle process (pid 0) running `program`.
    pub fn spawn_idle(&mut self, program: Box<dyn Program>) -> Result<ProcessId, KernelError> {
        let stack_top = self
            .hal
            .allocate_stack(self.stack_size)
            .map_err(|e| {
                warn!(target: "proc", "idle stack allocation failed: {}", e);
                KernelError::InvalidState
            })?;
        let context = CpuContext::new(PROGRAM_ENTRY, stack_top, 0);
        let pid = self.state.spawn_idle(context)?;
        self.programs.insert(pid, program);
        self.hal.debug_write("[kernel] Created idle process (PID 0)");
        Ok(pid)
    }

    /// Create a Ready user process running `program`.
    pub fn spawn(&mut self, name: &str, program: Box<dyn Program>) -> Result<ProcessId, KernelError> {
        let pid = program::create_process(&mut self.state, &self.hal, name, self.stack_size)?;
        self.programs.insert(pid, program);
        self.hal.debug_write(&alloc::format!(
            "[kernel] Created process: {} (PID {})",
            name,
            pid
        ));
        Ok(pid)
    }

    /// Forcibly terminate a process and drop its program.
    pub fn kill(&mut self, pid: ProcessId) -> Result<(), KernelError> {
        self.state.kill(pid)?;
        self.programs.remove(&pid);
        self.hal.debug_write(&alloc::format!("[kernel] Killed process PID {}", pid));
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run one scheduling decision and, if something is runnable, one slice.
    pub fn step(&mut self) -> Step {
        let now = self.hal.now_ticks();
        if now != self.last_tick {
            self.on_tick(now);
        }

        // A process still Running has not used up its slice
        let dispatch = match self.state.current() {
            Some(pid) => Dispatch::Continue(pid),
            None => {
                let dispatch = self.state.schedule();
                // Every scheduling decision starts a fresh slice
                self.slice_started = now;
                dispatch
            }
        };
        let pid = match dispatch {
            Dispatch::Idle => {
                self.hal.wait_for_interrupt();
                return Step::Idle;
            }
            Dispatch::Continue(pid) => pid,
            Dispatch::Switch { from, to } => {
                self.switch_to(from, to);
                to
            }
        };

        let Some(mut program) = self.programs.remove(&pid) else {
            return self.missing_program(pid);
        };

        let mut spawned = Vec::new();
        let resume = {
            let mut sys = Syscalls::new(pid, &mut self.state, &self.hal, self.stack_size, &mut spawned);
            program.resume(&mut sys)
        };

        match resume {
            Resume::Continue => {}
            Resume::Yield => {
                self.state.yield_current();
            }
            Resume::Block => {
                let blocked = self
                    .state
                    .get(pid)
                    .is_some_and(|p| p.state == ProcessState::Blocked);
                if !blocked {
                    // Block without a pending receive degrades to a yield
                    self.state.yield_current();
                }
            }
            Resume::Exit(code) => {
                if let Err(e) = self.state.exit(pid, code) {
                    warn!(target: "proc", "exit of pid {} failed: {}", pid, e);
                }
            }
        }

        if self.state.get(pid).is_some_and(|p| p.is_live()) {
            self.programs.insert(pid, program);
        }
        for (child, child_program) in spawned {
            self.programs.insert(child, child_program);
        }

        #[cfg(debug_assertions)]
        for violation in aero_kernel_core::check_all_invariants(&self.state) {
            error!(
                target: "sched",
                "invariant {} violated: {}",
                violation.invariant, violation.description
            );
        }

        Step::Ran { pid, resume }
    }

    /// Run `max_steps` steps.
    pub fn run(&mut self, max_steps: usize) {
        for _ in 0..max_steps {
            self.step();
        }
    }

    /// Step until `done` holds, at most `max_steps` times.
    ///
    /// Returns the number of steps taken, or `None` if `done` never held.
    pub fn run_until(
        &mut self,
        max_steps: usize,
        mut done: impl FnMut(&KernelState) -> bool,
    ) -> Option<usize> {
        for taken in 0..max_steps {
            if done(&self.state) {
                return Some(taken);
            }
            self.step();
        }
        done(&self.state).then_some(max_steps)
    }

    /// Dispatched a pid with no program attached.
    ///
    /// The idle slot cannot be killed, so it halts in place; any other
    /// process is faulted.
    fn missing_program(&mut self, pid: ProcessId) -> Step {
        if pid == ProcessId::IDLE {
            warn!(target: "sched", "idle has no program attached; halting");
            self.state.yield_current();
            self.hal.wait_for_interrupt();
            return Step::Idle;
        }
        error!(target: "sched", "pid {} has no program attached", pid);
        if let Err(e) = self.state.fault(pid, "no program attached") {
            warn!(target: "proc", "fault of pid {} failed: {}", pid, e);
        }
        Step::Faulted(pid)
    }

    /// Expire receive deadlines and preempt an expired slice.
    fn on_tick(&mut self, now: u64) {
        self.last_tick = now;
        let woken = self.state.tick(now);
        if woken > 0 {
            debug!(target: "sal", "{} receive(s) timed out at tick {}", woken, now);
        }
        let slice = self.state.config.time_slice_ticks.max(1);
        if self.state.current().is_some() && now.saturating_sub(self.slice_started) >= slice {
            self.state.preempt();
            self.slice_started = now;
        }
    }

    /// Save the outgoing registers and load the incoming ones.
    fn switch_to(&mut self, from: Option<ProcessId>, to: ProcessId) {
        match from {
            Some(from) => {
                if let Some((save, load)) = self.state.processes.switch_pair(from, to) {
                    self.hal.switch_context(save, load);
                }
            }
            None => {
                if let Some(proc) = self.state.processes.get(to) {
                    self.hal.switch_context(&mut self.boot_context, &proc.context);
                }
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// One line per table entry: pid, name, state.
    pub fn process_listing(&self) -> Vec<String> {
        self.state
            .list()
            .iter()
            .map(|p| alloc::format!("{:>3}  {:<31}  {}", p.pid, p.name, p.state.label()))
            .collect()
    }

    /// Whether `pid` has a program attached
    pub fn has_program(&self, pid: ProcessId) -> bool {
        self.programs.contains_key(&pid)
    }
}
