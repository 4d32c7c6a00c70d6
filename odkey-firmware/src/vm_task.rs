//! Runs the interpreter on a task of its own.
//!
//! [VmTask::run] owns the [Vm] and loops forever: it waits for a program handed over by
//! [VmTask::start_program], runs it to the end and goes back to waiting. Other tasks stop it
//! with [VmTask::halt], which interrupts a `WAIT` at once and returns when the VM is idle again.

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, Ordering},
};

use embassy_futures::{select::select, yield_now};
use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    signal::Signal,
};

use crate::{
    debug, info,
    vm::{Clock, KeyEmitter, ProgramMemory, Vm},
    warn,
};

/// Called when a program stops on its own, whether it finished or failed. Not called after a
/// halt.
pub type CompleteFn = &'static (dyn Fn() + Sync);

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    Idle,
    /// A program was handed over but the task has not picked it up yet.
    Pending,
    Running,
}

struct Request<P> {
    program: P,
    on_complete: Option<CompleteFn>,
}

pub struct VmTask<M: RawMutex, P> {
    requests: Signal<M, Request<P>>,
    state: Mutex<M, Cell<TaskState>>,
    halt_requested: AtomicBool,
    halt_signal: Signal<M, ()>,
}

impl<M: RawMutex, P: ProgramMemory> Default for VmTask<M, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, P: ProgramMemory> VmTask<M, P> {
    pub const fn new() -> Self {
        Self {
            requests: Signal::new(),
            state: Mutex::new(Cell::new(TaskState::Idle)),
            halt_requested: AtomicBool::new(false),
            halt_signal: Signal::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        self.state.lock(|state| state.get())
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Hand `program` to the task. Returns false, and drops `program`, while another program is
    /// running. A program handed over earlier but not yet picked up is replaced.
    pub fn start_program(&self, program: P, on_complete: Option<CompleteFn>) -> bool {
        self.state.lock(|state| match state.get() {
            TaskState::Running => {
                warn!("VM is already running");
                false
            }
            current => {
                if current == TaskState::Pending {
                    debug!("Replacing pending program");
                }
                state.set(TaskState::Pending);
                self.requests.signal(Request {
                    program,
                    on_complete,
                });
                true
            }
        })
    }

    /// Stop the running program, or drop one not yet picked up, and wait until the task is idle.
    /// Any keys the program held are released. Returns true if there was a program to stop.
    ///
    /// Any number of tasks may halt at once; each returns once the task is idle.
    pub async fn halt(&self) -> bool {
        let previous = self.state.lock(|state| {
            let previous = state.get();
            match previous {
                TaskState::Idle => {}
                TaskState::Pending => {
                    self.requests.reset();
                    state.set(TaskState::Idle);
                }
                TaskState::Running => {
                    self.halt_requested.store(true, Ordering::Release);
                    self.halt_signal.signal(());
                }
            }
            previous
        });

        match previous {
            TaskState::Idle => false,
            TaskState::Pending => {
                debug!("Dropped pending program");
                true
            }
            TaskState::Running => {
                info!("Halting VM");
                while self.is_running() {
                    yield_now().await;
                }
                true
            }
        }
    }

    fn halted(&self) -> bool {
        self.halt_requested.load(Ordering::Acquire)
    }

    /// The task loop. Sends reports through `emitter` and times `WAIT` with `clock`.
    pub async fn run<E: KeyEmitter, C: Clock>(&self, emitter: &mut E, clock: &C) -> ! {
        let mut vm = Vm::new();
        let clock = HaltableClock { clock, task: self };

        loop {
            let request = self.requests.wait().await;

            let accepted = self.state.lock(|state| {
                if state.get() != TaskState::Pending {
                    return false;
                }
                state.set(TaskState::Running);
                self.halt_requested.store(false, Ordering::Release);
                self.halt_signal.reset();
                true
            });
            if !accepted {
                continue;
            }

            let completed = self.execute(&mut vm, request.program, emitter, &clock).await;

            self.state.lock(|state| state.set(TaskState::Idle));

            if completed {
                if let Some(on_complete) = request.on_complete {
                    on_complete();
                }
            }
        }
    }

    /// Returns false when the run was halted.
    async fn execute<E: KeyEmitter, C: Clock>(
        &self,
        vm: &mut Vm<P>,
        program: P,
        emitter: &mut E,
        clock: &C,
    ) -> bool {
        vm.reset(emitter).await;
        if let Err(err) = vm.start(program) {
            warn!("Unable to start program: {}", err);
            return true;
        }

        while vm.is_running() && !self.halted() {
            let _ = vm.step(emitter, clock).await;
            yield_now().await;
        }

        if vm.is_running() {
            vm.reset(emitter).await;
            info!("VM halted");
            return false;
        }

        let stats = vm.stats();
        info!(
            "VM stopped: {} ({} instructions, {} presses, {} releases)",
            vm.state(),
            stats.instructions_executed,
            stats.keys_pressed,
            stats.keys_released
        );
        true
    }
}

/// Wraps the task's clock so a halt cuts a delay short.
struct HaltableClock<'a, C, M: RawMutex, P> {
    clock: &'a C,
    task: &'a VmTask<M, P>,
}

impl<C: Clock, M: RawMutex, P: ProgramMemory> Clock for HaltableClock<'_, C, M, P> {
    async fn delay_ms(&self, ms: u16) {
        if self.task.halted() {
            return;
        }
        select(self.clock.delay_ms(ms), self.task.halt_signal.wait()).await;
    }
}

#[cfg(test)]
#[path = "vm_task_test.rs"]
mod test;
