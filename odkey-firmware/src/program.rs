//! Entry point for transports and triggers.
//!
//! [Program] ties the flash and RAM stores to the [VmTask]: every write session first stops the
//! running program, and [Program::execute] hands the committed program of either store to the
//! task.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::{
    info,
    storage::{ProgramStorage, SessionState, StorageError, StoredProgram, WriteSource},
    vm_task::{CompleteFn, VmTask},
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramType {
    Flash,
    Ram,
}
impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flash => "flash",
            Self::Ram => "RAM",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecuteError {
    AlreadyRunning,
    NoProgram,
    Rejected,
}

pub struct Program<'a, M: RawMutex> {
    flash: &'a dyn ProgramStorage,
    ram: &'a dyn ProgramStorage,
    vm: &'a VmTask<M, StoredProgram<'a>>,
}

impl<'a, M: RawMutex> Program<'a, M> {
    pub fn new(
        flash: &'a dyn ProgramStorage,
        ram: &'a dyn ProgramStorage,
        vm: &'a VmTask<M, StoredProgram<'a>>,
    ) -> Self {
        Self { flash, ram, vm }
    }

    fn storage(&self, ty: ProgramType) -> &'a dyn ProgramStorage {
        match ty {
            ProgramType::Flash => self.flash,
            ProgramType::Ram => self.ram,
        }
    }

    /// Halt any running program, then open a write session on the `ty` store.
    pub async fn write_start(
        &self,
        ty: ProgramType,
        expected_size: u32,
        source: WriteSource,
    ) -> Result<(), StorageError> {
        if self.vm.halt().await {
            info!("Halted program before {} write", ty);
        }
        self.storage(ty).write_start(expected_size, source)
    }

    pub fn write_chunk(
        &self,
        ty: ProgramType,
        data: &[u8],
        source: WriteSource,
    ) -> Result<(), StorageError> {
        self.storage(ty).write_chunk(data, source)
    }

    pub fn write_finish(
        &self,
        ty: ProgramType,
        logical_size: u32,
        source: WriteSource,
    ) -> Result<(), StorageError> {
        self.storage(ty).write_finish(logical_size, source)
    }

    /// Erase the `ty` store. A program still running from it stops with an error on its next
    /// read.
    pub fn erase(&self, ty: ProgramType) -> Result<(), StorageError> {
        self.storage(ty).erase()
    }

    pub fn get(&self, ty: ProgramType) -> Option<StoredProgram<'a>> {
        self.storage(ty).get()
    }

    pub fn bytes_written(&self, ty: ProgramType) -> u32 {
        self.storage(ty).bytes_written()
    }

    pub fn expected_size(&self, ty: ProgramType) -> u32 {
        self.storage(ty).expected_size()
    }

    pub fn write_state(&self, ty: ProgramType) -> SessionState {
        self.storage(ty).state()
    }

    /// Run the committed `ty` program. `on_complete` is called when it finishes or fails.
    pub fn execute(
        &self,
        ty: ProgramType,
        on_complete: Option<CompleteFn>,
    ) -> Result<(), ExecuteError> {
        if self.vm.is_running() {
            warn!("Cannot execute {} program: VM is already running", ty);
            return Err(ExecuteError::AlreadyRunning);
        }
        let Some(program) = self.get(ty) else {
            warn!("No {} program stored", ty);
            return Err(ExecuteError::NoProgram);
        };
        if !self.vm.start_program(program, on_complete) {
            return Err(ExecuteError::Rejected);
        }
        info!("Executing {} program", ty);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.vm.is_running()
    }

    /// Stop the running program and wait until the task is idle. Returns true if a program was
    /// stopped.
    pub async fn halt(&self) -> bool {
        self.vm.halt().await
    }
}

#[cfg(test)]
#[path = "program_test.rs"]
mod test;
