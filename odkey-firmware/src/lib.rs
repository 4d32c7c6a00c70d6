#![no_std]
//! Core of the ODKey keyboard automation firmware.
//!
//! - [vm] interprets ODKeyScript bytecode.
//! - [vm_task] runs the interpreter on its own task and lets other tasks halt it.
//! - [storage] accepts uploaded programs in chunks and commits them to a [storage::Medium]:
//!   [norflash_medium] or [ram_medium].
//! - [program] is what USB and HTTP transports and the trigger button talk to.
//! - [report] turns key state into boot keyboard reports for the USB task.
pub mod norflash_medium;
pub mod program;
pub mod ram_medium;
pub mod report;
pub mod storage;
pub mod vm;
pub mod vm_task;

#[cfg(any(test, feature = "test-utils"))]
pub mod flash_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod key_emitter_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod time_driver_test_stub;

#[macro_use]
mod macros;

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
