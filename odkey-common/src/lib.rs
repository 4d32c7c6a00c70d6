#![no_std]
pub mod opcodes;
pub mod program;
