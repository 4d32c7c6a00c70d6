//! The ODKeyScript interpreter.
//!
//! [Vm] holds the complete interpreter state. Each call to [Vm::step] decodes one instruction
//! at the program counter and applies it. The interpreter has no I/O of its own: key reports go
//! through a [KeyEmitter] and `WAIT` goes through a [Clock], both supplied by the caller.

use core::fmt;

use embassy_time::Timer;
use heapless::Vec;
use odkey_common::opcodes::{self, MAX_COUNTERS, MAX_KEYS_PRESSED};

use crate::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VmError {
    InvalidOpcode,
    InvalidOperand,
    InvalidAddress,
    HidError,
    InvalidProgram,
}
impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidOpcode => "Invalid opcode",
            Self::InvalidOperand => "Invalid operand",
            Self::InvalidAddress => "Invalid address",
            Self::HidError => "HID error",
            Self::InvalidProgram => "Invalid program",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VmState {
    Ready,
    Running,
    /// Reserved; the interpreter never pauses.
    Paused,
    Error,
    Finished,
}
impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Error => "Error",
            Self::Finished => "Finished",
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub instructions_executed: u32,
    pub keys_pressed: u32,
    pub keys_released: u32,
}

/// Read access to program bytes.
pub trait ProgramMemory {
    /// Length of the program in bytes.
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with the bytes starting at `offset`. Returns false if any of them can not be
    /// read.
    fn read(&self, offset: u32, buf: &mut [u8]) -> bool;
}

impl ProgramMemory for &[u8] {
    fn len(&self) -> u32 {
        <[u8]>::len(self) as u32
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> bool {
        let start = offset as usize;
        match self.get(start..start + buf.len()) {
            Some(src) => {
                buf.copy_from_slice(src);
                true
            }
            None => false,
        }
    }
}

/// Receives the keyboard state each time it changes.
#[allow(async_fn_in_trait)]
pub trait KeyEmitter {
    /// Report `modifier` and `keys` as the complete set of keys now held. An empty set releases
    /// everything. Returns false if the report could not be sent.
    async fn send_keys(&mut self, modifier: u8, keys: &[u8]) -> bool;
}

#[allow(async_fn_in_trait)]
pub trait Clock {
    async fn delay_ms(&self, ms: u16);
}

/// [Clock] backed by [embassy_time::Timer].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;
impl Clock for SystemClock {
    async fn delay_ms(&self, ms: u16) {
        Timer::after_millis(ms.into()).await
    }
}

type HeldKeys = Vec<u8, MAX_KEYS_PRESSED>;

pub struct Vm<P: ProgramMemory> {
    program: Option<P>,
    program_size: u32,
    pc: u32,
    counters: [u16; MAX_COUNTERS],
    current_modifier: u8,
    current_keys: HeldKeys,
    zero_flag: bool,
    state: VmState,
    error: Option<VmError>,
    stats: Stats,
}

impl<P: ProgramMemory> Default for Vm<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProgramMemory> Vm<P> {
    pub fn new() -> Self {
        Self {
            program: None,
            program_size: 0,
            pc: 0,
            counters: [0; MAX_COUNTERS],
            current_modifier: 0,
            current_keys: Vec::new(),
            zero_flag: false,
            state: VmState::Ready,
            error: None,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == VmState::Running
    }

    pub fn has_error(&self) -> bool {
        self.state == VmState::Error
    }

    /// The error that stopped the program; `None` unless the state is [VmState::Error].
    pub fn error(&self) -> Option<VmError> {
        self.error
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn counter(&self, id: u8) -> u16 {
        self.counters[id as usize]
    }

    pub fn zero_flag(&self) -> bool {
        self.zero_flag
    }

    pub fn current_modifier(&self) -> u8 {
        self.current_modifier
    }

    pub fn current_keys(&self) -> &[u8] {
        &self.current_keys
    }

    /// Release any held keys and return to [VmState::Ready] with every register cleared.
    pub async fn reset<E: KeyEmitter>(&mut self, emitter: &mut E) {
        self.release_all_keys(emitter).await;

        self.program = None;
        self.program_size = 0;
        self.pc = 0;
        self.counters.fill(0);
        self.zero_flag = false;
        self.state = VmState::Ready;
        self.error = None;
        self.stats = Stats::default();
        debug!("VM reset");
    }

    /// Bind `program` and begin running it from offset zero.
    ///
    /// The VM must be [VmState::Ready]; call [Vm::reset] after a previous run.
    pub fn start(&mut self, program: P) -> Result<(), VmError> {
        if self.state != VmState::Ready || program.is_empty() {
            return Err(VmError::InvalidProgram);
        }
        self.program_size = program.len();
        self.program = Some(program);
        self.pc = 0;
        self.state = VmState::Running;
        info!(
            "Starting VM execution (program size: {} bytes)",
            self.program_size
        );
        Ok(())
    }

    /// Execute the instruction at the program counter.
    ///
    /// Does nothing unless the VM is running. Returns the error when this step moved the VM to
    /// [VmState::Error]. Held keys are released whenever the VM stops.
    pub async fn step<E: KeyEmitter, C: Clock>(
        &mut self,
        emitter: &mut E,
        clock: &C,
    ) -> Result<(), VmError> {
        if self.state != VmState::Running {
            return Ok(());
        }

        if self.pc < self.program_size {
            if let Err(err) = self.execute(emitter, clock).await {
                self.fail(err, emitter).await;
                return Err(err);
            }
        }

        if self.state == VmState::Running && self.pc >= self.program_size {
            self.release_all_keys(emitter).await;
            self.state = VmState::Finished;
            info!("Program completed successfully");
        }
        Ok(())
    }

    async fn execute<E: KeyEmitter, C: Clock>(
        &mut self,
        emitter: &mut E,
        clock: &C,
    ) -> Result<(), VmError> {
        let opcode = self.read_u8()?;
        self.stats.instructions_executed += 1;
        if let Some(name) = opcodes::mnemonic(opcode) {
            debug!("{} at PC {}", name, self.pc - 1);
        }

        match opcode {
            opcodes::KEYDN => {
                let (modifier, keys) = self.read_keys()?;
                if !emitter.send_keys(modifier, &keys).await {
                    return Err(VmError::HidError);
                }
                self.current_modifier = modifier;
                self.current_keys = keys;
                self.stats.keys_pressed += 1;
                debug!("KEYDN: modifier={}, keys={:?}", modifier, &self.current_keys[..]);
            }
            opcodes::KEYUP => {
                let (modifier, keys) = self.read_keys()?;
                let remaining_modifier = self.current_modifier & !modifier;
                let mut remaining = self.current_keys.clone();
                remaining.retain(|k| !keys.contains(k));
                if !emitter.send_keys(remaining_modifier, &remaining).await {
                    return Err(VmError::HidError);
                }
                self.current_modifier = remaining_modifier;
                self.current_keys = remaining;
                self.stats.keys_released += 1;
                debug!("KEYUP: modifier={}, keys={:?}", modifier, &keys[..]);
            }
            opcodes::KEYUP_ALL => {
                if !self.release_all_keys(emitter).await {
                    return Err(VmError::HidError);
                }
            }
            opcodes::WAIT => {
                let ms = self.read_u16()?;
                debug!("WAIT: {} ms", ms);
                clock.delay_ms(ms).await;
            }
            opcodes::SET_COUNTER => {
                let id = self.read_u8()?;
                let value = self.read_u16()?;
                *self
                    .counters
                    .get_mut(id as usize)
                    .ok_or(VmError::InvalidAddress)? = value;
                debug!("SET_COUNTER: counter[{}] = {}", id, value);
            }
            opcodes::DEC => {
                let id = self.read_u8()?;
                let counter = self
                    .counters
                    .get_mut(id as usize)
                    .ok_or(VmError::InvalidAddress)?;
                *counter = counter.saturating_sub(1);
                self.zero_flag = *counter == 0;
                debug!("DEC: counter[{}] = {}", id, *counter);
                // DEC is the only instruction that leaves the zero flag set
                return Ok(());
            }
            opcodes::JNZ => {
                let address = self.read_u32()?;
                if address >= self.program_size {
                    return Err(VmError::InvalidAddress);
                }
                if !self.zero_flag {
                    self.pc = address;
                }
                debug!("JNZ: zero_flag={}, address={}", self.zero_flag, address);
            }
            _ => {
                warn!("Invalid opcode: {} at PC {}", opcode, self.pc - 1);
                return Err(VmError::InvalidOpcode);
            }
        }

        self.zero_flag = false;
        Ok(())
    }

    async fn fail<E: KeyEmitter>(&mut self, err: VmError, emitter: &mut E) {
        self.error = Some(err);
        self.state = VmState::Error;
        self.release_all_keys(emitter).await;
        error!("Program failed with error: {} at PC {}", err, self.pc);
    }

    /// Clears the key state, reporting the release only if something was held. Returns the
    /// emitter's result, or true when there was nothing to release.
    async fn release_all_keys<E: KeyEmitter>(&mut self, emitter: &mut E) -> bool {
        if self.current_modifier == 0 && self.current_keys.is_empty() {
            return true;
        }
        debug!(
            "Releasing all keys (modifier: {}, keys: {})",
            self.current_modifier,
            self.current_keys.len()
        );
        self.current_modifier = 0;
        self.current_keys.clear();
        self.stats.keys_released += 1;
        emitter.send_keys(0, &[]).await
    }

    fn read_keys(&mut self) -> Result<(u8, HeldKeys), VmError> {
        let modifier = self.read_u8()?;
        let count = self.read_u8()? as usize;
        if count > MAX_KEYS_PRESSED {
            return Err(VmError::InvalidOperand);
        }
        let mut buf = [0; MAX_KEYS_PRESSED];
        self.read_bytes(&mut buf[..count])?;
        let keys = Vec::from_slice(&buf[..count]).map_err(|_| VmError::InvalidOperand)?;
        Ok((modifier, keys))
    }

    fn read_u8(&mut self) -> Result<u8, VmError> {
        let mut buf = [0; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, VmError> {
        let mut buf = [0; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, VmError> {
        let mut buf = [0; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), VmError> {
        let end = self
            .pc
            .checked_add(buf.len() as u32)
            .ok_or(VmError::InvalidAddress)?;
        if end > self.program_size {
            return Err(VmError::InvalidAddress);
        }
        let program = self.program.as_ref().ok_or(VmError::InvalidProgram)?;
        if !program.read(self.pc, buf) {
            return Err(VmError::InvalidAddress);
        }
        self.pc = end;
        Ok(())
    }
}

#[cfg(test)]
#[path = "vm_test.rs"]
mod test;
