//! Program storage sessions.
//!
//! A [ProgramStore] accepts a program as a sequence of chunks from one [WriteSource] at a time
//! and commits it only when the whole session finishes. The bytes themselves go to a [Medium]:
//! NOR flash ([crate::norflash_medium]) or a RAM buffer ([crate::ram_medium]).

use core::{cell::RefCell, fmt};

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};

use crate::{error, info, vm::ProgramMemory, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    InvalidSize,
    NotWriting,
    SourceMismatch,
    EmptyChunk,
    SizeExceeded,
    Incomplete,
    NotAligned,
    OutOfBounds,
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Idle,
    Writing,
    Error,
}

/// The producer that owns a write session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteSource {
    None,
    Usb,
    Http,
}
impl fmt::Display for WriteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Usb => "USB",
            Self::Http => "HTTP",
        })
    }
}

/// Backing store for one committed program.
///
/// Offsets are logical program offsets; the medium decides where the bytes land. A program is
/// committed only by [Medium::write_header].
pub trait Medium {
    /// Largest program, in bytes, the medium can hold.
    fn capacity(&self) -> u32;

    /// Invalidate the committed program and prepare for `expected_size` bytes.
    fn begin(&mut self, expected_size: u32) -> Result<(), StorageError>;

    /// Store `data` at `offset`. Chunks arrive in order and without gaps.
    fn append(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError>;

    /// Persist anything still buffered by [Medium::append].
    fn flush(&mut self) -> Result<(), StorageError>;

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Size of the committed program, or 0 if there is none.
    fn read_header(&mut self) -> Result<u32, StorageError>;

    fn write_header(&mut self, size: u32) -> Result<(), StorageError>;

    /// Invalidate the committed program.
    fn erase(&mut self) -> Result<(), StorageError>;
}

/// Session operations of a program store, usable as a trait object.
pub trait ProgramStorage {
    /// Open a new write session for `source`, revoking any session in progress.
    fn write_start(&self, expected_size: u32, source: WriteSource) -> Result<(), StorageError>;

    fn write_chunk(&self, data: &[u8], source: WriteSource) -> Result<(), StorageError>;

    /// Commit the first `logical_size` bytes written in this session.
    fn write_finish(&self, logical_size: u32, source: WriteSource) -> Result<(), StorageError>;

    /// The committed program. `None` while a session is open or when nothing is committed.
    fn get(&self) -> Option<StoredProgram<'_>>;

    fn erase(&self) -> Result<(), StorageError>;

    fn bytes_written(&self) -> u32;

    fn expected_size(&self) -> u32;

    fn state(&self) -> SessionState;

    fn capacity(&self) -> u32;

    /// Read committed bytes on behalf of a [StoredProgram] taken at `generation`.
    fn read_program(&self, generation: u32, offset: u32, buf: &mut [u8]) -> bool;
}

/// Handle to a committed program.
///
/// A handle goes stale, and every read through it fails, once a new write session starts or the
/// storage is erased.
#[derive(Clone, Copy)]
pub struct StoredProgram<'a> {
    storage: &'a dyn ProgramStorage,
    generation: u32,
    len: u32,
}

impl ProgramMemory for StoredProgram<'_> {
    fn len(&self) -> u32 {
        self.len
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> bool {
        if buf.is_empty() {
            return true;
        }
        match offset.checked_add(buf.len() as u32) {
            Some(end) if end <= self.len => {
                self.storage.read_program(self.generation, offset, buf)
            }
            _ => false,
        }
    }
}

struct Session<Md: Medium> {
    medium: Md,
    expected_size: u32,
    bytes_written: u32,
    state: SessionState,
    source: WriteSource,
    stored_size: u32,
    generation: u32,
}

impl<Md: Medium> Session<Md> {
    fn fail(&mut self, err: StorageError) -> Result<(), StorageError> {
        self.state = SessionState::Error;
        error!(
            "Program write from {} failed: {:?} ({} of {} bytes)",
            self.source, err, self.bytes_written, self.expected_size
        );
        Err(err)
    }

    fn check_owner(&self, source: WriteSource) -> Result<(), StorageError> {
        if self.state != SessionState::Writing {
            return Err(StorageError::NotWriting);
        }
        if self.source != source {
            warn!(
                "Rejected write from {}; session is owned by {}",
                source, self.source
            );
            return Err(StorageError::SourceMismatch);
        }
        Ok(())
    }
}

pub struct ProgramStore<M: RawMutex, Md: Medium> {
    session: Mutex<M, RefCell<Session<Md>>>,
}

impl<M: RawMutex, Md: Medium> ProgramStore<M, Md> {
    /// Wrap `medium`, picking up a program committed before the last restart.
    pub fn new(mut medium: Md) -> Self {
        let stored_size = match medium.read_header() {
            Ok(size) if size <= medium.capacity() => size,
            Ok(_) => 0,
            Err(err) => {
                warn!("Unable to read program header: {:?}", err);
                0
            }
        };
        if stored_size > 0 {
            info!("Found stored program ({} bytes)", stored_size);
        }

        Self {
            session: Mutex::new(RefCell::new(Session {
                medium,
                expected_size: 0,
                bytes_written: 0,
                state: SessionState::Idle,
                source: WriteSource::None,
                stored_size,
                generation: 0,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Session<Md>) -> R) -> R {
        self.session.lock(|session| f(&mut session.borrow_mut()))
    }
}

impl<M: RawMutex, Md: Medium> ProgramStorage for ProgramStore<M, Md> {
    fn write_start(&self, expected_size: u32, source: WriteSource) -> Result<(), StorageError> {
        self.with(|s| {
            if source == WriteSource::None {
                return Err(StorageError::SourceMismatch);
            }
            let capacity = s.medium.capacity();
            if expected_size == 0 || expected_size > capacity {
                error!(
                    "Invalid program size: {} (max {})",
                    expected_size, capacity
                );
                return Err(StorageError::InvalidSize);
            }

            if s.state == SessionState::Writing && s.source != source {
                warn!(
                    "Write session from {} interrupted by {} ({} bytes discarded)",
                    s.source, source, s.bytes_written
                );
            }

            s.generation = s.generation.wrapping_add(1);
            s.stored_size = 0;
            s.expected_size = expected_size;
            s.bytes_written = 0;
            s.source = source;

            if let Err(err) = s.medium.begin(expected_size) {
                return s.fail(err);
            }
            s.state = SessionState::Writing;
            info!(
                "Program write started from {} ({} bytes)",
                source, expected_size
            );
            Ok(())
        })
    }

    fn write_chunk(&self, data: &[u8], source: WriteSource) -> Result<(), StorageError> {
        self.with(|s| {
            s.check_owner(source)?;
            if data.is_empty() {
                return s.fail(StorageError::EmptyChunk);
            }
            let end = match s.bytes_written.checked_add(data.len() as u32) {
                Some(end) if end <= s.expected_size => end,
                _ => return s.fail(StorageError::SizeExceeded),
            };
            if let Err(err) = s.medium.append(s.bytes_written, data) {
                return s.fail(err);
            }
            s.bytes_written = end;
            Ok(())
        })
    }

    fn write_finish(&self, logical_size: u32, source: WriteSource) -> Result<(), StorageError> {
        self.with(|s| {
            s.check_owner(source)?;
            if let Err(err) = s.medium.flush() {
                return s.fail(err);
            }
            if logical_size == 0 || logical_size > s.medium.capacity() {
                return s.fail(StorageError::InvalidSize);
            }
            if s.bytes_written < logical_size {
                return s.fail(StorageError::Incomplete);
            }
            if let Err(err) = s.medium.write_header(logical_size) {
                return s.fail(err);
            }

            s.stored_size = logical_size;
            s.state = SessionState::Idle;
            s.source = WriteSource::None;
            info!(
                "Program write complete from {} ({} bytes)",
                source, logical_size
            );
            Ok(())
        })
    }

    fn get(&self) -> Option<StoredProgram<'_>> {
        let (generation, len) = self.with(|s| {
            if s.state != SessionState::Idle
                || s.stored_size == 0
                || s.stored_size > s.medium.capacity()
            {
                return None;
            }
            Some((s.generation, s.stored_size))
        })?;

        Some(StoredProgram {
            storage: self,
            generation,
            len,
        })
    }

    fn erase(&self) -> Result<(), StorageError> {
        self.with(|s| {
            s.generation = s.generation.wrapping_add(1);
            s.stored_size = 0;
            s.expected_size = 0;
            s.bytes_written = 0;
            s.state = SessionState::Idle;
            s.source = WriteSource::None;
            info!("Program erased");
            s.medium.erase()
        })
    }

    fn bytes_written(&self) -> u32 {
        self.with(|s| s.bytes_written)
    }

    fn expected_size(&self) -> u32 {
        self.with(|s| s.expected_size)
    }

    fn state(&self) -> SessionState {
        self.with(|s| s.state)
    }

    fn capacity(&self) -> u32 {
        self.with(|s| s.medium.capacity())
    }

    fn read_program(&self, generation: u32, offset: u32, buf: &mut [u8]) -> bool {
        self.with(|s| {
            if s.generation != generation || s.state != SessionState::Idle {
                return false;
            }
            match offset.checked_add(buf.len() as u32) {
                Some(end) if end <= s.stored_size => s.medium.read(offset, buf).is_ok(),
                _ => false,
            }
        })
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod test;
