use odkey_common::program::RAM_MAX_SIZE;

use crate::storage::{Medium, StorageError};

/// Program storage in a caller supplied RAM buffer. Nothing survives a restart.
///
/// Programs are limited to [RAM_MAX_SIZE] bytes however large the buffer is.
pub struct RamMedium<'d> {
    buf: &'d mut [u8],
    stored_size: u32,
}

impl<'d> RamMedium<'d> {
    pub fn new(buf: &'d mut [u8]) -> Self {
        Self {
            buf,
            stored_size: 0,
        }
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(start..end),
            _ => Err(StorageError::OutOfBounds),
        }
    }
}

impl Medium for RamMedium<'_> {
    fn capacity(&self) -> u32 {
        self.buf.len().min(RAM_MAX_SIZE as usize) as u32
    }

    fn begin(&mut self, expected_size: u32) -> Result<(), StorageError> {
        if expected_size == 0 || expected_size > self.capacity() {
            return Err(StorageError::InvalidSize);
        }
        self.buf.fill(0);
        self.stored_size = 0;
        Ok(())
    }

    fn append(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        let range = self.range(offset, data.len())?;
        self.buf[range].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buf[range]);
        Ok(())
    }

    fn read_header(&mut self) -> Result<u32, StorageError> {
        Ok(self.stored_size)
    }

    fn write_header(&mut self, size: u32) -> Result<(), StorageError> {
        if size > self.capacity() {
            return Err(StorageError::InvalidSize);
        }
        self.stored_size = size;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.buf.fill(0);
        self.stored_size = 0;
        Ok(())
    }
}

#[cfg(test)]
#[path = "ram_medium_test.rs"]
mod test;
