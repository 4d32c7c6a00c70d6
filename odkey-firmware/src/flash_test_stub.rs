use core::cell::RefCell;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

extern crate std;
use std::{rc::Rc, vec::Vec};

#[derive(Debug)]
pub enum FlashStubError {
    NotAligned,
    OutOfBounds,
    Injected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Erase(u32, u32),
    Write(u32, Vec<u8>),
}

/// In memory NOR flash. Bytes read back as `0xff` until written; writes can only clear bits.
pub struct NorFlashStub<const FLASH_SIZE: usize> {
    pub buf: [u8; FLASH_SIZE],
    actions: Rc<RefCell<Vec<Action>>>,
    fail_writes_from: Option<u32>,
}

impl<const FLASH_SIZE: usize> NorFlashStub<FLASH_SIZE> {
    /// Every erase and write issued so far, shared with the stub.
    pub fn actions(&self) -> Rc<RefCell<Vec<Action>>> {
        self.actions.clone()
    }

    /// Make writes that touch `address` or beyond fail.
    pub fn fail_writes_from(&mut self, address: u32) {
        self.fail_writes_from = Some(address);
    }

    fn check(&self, offset: u32, len: usize, align: usize) -> Result<usize, FlashStubError> {
        let offset = offset as usize;
        if offset % align != 0 || len % align != 0 {
            return Err(FlashStubError::NotAligned);
        }
        if offset + len > FLASH_SIZE {
            return Err(FlashStubError::OutOfBounds);
        }
        Ok(offset)
    }
}

impl NorFlashError for FlashStubError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashStubError::NotAligned => NorFlashErrorKind::NotAligned,
            FlashStubError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            FlashStubError::Injected => NorFlashErrorKind::Other,
        }
    }
}
impl<const FLASH_SIZE: usize> ErrorType for NorFlashStub<FLASH_SIZE> {
    type Error = FlashStubError;
}
impl<const FLASH_SIZE: usize> ReadNorFlash for NorFlashStub<FLASH_SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = self.check(offset, bytes.len(), Self::READ_SIZE)?;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}
impl<const FLASH_SIZE: usize> NorFlash for NorFlashStub<FLASH_SIZE> {
    const WRITE_SIZE: usize = 4;

    const ERASE_SIZE: usize = 64;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if to < from {
            return Err(FlashStubError::OutOfBounds);
        }
        let start = self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;
        self.actions.borrow_mut().push(Action::Erase(from, to));
        self.buf[start..to as usize].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = self.check(offset, bytes.len(), Self::WRITE_SIZE)?;
        if let Some(address) = self.fail_writes_from {
            if offset as usize + bytes.len() > address as usize {
                return Err(FlashStubError::Injected);
            }
        }
        self.actions
            .borrow_mut()
            .push(Action::Write(offset, bytes.into()));

        for (t, f) in self.buf[start..start + bytes.len()]
            .iter_mut()
            .zip(bytes.iter())
        {
            *t &= *f;
        }

        Ok(())
    }
}
impl<const FLASH_SIZE: usize> Default for NorFlashStub<FLASH_SIZE> {
    fn default() -> Self {
        Self {
            buf: [0xff; FLASH_SIZE],
            actions: Rc::default(),
            fail_writes_from: None,
        }
    }
}
