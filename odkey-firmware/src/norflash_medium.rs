use embedded_storage::nor_flash::{self, NorFlash};
use odkey_common::program::{FLASH_PAGE_SIZE, FLASH_REGION_SIZE, SIZE_HEADER_LEN};

use crate::storage::{Medium, StorageError};

/// Program storage in a region of NOR flash.
///
/// The first `PAGE_SIZE` bytes of the region hold the little-endian size header; program bytes
/// start on the next page. Incoming chunks are gathered into a page sized cache and written a
/// page at a time, so the tail of the last page is padding (`0xff`).
pub struct NorflashMedium<
    'f,
    F: NorFlash,
    const BASE: usize,
    const SIZE: usize,
    const PAGE_SIZE: usize,
> {
    flash: &'f mut F,
    write_cache: [u8; PAGE_SIZE],
    cache_offset: u32,
}

/// The reference target's program region at `BASE`: [FLASH_REGION_SIZE] bytes in
/// [FLASH_PAGE_SIZE] pages.
pub type ProgramFlashMedium<'f, F, const BASE: usize> =
    NorflashMedium<'f, F, BASE, FLASH_REGION_SIZE, FLASH_PAGE_SIZE>;

const fn assert_medium_params<const BASE: usize, const SIZE: usize, const PAGE_SIZE: usize>(
    read_size: usize,
    write_size: usize,
    erase_size: usize,
) -> u32 {
    assert!(read_size == 1);
    assert!(PAGE_SIZE >= SIZE_HEADER_LEN);
    assert!(PAGE_SIZE % write_size == 0);
    assert!(PAGE_SIZE % erase_size == 0);
    assert!(BASE % PAGE_SIZE == 0);
    assert!(SIZE % PAGE_SIZE == 0);
    assert!(SIZE > PAGE_SIZE);
    assert!(SIZE - PAGE_SIZE <= u32::MAX as usize);
    (SIZE - PAGE_SIZE) as u32
}

fn map_flash_error(err: impl nor_flash::NorFlashError) -> StorageError {
    match err.kind() {
        nor_flash::NorFlashErrorKind::NotAligned => StorageError::NotAligned,
        nor_flash::NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
        _ => StorageError::Flash,
    }
}

impl<'f, F: NorFlash, const BASE: usize, const SIZE: usize, const PAGE_SIZE: usize>
    NorflashMedium<'f, F, BASE, SIZE, PAGE_SIZE>
{
    const CAPACITY: u32 =
        assert_medium_params::<BASE, SIZE, PAGE_SIZE>(F::READ_SIZE, F::WRITE_SIZE, F::ERASE_SIZE);
    const DATA_START: u32 = (BASE + PAGE_SIZE) as u32;
    const HEADER_WRITE_LEN: usize = SIZE_HEADER_LEN.div_ceil(F::WRITE_SIZE) * F::WRITE_SIZE;

    pub fn new(flash: &'f mut F) -> Self {
        Self {
            flash,
            write_cache: [0xff; PAGE_SIZE],
            cache_offset: u32::MAX,
        }
    }

    const fn align_start_page(offset: u32) -> u32 {
        offset - (offset % PAGE_SIZE as u32)
    }

    const fn align_next_page(offset: u32) -> u32 {
        Self::align_start_page(offset + PAGE_SIZE as u32 - 1)
    }

    fn commit_write_cache(&mut self) -> Result<(), StorageError> {
        if self.cache_offset != u32::MAX {
            let result = self
                .flash
                .write(Self::DATA_START + self.cache_offset, &self.write_cache)
                .map_err(map_flash_error);
            self.write_cache.fill(0xff);
            self.cache_offset = u32::MAX;
            result?;
        }
        Ok(())
    }
}

impl<F: NorFlash, const BASE: usize, const SIZE: usize, const PAGE_SIZE: usize> Medium
    for NorflashMedium<'_, F, BASE, SIZE, PAGE_SIZE>
{
    fn capacity(&self) -> u32 {
        Self::CAPACITY
    }

    fn begin(&mut self, expected_size: u32) -> Result<(), StorageError> {
        if expected_size == 0 || expected_size > Self::CAPACITY {
            return Err(StorageError::InvalidSize);
        }
        self.write_cache.fill(0xff);
        self.cache_offset = u32::MAX;

        let end = Self::DATA_START + Self::align_next_page(expected_size);
        self.flash
            .erase(BASE as u32, end)
            .map_err(map_flash_error)
    }

    fn append(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        if offset.saturating_add(data.len() as u32) > Self::CAPACITY {
            return Err(StorageError::OutOfBounds);
        }
        let mut offset = offset;
        let mut data = data;
        while !data.is_empty() {
            let page = Self::align_start_page(offset);
            if self.cache_offset != page {
                self.commit_write_cache()?;
                self.cache_offset = page;
            }
            let start = (offset - page) as usize;
            let n = data.len().min(PAGE_SIZE - start);
            self.write_cache[start..start + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            offset += n as u32;

            if start + n == PAGE_SIZE {
                self.commit_write_cache()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.commit_write_cache()
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        if offset.saturating_add(buf.len() as u32) > Self::CAPACITY {
            return Err(StorageError::OutOfBounds);
        }
        self.flash
            .read(Self::DATA_START + offset, buf)
            .map_err(map_flash_error)
    }

    fn read_header(&mut self) -> Result<u32, StorageError> {
        let mut header = [0; SIZE_HEADER_LEN];
        self.flash
            .read(BASE as u32, &mut header)
            .map_err(map_flash_error)?;
        match u32::from_le_bytes(header) {
            // erased flash
            u32::MAX => Ok(0),
            size => Ok(size),
        }
    }

    fn write_header(&mut self, size: u32) -> Result<(), StorageError> {
        self.commit_write_cache()?;
        let cache = &mut self.write_cache[..Self::HEADER_WRITE_LEN];
        cache.fill(0xff);
        cache[..SIZE_HEADER_LEN].copy_from_slice(&size.to_le_bytes());
        let result = self
            .flash
            .write(BASE as u32, &self.write_cache[..Self::HEADER_WRITE_LEN])
            .map_err(map_flash_error);
        self.write_cache.fill(0xff);
        result
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        self.write_cache.fill(0xff);
        self.cache_offset = u32::MAX;
        self.flash
            .erase(BASE as u32, (BASE + SIZE) as u32)
            .map_err(map_flash_error)
    }
}

#[cfg(test)]
#[path = "norflash_medium_test.rs"]
mod test;
