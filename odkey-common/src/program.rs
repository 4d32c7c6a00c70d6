/// Flash page size of the reference target. The size header owns the first page.
pub const FLASH_PAGE_SIZE: usize = 4096;

/// Size of the flash region reserved for the program, header page included.
pub const FLASH_REGION_SIZE: usize = 1024 * 1024;

/// Largest program the flash backend can hold.
pub const FLASH_MAX_SIZE: u32 = (FLASH_REGION_SIZE - FLASH_PAGE_SIZE) as u32;

/// Largest program the RAM backend can hold.
pub const RAM_MAX_SIZE: u32 = 1024 * 1024;

/// Length of the little-endian size header preceding a committed program.
pub const SIZE_HEADER_LEN: usize = 4;
