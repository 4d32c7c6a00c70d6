//! ODKeyScript bytecode opcodes.
//!
//! Each instruction is a one byte opcode followed by its little-endian operands.

/// `KEYDN modifier:u8 count:u8 keys:[u8; count]`
pub const KEYDN: u8 = 0x10;
/// `KEYUP modifier:u8 count:u8 keys:[u8; count]`
pub const KEYUP: u8 = 0x11;
/// `KEYUP_ALL`
pub const KEYUP_ALL: u8 = 0x12;
/// `WAIT ms:u16`
pub const WAIT: u8 = 0x13;
/// `SET_COUNTER id:u8 value:u16`
pub const SET_COUNTER: u8 = 0x14;
/// `DEC id:u8`
pub const DEC: u8 = 0x15;
/// `JNZ address:u32`
pub const JNZ: u8 = 0x16;

/// The most keys a single KEYDN/KEYUP may name; also the HID boot report limit.
pub const MAX_KEYS_PRESSED: usize = 6;

/// Number of 16 bit counter registers.
pub const MAX_COUNTERS: usize = 256;

/// Returns the assembler mnemonic for `opcode`.
///
/// ```
/// use odkey_common::opcodes;
///
/// assert_eq!(opcodes::mnemonic(opcodes::JNZ), Some("JNZ"));
/// assert_eq!(opcodes::mnemonic(0x42), None);
/// ```
pub fn mnemonic(opcode: u8) -> Option<&'static str> {
    Some(match opcode {
        KEYDN => "KEYDN",
        KEYUP => "KEYUP",
        KEYUP_ALL => "KEYUP_ALL",
        WAIT => "WAIT",
        SET_COUNTER => "SET_COUNTER",
        DEC => "DEC",
        JNZ => "JNZ",
        _ => return None,
    })
}
