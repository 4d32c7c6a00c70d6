//! Boot protocol keyboard reports and the queue that carries them to the USB task.

use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};
use odkey_common::opcodes::MAX_KEYS_PRESSED;

use crate::vm::KeyEmitter;

pub const KEYBOARD_REPORT_SIZE: usize = 2 + MAX_KEYS_PRESSED;

/// 8 byte boot keyboard report: modifier bits, a reserved byte, then up to six keycodes padded
/// with zeros.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keycodes: [u8; MAX_KEYS_PRESSED],
}

impl KeyboardReport {
    /// All keys released.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; MAX_KEYS_PRESSED],
        }
    }

    /// `None` if `keys` holds more than six keycodes.
    pub fn new(modifier: u8, keys: &[u8]) -> Option<Self> {
        if keys.len() > MAX_KEYS_PRESSED {
            return None;
        }
        let mut report = Self {
            modifier,
            ..Self::empty()
        };
        report.keycodes[..keys.len()].copy_from_slice(keys);
        Some(report)
    }

    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes.iter().all(|k| *k == 0)
    }

    pub fn as_bytes(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut bytes = [0; KEYBOARD_REPORT_SIZE];
        bytes[0] = self.modifier;
        bytes[1] = self.reserved;
        bytes[2..].copy_from_slice(&self.keycodes);
        bytes
    }
}

/// Queue of keyboard reports, filled by the VM and drained by whatever owns the HID endpoint.
pub struct ReportChannel<M: RawMutex, const N: usize> {
    channel: Channel<M, KeyboardReport, N>,
}

impl<M: RawMutex, const N: usize> Default for ReportChannel<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> ReportChannel<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// A [KeyEmitter] feeding this queue. Sending waits while the queue is full.
    pub fn emitter(&self) -> ReportEmitter<'_, M, N> {
        ReportEmitter { channel: self }
    }

    pub async fn receive(&self) -> KeyboardReport {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<KeyboardReport> {
        self.channel.try_receive().ok()
    }
}

pub struct ReportEmitter<'c, M: RawMutex, const N: usize> {
    channel: &'c ReportChannel<M, N>,
}

impl<M: RawMutex, const N: usize> KeyEmitter for ReportEmitter<'_, M, N> {
    async fn send_keys(&mut self, modifier: u8, keys: &[u8]) -> bool {
        match KeyboardReport::new(modifier, keys) {
            Some(report) => {
                self.channel.channel.send(report).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "report_test.rs"]
mod test;
