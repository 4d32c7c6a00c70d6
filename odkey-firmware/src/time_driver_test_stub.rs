extern crate std;

use core::task::Waker;
use embassy_time_driver::Driver;
use std::time::{SystemTime, UNIX_EPOCH};

/// Host clock for `embassy-time`. Every wake up is delivered at once, so a timer future is
/// polled repeatedly until its deadline has passed.
struct HostTimeDriver;

impl Driver for HostTimeDriver {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default()
    }

    fn schedule_wake(&self, _at: u64, waker: &Waker) {
        waker.wake_by_ref();
    }
}

embassy_time_driver::time_driver_impl!(static TIME_DRIVER: HostTimeDriver = HostTimeDriver);
