extern crate std;

use embassy_futures::block_on;
use embassy_time::{Duration, Instant};

use crate::vm::{Clock, SystemClock};

#[cfg(feature = "defmt")]
#[defmt::global_logger]
struct Logger;

#[cfg(feature = "defmt")]
unsafe impl defmt::Logger for Logger {
    fn acquire() {}

    unsafe fn release() {}

    unsafe fn write(_bytes: &[u8]) {}

    unsafe fn flush() {}
}

#[test]
fn system_clock_delay() {
    block_on(async {
        let start = Instant::now();
        SystemClock.delay_ms(3).await;
        assert!(Instant::now() - start >= Duration::from_millis(3));

        let start = Instant::now();
        SystemClock.delay_ms(0).await;
        assert!(Instant::now() - start < Duration::from_millis(500));
    });
}
