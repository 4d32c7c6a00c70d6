extern crate std;

use embassy_futures::{
    block_on,
    select::{select, Either},
};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use std::{vec, vec::Vec};

use crate::{
    key_emitter_test_stub::InstantClock,
    vm_task::{TaskState, VmTask},
};

use super::*;

#[test]
fn report_bytes() {
    let report = KeyboardReport::new(0x22, &[4, 5]).unwrap();
    assert_eq!(report.as_bytes(), [0x22, 0, 4, 5, 0, 0, 0, 0]);
    assert!(!report.is_empty());

    assert_eq!(KeyboardReport::new(0, &[]).unwrap(), KeyboardReport::empty());
    assert!(KeyboardReport::empty().is_empty());
    assert_eq!(KeyboardReport::empty().as_bytes(), [0; KEYBOARD_REPORT_SIZE]);

    let full = KeyboardReport::new(0, &[1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(full.as_bytes(), [0, 0, 1, 2, 3, 4, 5, 6]);
    assert!(KeyboardReport::new(0, &[1, 2, 3, 4, 5, 6, 7]).is_none());
}

#[test]
fn emitter_queues_reports() {
    block_on(async {
        let channel = ReportChannel::<NoopRawMutex, 4>::new();
        let mut emitter = channel.emitter();

        assert!(emitter.send_keys(0x02, &[0x0b]).await);
        assert!(emitter.send_keys(0, &[]).await);
        assert!(!emitter.send_keys(0, &[1, 2, 3, 4, 5, 6, 7]).await);

        assert_eq!(channel.receive().await.as_bytes(), [2, 0, 0x0b, 0, 0, 0, 0, 0]);
        assert_eq!(channel.try_receive(), Some(KeyboardReport::empty()));
        assert_eq!(channel.try_receive(), None);
    });
}

#[test]
fn vm_task_feeds_channel() {
    const PROGRAM: &[u8] = &[
        0x10, 0x02, 0x02, 0x0b, 0x0c, // KEYDN shift H I
        0x11, 0x02, 0x01, 0x0b, // KEYUP shift H
        0x13, 0x05, 0x00, // WAIT 5
    ];

    block_on(async {
        let channel = ReportChannel::<NoopRawMutex, 2>::new();
        let task = VmTask::<NoopRawMutex, &[u8]>::new();
        let mut emitter = channel.emitter();
        let clock = InstantClock::default();

        let body = async {
            assert!(task.start_program(PROGRAM, None));
            let mut reports = Vec::new();
            while reports.len() < 3 {
                reports.push(channel.receive().await.as_bytes());
            }
            while task.state() != TaskState::Idle {
                embassy_futures::yield_now().await;
            }
            reports
        };

        let reports = match select(task.run(&mut emitter, &clock), body).await {
            Either::First(_) => unreachable!(),
            Either::Second(reports) => reports,
        };
        assert_eq!(
            reports,
            vec![
                [2, 0, 0x0b, 0x0c, 0, 0, 0, 0],
                [0, 0, 0x0c, 0, 0, 0, 0, 0],
                [0, 0, 0, 0, 0, 0, 0, 0],
            ]
        );
    });
}
