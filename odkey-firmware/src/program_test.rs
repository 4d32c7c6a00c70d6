extern crate std;

use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_futures::{
    block_on,
    select::{select, Either},
    yield_now,
};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use std::vec;

use crate::{
    flash_test_stub::NorFlashStub,
    key_emitter_test_stub::{InstantClock, RecordingEmitter},
    norflash_medium::NorflashMedium,
    ram_medium::RamMedium,
    storage::ProgramStore,
    vm::{Clock, ProgramMemory},
};

use super::*;

type FlashStub = NorFlashStub<8192>;
type FlashMedium<'f> = NorflashMedium<'f, FlashStub, 0, 4096, 256>;

struct StuckClock;
impl Clock for StuckClock {
    async fn delay_ms(&self, _ms: u16) {
        core::future::pending::<()>().await
    }
}

macro_rules! setup {
    ($program:ident, $emitter:ident, $clock:expr, $x:tt) => {
        block_on(async {
            let mut stub = FlashStub::default();
            let mut ram_buf = [0; 256];
            let flash = ProgramStore::<NoopRawMutex, _>::new(FlashMedium::new(&mut stub));
            let ram = ProgramStore::<NoopRawMutex, _>::new(RamMedium::new(&mut ram_buf));
            let task = VmTask::<NoopRawMutex, StoredProgram<'_>>::new();
            let $program = Program::new(&flash, &ram, &task);
            let $emitter = RecordingEmitter::default();
            let mut task_emitter = $emitter.clone();
            let clock = $clock;

            match select(task.run(&mut task_emitter, &clock), async { $x }).await {
                Either::First(_) => unreachable!(),
                Either::Second(()) => {}
            }
        })
    };
}

async fn store<M: RawMutex>(
    program: &Program<'_, M>,
    ty: ProgramType,
    data: &[u8],
    source: WriteSource,
) {
    program
        .write_start(ty, data.len() as u32, source)
        .await
        .unwrap();
    for chunk in data.chunks(3) {
        program.write_chunk(ty, chunk, source).unwrap();
    }
    program
        .write_finish(ty, data.len() as u32, source)
        .unwrap();
}

async fn wait_until_stopped<M: RawMutex>(program: &Program<'_, M>) {
    // let the task pick the program up first
    yield_now().await;
    while program.is_running() {
        yield_now().await;
    }
}

const PRESS_AND_WAIT: &[u8] = &[
    0x10, 0x00, 0x01, 0x04, // KEYDN A
    0x13, 0xe8, 0x03, // WAIT 1000
];

#[test]
fn execute_ram_program() {
    static DONE: AtomicUsize = AtomicUsize::new(0);
    fn done() {
        DONE.fetch_add(1, Ordering::SeqCst);
    }

    setup!(program, emitter, InstantClock::default(), {
        store(&program, ProgramType::Ram, PRESS_AND_WAIT, WriteSource::Http).await;
        assert_eq!(program.get(ProgramType::Ram).unwrap().len(), 7);
        assert!(program.get(ProgramType::Flash).is_none());

        program.execute(ProgramType::Ram, Some(&done)).unwrap();
        wait_until_stopped(&program).await;

        assert_eq!(emitter.reports(), vec![(0, vec![4]), (0, vec![])]);
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn execute_flash_program() {
    setup!(program, emitter, InstantClock::default(), {
        store(&program, ProgramType::Flash, PRESS_AND_WAIT, WriteSource::Usb).await;

        program.execute(ProgramType::Flash, None).unwrap();
        wait_until_stopped(&program).await;

        assert_eq!(emitter.reports(), vec![(0, vec![4]), (0, vec![])]);
    });
}

#[test]
fn execute_without_program() {
    setup!(program, emitter, InstantClock::default(), {
        assert_eq!(
            program.execute(ProgramType::Flash, None),
            Err(ExecuteError::NoProgram)
        );

        program
            .write_start(ProgramType::Ram, 4, WriteSource::Usb)
            .await
            .unwrap();
        program
            .write_chunk(ProgramType::Ram, &[0x12, 0x12], WriteSource::Usb)
            .unwrap();
        assert_eq!(
            program.execute(ProgramType::Ram, None),
            Err(ExecuteError::NoProgram)
        );
        assert!(emitter.reports().is_empty());
    });
}

#[test]
fn execute_while_running() {
    setup!(program, emitter, StuckClock, {
        store(&program, ProgramType::Ram, PRESS_AND_WAIT, WriteSource::Usb).await;
        program.execute(ProgramType::Ram, None).unwrap();
        while !program.is_running() {
            yield_now().await;
        }

        assert_eq!(
            program.execute(ProgramType::Ram, None),
            Err(ExecuteError::AlreadyRunning)
        );

        assert!(program.halt().await);
        assert!(!program.is_running());
        assert_eq!(emitter.last(), Some((0, vec![])));
        assert!(!program.halt().await);
    });
}

#[test]
fn write_start_halts_running_program() {
    static DONE: AtomicUsize = AtomicUsize::new(0);
    fn done() {
        DONE.fetch_add(1, Ordering::SeqCst);
    }

    setup!(program, emitter, StuckClock, {
        store(&program, ProgramType::Flash, PRESS_AND_WAIT, WriteSource::Usb).await;
        program.execute(ProgramType::Flash, Some(&done)).unwrap();
        while emitter.reports().is_empty() {
            yield_now().await;
        }
        assert!(program.is_running());

        program
            .write_start(ProgramType::Ram, 3, WriteSource::Http)
            .await
            .unwrap();

        assert!(!program.is_running());
        assert_eq!(emitter.reports(), vec![(0, vec![4]), (0, vec![])]);
        assert_eq!(DONE.load(Ordering::SeqCst), 0);
        assert_eq!(program.write_state(ProgramType::Ram), SessionState::Writing);
        assert_eq!(program.write_state(ProgramType::Flash), SessionState::Idle);
    });
}

#[test]
fn write_start_drops_pending_program() {
    setup!(program, emitter, InstantClock::default(), {
        store(&program, ProgramType::Ram, PRESS_AND_WAIT, WriteSource::Usb).await;
        program.execute(ProgramType::Ram, None).unwrap();

        program
            .write_start(ProgramType::Ram, 1, WriteSource::Usb)
            .await
            .unwrap();
        yield_now().await;
        yield_now().await;

        assert!(!program.is_running());
        assert!(emitter.reports().is_empty());
    });
}

#[test]
fn session_progress() {
    setup!(program, emitter, InstantClock::default(), {
        program
            .write_start(ProgramType::Flash, 100, WriteSource::Usb)
            .await
            .unwrap();
        program
            .write_chunk(ProgramType::Flash, &[0x12; 60], WriteSource::Usb)
            .unwrap();

        assert_eq!(program.bytes_written(ProgramType::Flash), 60);
        assert_eq!(program.expected_size(ProgramType::Flash), 100);
        assert_eq!(program.bytes_written(ProgramType::Ram), 0);

        // a transport clamps its last 60 byte chunk to what is left
        let remaining = program.expected_size(ProgramType::Flash)
            - program.bytes_written(ProgramType::Flash);
        program
            .write_chunk(
                ProgramType::Flash,
                &[0x12; 60][..remaining as usize],
                WriteSource::Usb,
            )
            .unwrap();
        program
            .write_finish(ProgramType::Flash, 100, WriteSource::Usb)
            .unwrap();
        assert_eq!(program.get(ProgramType::Flash).unwrap().len(), 100);
        assert!(emitter.reports().is_empty());
    });
}

#[test]
fn erase_stops_running_program() {
    setup!(program, emitter, InstantClock::default(), {
        let mut data = vec![0x10, 0x00, 0x01, 0x04];
        // a long run of WAIT 0 to erase in the middle of
        for _ in 0..50 {
            data.extend_from_slice(&[0x13, 0x00, 0x00]);
        }
        store(&program, ProgramType::Ram, &data, WriteSource::Usb).await;
        program.execute(ProgramType::Ram, None).unwrap();
        while emitter.reports().is_empty() {
            yield_now().await;
        }

        program.erase(ProgramType::Ram).unwrap();
        wait_until_stopped(&program).await;

        assert!(program.get(ProgramType::Ram).is_none());
        assert_eq!(emitter.reports(), vec![(0, vec![4]), (0, vec![])]);
        assert_eq!(
            program.execute(ProgramType::Ram, None),
            Err(ExecuteError::NoProgram)
        );
    });
}

#[test]
fn type_names() {
    use std::string::ToString;

    assert_eq!(ProgramType::Flash.to_string(), "flash");
    assert_eq!(ProgramType::Ram.to_string(), "RAM");
}
