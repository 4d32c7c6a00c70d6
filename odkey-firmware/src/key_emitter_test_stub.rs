extern crate std;

use core::cell::RefCell;
use std::{rc::Rc, vec::Vec};

use crate::vm::{Clock, KeyEmitter};

pub type Report = (u8, Vec<u8>);

/// Records every report it is asked to send. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingEmitter {
    reports: Rc<RefCell<Vec<Report>>>,
    calls: Rc<RefCell<usize>>,
    fail_call: Option<usize>,
}

impl RecordingEmitter {
    /// An emitter whose `call`th send (counting from 0) fails and is not recorded.
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_call: Some(call),
            ..Default::default()
        }
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }

    pub fn last(&self) -> Option<Report> {
        self.reports.borrow().last().cloned()
    }

    pub fn clear(&self) {
        self.reports.borrow_mut().clear();
    }
}

impl KeyEmitter for RecordingEmitter {
    async fn send_keys(&mut self, modifier: u8, keys: &[u8]) -> bool {
        let call = {
            let mut calls = self.calls.borrow_mut();
            *calls += 1;
            *calls - 1
        };
        if self.fail_call == Some(call) {
            return false;
        }
        self.reports.borrow_mut().push((modifier, keys.to_vec()));
        true
    }
}

/// A clock that returns at once and remembers each requested delay.
#[derive(Clone, Default)]
pub struct InstantClock {
    delays: Rc<RefCell<Vec<u16>>>,
}

impl InstantClock {
    pub fn delays(&self) -> Vec<u16> {
        self.delays.borrow().clone()
    }
}

impl Clock for InstantClock {
    async fn delay_ms(&self, ms: u16) {
        self.delays.borrow_mut().push(ms);
    }
}
