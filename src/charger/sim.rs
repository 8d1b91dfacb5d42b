//! Simulated connector hardware: a shared state cell the host (or a test)
//! pokes and the FSM polls. Stands in until real control-pilot, relay and
//! reader drivers exist.

use super::connector::{ConnectorPort, CpStatus};
use log::info;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub struct SimState {
    pub cp: CpStatus,
    pub fault: bool,
    pub meter_wh: i32,
    pub relay_closed: bool,
    rfid: VecDeque<String>,
}

impl SimState {
    /// Queues a card presentation for the next poll.
    pub fn present_tag(&mut self, uid: &str) {
        self.rfid.push_back(uid.into());
    }
}

pub struct SimPort {
    state: Rc<RefCell<SimState>>,
}

impl SimPort {
    pub fn new() -> (SimPort, Rc<RefCell<SimState>>) {
        let state = Rc::new(RefCell::new(SimState {
            cp: CpStatus::A,
            fault: false,
            meter_wh: 0,
            relay_closed: false,
            rfid: VecDeque::new(),
        }));
        (
            SimPort {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

impl ConnectorPort for SimPort {
    fn cp_status(&self) -> CpStatus {
        self.state.borrow().cp
    }

    fn set_relay(&mut self, closed: bool) {
        info!("relay {}", if closed { "closed" } else { "open" });
        self.state.borrow_mut().relay_closed = closed;
    }

    fn read_rfid(&mut self) -> Option<String> {
        self.state.borrow_mut().rfid.pop_front()
    }

    fn meter_wh(&self) -> i32 {
        self.state.borrow().meter_wh
    }

    fn faulty(&self) -> bool {
        self.state.borrow().fault
    }
}
