//! The message engine: a bounded, poll-driven, single-in-flight
//! request/response pipeline.
//!
//! Each [`step`](Ocpp::step) drains at most one inbound frame, sweeps
//! response timeouts, transmits at most one outbound message, synthesizes a
//! Heartbeat when the link is idle, and promotes deferred messages whose
//! timer elapsed. All work happens inside `step`; between calls the engine
//! is inert.

use crate::config::Configuration;
use crate::error::Error;
use crate::message::{core, Message, MessageKind, Payload, Role, MESSAGE_ID_MAXLEN};
use crate::platform::Platform;
use crate::pool::{List, Pool, QueueId};
use log::{debug, warn};

/// Response deadline for messages without a dedicated retry policy.
pub const DEFAULT_TX_TIMEOUT_SEC: u64 = 5;
/// Retries granted to messages outside the transaction budget.
pub const DEFAULT_TX_RETRIES: u32 = 1;

const SNAPSHOT_MAGIC: u32 = 0x4f43_5050; // "OCPP"
const SNAPSHOT_VERSION: u16 = 1;
const SNAPSHOT_HEADER_LEN: usize = 8;

/// Invoked after every receive attempt that was not [`Error::NoMessage`]:
/// `(Ok, Some(msg))` for a routed inbound, `(Err(NoLink), Some(msg))` for an
/// unmatched response, `(Err(_), None)` for a transport failure.
pub type EventCallback = Box<dyn FnMut(Result<(), Error>, Option<&Message>)>;

pub struct Ocpp {
    platform: Box<dyn Platform>,
    callback: Option<EventCallback>,
    config: Configuration,
    pool: Pool,
    ready: List,
    wait: List,
    timer: List,
    /// Clock reading at the last successful transmit.
    last_tx: u64,
    /// Clock reading at the last successful receive.
    last_rx: u64,
}

impl Ocpp {
    /// Builds an engine with freshly defaulted configuration. The callback
    /// observes inbound traffic; a host that only pushes requests may pass
    /// `None`.
    pub fn new(platform: Box<dyn Platform>, callback: Option<EventCallback>) -> Self {
        Ocpp {
            platform,
            callback,
            config: Configuration::new(),
            pool: Pool::new(),
            ready: List::new(QueueId::Ready),
            wait: List::new(QueueId::Wait),
            timer: List::new(QueueId::Timer),
            last_tx: 0,
            last_rx: 0,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    pub fn now(&self) -> u64 {
        self.platform.now()
    }

    /// Enqueues a Call. The correlation id comes from the platform id
    /// generator. Heartbeats are refused; the engine emits those itself.
    pub fn push_request(&mut self, payload: Payload) -> Result<(), Error> {
        self.push_request_defer(payload, 0)
    }

    /// Same as [`push_request`](Self::push_request) but held on the timer
    /// list for `timer_sec` seconds before becoming sendable.
    pub fn push_request_defer(&mut self, payload: Payload, timer_sec: u64) -> Result<(), Error> {
        let kind = payload.kind().ok_or(Error::InvalidArgument)?;
        if kind == MessageKind::Heartbeat {
            return Err(Error::AlreadyHandled);
        }

        let mut id = self.platform.generate_message_id();
        id.truncate(MESSAGE_ID_MAXLEN);
        let index = self
            .pool
            .alloc(Message {
                id,
                role: Role::Call,
                kind,
                payload,
            })
            .ok_or(Error::NoMemory)?;

        if timer_sec == 0 {
            self.pool.push_back(&mut self.ready, index);
        } else {
            self.pool.slot_mut(index).expiry = self.platform.now() + timer_sec;
            self.pool.push_back(&mut self.timer, index);
        }
        Ok(())
    }

    /// Enqueues a CallResult or CallError answering the inbound Call `req`.
    /// The correlation id is copied whole from the request.
    pub fn push_response(&mut self, req: &Message, payload: Payload) -> Result<(), Error> {
        let role = match payload {
            Payload::Error(_) => Role::CallError,
            _ => {
                if payload.kind() != Some(req.kind) {
                    return Err(Error::InvalidArgument);
                }
                Role::CallResult
            }
        };

        let mut id = req.id.clone();
        id.truncate(MESSAGE_ID_MAXLEN);
        let index = self
            .pool
            .alloc(Message {
                id,
                role,
                kind: req.kind,
                payload,
            })
            .ok_or(Error::NoMemory)?;
        self.pool.push_back(&mut self.ready, index);
        Ok(())
    }

    /// Validated BootNotification push: model and vendor are required.
    pub fn send_boot_notification(&mut self, msg: core::BootNotification) -> Result<(), Error> {
        if msg.charge_point_model.is_empty() || msg.charge_point_vendor.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.push_request(Payload::BootNotification(msg))
    }

    /// Validated DataTransfer push: the vendor id is required.
    pub fn send_data_transfer(&mut self, msg: core::DataTransfer) -> Result<(), Error> {
        if msg.vendor_id.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.push_request(Payload::DataTransfer(msg))
    }

    /// Kind of the outstanding Call with this correlation id, if any. Outer
    /// decoders use this to pick the parser for an incoming CallResult body.
    pub fn kind_of_pending(&self, id: &str) -> Option<MessageKind> {
        self.pool
            .find_by_id(&self.wait, id)
            .map(|i| self.pool.msg(i).kind)
    }

    /// Clock reading at the last successful receive, for link supervision.
    pub fn last_received(&self) -> u64 {
        self.last_rx
    }

    /// One scheduling tick. Transient transport trouble never propagates to
    /// the caller; it surfaces through the event callback instead.
    pub fn step(&mut self) {
        self.receive();

        let now = self.platform.now();
        let _ = self.process_queued(now);
        self.process_periodic(now);
        self.process_timer(now);
    }

    fn receive(&mut self) {
        let received = match self.platform.recv() {
            Ok(msg) => Some(msg),
            Err(Error::NoMessage) => return,
            Err(err) => {
                self.notify(Err(err), None);
                return;
            }
        };
        let msg = received.as_ref().unwrap();
        self.last_rx = self.platform.now();

        let outcome = match msg.role {
            // A central-initiated request: routed to the host through the
            // callback, which is expected to push_response eventually.
            Role::Call => Ok(()),
            Role::CallResult | Role::CallError => {
                match self.pool.find_by_id(&self.wait, &msg.id) {
                    Some(index) => {
                        self.pool.remove(&mut self.wait, index);
                        self.pool.free(index);
                        Ok(())
                    }
                    None => {
                        warn!("response {} matches no outstanding call", msg.id);
                        Err(Error::NoLink)
                    }
                }
            }
            Role::None | Role::Alloc => Ok(()),
        };

        self.notify(outcome, received.as_ref());
    }

    fn notify(&mut self, outcome: Result<(), Error>, msg: Option<&Message>) {
        if let Some(cb) = self.callback.as_mut() {
            cb(outcome, msg);
        }
    }

    /// Timeout sweep plus at most one transmission.
    fn process_queued(&mut self, now: u64) -> Result<(), Error> {
        self.sweep_timeouts(now);

        if !self.wait.is_empty() {
            // Strict single-in-flight: the previous call still awaits its
            // response.
            return Err(Error::Busy);
        }
        if let Some(head) = self.ready.head() {
            self.transmit(head, now);
        }
        Ok(())
    }

    fn sweep_timeouts(&mut self, now: u64) {
        for index in self.pool.indices(&self.wait) {
            if self.pool.slot(index).expiry > now {
                continue;
            }
            self.pool.remove(&mut self.wait, index);
            if self.should_drop(index) {
                debug!(
                    "dropping {} after {} attempts",
                    self.pool.msg(index).kind.as_str(),
                    self.pool.slot(index).attempts
                );
                self.pool.free(index);
            } else {
                // Expired retries go to the front so they precede fresh
                // pushes.
                self.pool.push_front(&mut self.ready, index);
            }
        }
    }

    fn should_drop(&self, index: usize) -> bool {
        let kind = self.pool.msg(index).kind;
        let attempts = self.pool.slot(index).attempts;

        if kind == MessageKind::BootNotification {
            return false;
        }
        if kind.is_transaction_related() {
            let max = self
                .config
                .get_int("TransactionMessageAttempts")
                .unwrap_or(1)
                .max(1) as u32;
            return attempts >= max;
        }
        attempts > DEFAULT_TX_RETRIES
    }

    fn message_timeout(&self, kind: MessageKind, attempts: u32, now: u64) -> u64 {
        if kind.is_transaction_related() {
            let interval = self
                .config
                .get_int("TransactionMessageRetryInterval")
                .unwrap_or(DEFAULT_TX_TIMEOUT_SEC as i32) as u64;
            return now + interval * attempts as u64;
        }
        if kind == MessageKind::BootNotification || kind == MessageKind::Heartbeat {
            let interval = self.config.get_int("HeartbeatInterval").unwrap_or(0) as u64;
            return now + interval;
        }
        now + DEFAULT_TX_TIMEOUT_SEC
    }

    fn transmit(&mut self, index: usize, now: u64) {
        let kind = self.pool.msg(index).kind;
        let role = self.pool.msg(index).role;
        self.pool.slot_mut(index).attempts += 1;
        let attempts = self.pool.slot(index).attempts;
        let expiry = self.message_timeout(kind, attempts, now);
        self.pool.slot_mut(index).expiry = expiry;

        self.pool.remove(&mut self.ready, index);

        match self.platform.send(self.pool.msg(index)) {
            Ok(()) => {
                debug!("tx {} attempt {}", kind.as_str(), attempts);
                match role {
                    Role::Call => self.pool.push_back(&mut self.wait, index),
                    _ => self.pool.free(index),
                }
                self.last_tx = now;
            }
            Err(_) => {
                // Back off and park on the wait list; the timeout sweep
                // retries or drops it.
                self.pool.slot_mut(index).expiry =
                    now + DEFAULT_TX_TIMEOUT_SEC * attempts as u64;
                self.pool.push_back(&mut self.wait, index);
            }
        }
    }

    fn process_periodic(&mut self, now: u64) {
        if !self.should_send_heartbeat(now) {
            return;
        }
        let mut id = self.platform.generate_message_id();
        id.truncate(MESSAGE_ID_MAXLEN);
        let Some(index) = self.pool.alloc(Message {
            id,
            role: Role::Call,
            kind: MessageKind::Heartbeat,
            payload: Payload::Heartbeat(core::Heartbeat {}),
        }) else {
            return;
        };
        self.pool.push_back(&mut self.ready, index);
        let _ = self.process_queued(now);
    }

    fn should_send_heartbeat(&self, now: u64) -> bool {
        let interval = self.config.get_int("HeartbeatInterval").unwrap_or(0);
        if interval <= 0 {
            return false;
        }
        self.ready.is_empty()
            && self.wait.is_empty()
            && now.saturating_sub(self.last_tx) >= interval as u64
    }

    fn process_timer(&mut self, now: u64) {
        for index in self.pool.indices(&self.timer) {
            if self.pool.slot(index).expiry > now {
                continue;
            }
            self.pool.remove(&mut self.timer, index);
            self.pool.push_back(&mut self.ready, index);
        }
    }

    /// Size of the buffer [`snapshot_to`](Self::snapshot_to) fills.
    pub fn snapshot_len() -> usize {
        SNAPSHOT_HEADER_LEN + Configuration::total_size()
    }

    /// Writes a validated-header snapshot: magic, version, pool length, then
    /// the configuration pool verbatim.
    pub fn snapshot_to(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < Self::snapshot_len() {
            return Err(Error::BadSize);
        }
        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&(Configuration::total_size() as u16).to_le_bytes());
        self.config.snapshot_to(&mut buf[SNAPSHOT_HEADER_LEN..])
    }

    /// Restores a snapshot, supplanting a fresh `new`: configuration comes
    /// from the dump and all volatile engine state is reset. A bad header
    /// leaves the engine untouched.
    pub fn snapshot_from(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() != Self::snapshot_len() {
            return Err(Error::BadSnapshot);
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let version = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let len = u16::from_le_bytes(data[6..8].try_into().unwrap());
        if magic != SNAPSHOT_MAGIC
            || version != SNAPSHOT_VERSION
            || len as usize != Configuration::total_size()
        {
            return Err(Error::BadSnapshot);
        }

        self.config.snapshot_from(&data[SNAPSHOT_HEADER_LEN..])?;
        self.pool = Pool::new();
        self.ready = List::new(QueueId::Ready);
        self.wait = List::new(QueueId::Wait);
        self.timer = List::new(QueueId::Timer);
        self.last_tx = 0;
        self.last_rx = 0;
        Ok(())
    }

    #[cfg(test)]
    fn queue_lens(&self) -> (usize, usize, usize) {
        (self.ready.len(), self.wait.len(), self.timer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::core::{
        ChangeConfiguration, ChangeConfigurationConf, DataTransfer, HeartbeatConf,
        StartTransaction,
    };
    use crate::message::{ConfigStatus, RpcError, RpcErrorCode};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Shared {
        now: u64,
        send_results: VecDeque<Result<(), Error>>,
        sent: Vec<Message>,
        rx: VecDeque<Result<Message, Error>>,
        next_id: u32,
    }

    struct ScriptedPlatform(Rc<RefCell<Shared>>);

    impl Platform for ScriptedPlatform {
        fn send(&mut self, msg: &Message) -> Result<(), Error> {
            let mut s = self.0.borrow_mut();
            s.sent.push(msg.clone());
            s.send_results.pop_front().unwrap_or(Ok(()))
        }

        fn recv(&mut self) -> Result<Message, Error> {
            self.0
                .borrow_mut()
                .rx
                .pop_front()
                .unwrap_or(Err(Error::NoMessage))
        }

        fn generate_message_id(&mut self) -> String {
            let mut s = self.0.borrow_mut();
            s.next_id += 1;
            format!("id-{:04}", s.next_id)
        }

        fn now(&self) -> u64 {
            self.0.borrow().now
        }
    }

    type Event = (Result<(), Error>, Option<Message>);

    struct Rig {
        ocpp: Ocpp,
        shared: Rc<RefCell<Shared>>,
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl Rig {
        fn new() -> Self {
            let shared = Rc::new(RefCell::new(Shared::default()));
            let events: Rc<RefCell<Vec<Event>>> = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&events);
            let callback: EventCallback = Box::new(move |outcome, msg| {
                sink.borrow_mut().push((outcome, msg.cloned()));
            });
            let ocpp = Ocpp::new(
                Box::new(ScriptedPlatform(Rc::clone(&shared))),
                Some(callback),
            );
            Rig {
                ocpp,
                shared,
                events,
            }
        }

        fn step_at(&mut self, now: u64) {
            self.shared.borrow_mut().now = now;
            self.ocpp.step();
        }

        fn fail_next_send(&mut self) {
            self.shared
                .borrow_mut()
                .send_results
                .push_back(Err(Error::Transport));
        }

        fn sent(&self) -> Vec<(Role, MessageKind)> {
            self.shared
                .borrow()
                .sent
                .iter()
                .map(|m| (m.role, m.kind))
                .collect()
        }

        fn last_sent(&self) -> Message {
            self.shared.borrow().sent.last().cloned().unwrap()
        }

        fn deliver(&mut self, msg: Message) {
            self.shared.borrow_mut().rx.push_back(Ok(msg));
        }

        fn heartbeat_interval(&self) -> u64 {
            self.ocpp.config().get_int("HeartbeatInterval").unwrap() as u64
        }
    }

    fn data_transfer() -> DataTransfer {
        DataTransfer {
            vendor_id: "VendorID".into(),
            ..Default::default()
        }
    }

    #[test]
    fn boot_notification_is_never_dropped() {
        let mut rig = Rig::new();
        rig.ocpp
            .send_boot_notification(core::BootNotification {
                charge_point_model: "Model".into(),
                charge_point_vendor: "Vendor".into(),
                ..Default::default()
            })
            .unwrap();

        let interval = rig.heartbeat_interval();
        for i in 0..100u64 {
            rig.fail_next_send();
            rig.step_at(interval * i);
        }

        let sent = rig.sent();
        assert_eq!(sent.len(), 100);
        assert!(sent
            .iter()
            .all(|&(r, k)| r == Role::Call && k == MessageKind::BootNotification));
        // Still alive on the wait list, poised for the next retry.
        let (_, wait, _) = rig.ocpp.queue_lens();
        assert_eq!(wait, 1);
    }

    #[test]
    fn boot_notification_requires_model_and_vendor() {
        let mut rig = Rig::new();
        let err = rig
            .ocpp
            .send_boot_notification(core::BootNotification::default())
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    #[test]
    fn plain_messages_are_dropped_after_one_retry() {
        let mut rig = Rig::new();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();

        rig.fail_next_send();
        rig.step_at(0);
        assert_eq!(rig.sent().len(), 1);

        rig.fail_next_send();
        rig.step_at(DEFAULT_TX_TIMEOUT_SEC);
        assert_eq!(rig.sent().len(), 2);

        // Backed off past now: nothing to send, nothing dropped yet.
        rig.step_at(DEFAULT_TX_TIMEOUT_SEC * 2);
        assert_eq!(rig.sent().len(), 2);

        // Second timeout sweep that reaches it frees the slot.
        rig.step_at(DEFAULT_TX_TIMEOUT_SEC * 3);
        assert_eq!(rig.sent().len(), 2);
        assert_eq!(rig.ocpp.queue_lens(), (0, 0, 0));
    }

    #[test]
    fn heartbeat_fills_idle_intervals() {
        let mut rig = Rig::new();
        let interval = rig.heartbeat_interval();

        rig.step_at(interval);
        assert_eq!(
            rig.sent(),
            vec![(Role::Call, MessageKind::Heartbeat)],
        );
        let call = rig.last_sent();

        rig.deliver(Message {
            id: call.id.clone(),
            role: Role::CallResult,
            kind: MessageKind::Heartbeat,
            payload: Payload::HeartbeatConf(HeartbeatConf { current_time: 0 }),
        });
        rig.step_at(interval * 2 - 1);
        {
            let events = rig.events.borrow();
            let (outcome, msg) = events.last().unwrap();
            assert_eq!(*outcome, Ok(()));
            assert_eq!(msg.as_ref().unwrap().kind, MessageKind::Heartbeat);
        }
        assert_eq!(rig.sent().len(), 1);

        rig.step_at(interval * 2);
        assert_eq!(rig.sent().len(), 2);
        assert_eq!(rig.last_sent().kind, MessageKind::Heartbeat);
    }

    #[test]
    fn no_heartbeat_while_a_call_is_outstanding() {
        let mut rig = Rig::new();
        let interval = rig.heartbeat_interval();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();

        rig.step_at(interval);
        assert_eq!(rig.sent(), vec![(Role::Call, MessageKind::DataTransfer)]);
        let call = rig.last_sent();

        rig.deliver(Message {
            id: call.id.clone(),
            role: Role::CallResult,
            kind: MessageKind::DataTransfer,
            payload: Payload::DataTransferConf(core::DataTransferConf {
                status: crate::message::DataTransferStatus::Accepted,
                data: String::new(),
            }),
        });
        rig.step_at(interval * 2 - 1);
        {
            let events = rig.events.borrow();
            let (outcome, msg) = events.last().unwrap();
            assert_eq!(*outcome, Ok(()));
            assert_eq!(msg.as_ref().unwrap().kind, MessageKind::DataTransfer);
        }
        // The DataTransfer was the only transmission; no heartbeat slipped in.
        assert_eq!(rig.sent().len(), 1);
    }

    #[test]
    fn pool_exhaustion_then_transaction_takeover() {
        let mut rig = Rig::new();
        for _ in 0..8 {
            rig.ocpp.send_data_transfer(data_transfer()).unwrap();
        }
        assert_eq!(
            rig.ocpp.send_data_transfer(data_transfer()),
            Err(Error::NoMemory)
        );

        // Fail every send; the first DataTransfer burns its retry budget
        // over two sweeps and frees a slot at t=15.
        for _ in 0..3 {
            rig.fail_next_send();
        }
        rig.step_at(0);
        rig.step_at(5);
        rig.step_at(15);

        let start = StartTransaction {
            connector_id: 1,
            id_tag: "TAG".into(),
            meter_start: 0,
            timestamp: 15,
            ..Default::default()
        };
        rig.ocpp
            .push_request(Payload::StartTransaction(start))
            .unwrap();

        // Keep failing; every remaining DataTransfer drains, then the
        // StartTransaction reaches the wire and keeps retrying.
        let mut now = 15;
        for _ in 0..60 {
            now += 5;
            rig.fail_next_send();
            rig.step_at(now);
        }
        let kinds: Vec<MessageKind> = rig.sent().iter().map(|&(_, k)| k).collect();
        let first_start = kinds
            .iter()
            .position(|&k| k == MessageKind::StartTransaction)
            .expect("StartTransaction reached the wire");
        assert!(kinds[..first_start]
            .iter()
            .all(|&k| k == MessageKind::DataTransfer));
        let starts = kinds[first_start..]
            .iter()
            .filter(|&&k| k == MessageKind::StartTransaction)
            .count();
        assert!(starts >= 2, "StartTransaction retried, got {starts}");
    }

    #[test]
    fn unmatched_responses_surface_nolink() {
        let mut rig = Rig::new();
        rig.deliver(Message {
            id: "stranger".into(),
            role: Role::CallResult,
            kind: MessageKind::Heartbeat,
            payload: Payload::HeartbeatConf(HeartbeatConf { current_time: 0 }),
        });
        rig.step_at(0);
        let events = rig.events.borrow();
        let (outcome, msg) = events.last().unwrap();
        assert_eq!(*outcome, Err(Error::NoLink));
        assert_eq!(msg.as_ref().unwrap().id, "stranger");
    }

    #[test]
    fn heartbeat_pushes_are_refused() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.ocpp.push_request(Payload::Heartbeat(core::Heartbeat {})),
            Err(Error::AlreadyHandled)
        );
    }

    #[test]
    fn only_one_call_is_in_flight() {
        let mut rig = Rig::new();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();

        rig.step_at(0);
        rig.step_at(1);
        rig.step_at(2);
        // The second transfer waits for the first response or its timeout.
        assert_eq!(rig.sent().len(), 1);
    }

    #[test]
    fn deferred_pushes_wait_for_their_timer() {
        let mut rig = Rig::new();
        rig.ocpp
            .push_request_defer(Payload::DataTransfer(data_transfer()), 30)
            .unwrap();

        rig.step_at(0);
        rig.step_at(29);
        assert!(rig.sent().is_empty());

        // Promotion happens at the end of the tick; the transmission lands
        // on the next one.
        rig.step_at(30);
        assert!(rig.sent().is_empty());
        rig.step_at(31);
        assert_eq!(rig.sent(), vec![(Role::Call, MessageKind::DataTransfer)]);
    }

    #[test]
    fn inbound_calls_are_answered_with_the_same_id() {
        let mut rig = Rig::new();
        let long_id = "a".repeat(MESSAGE_ID_MAXLEN);
        rig.deliver(Message {
            id: long_id.clone(),
            role: Role::Call,
            kind: MessageKind::ChangeConfiguration,
            payload: Payload::ChangeConfiguration(ChangeConfiguration {
                key: "HeartbeatInterval".into(),
                value: "30".into(),
            }),
        });
        rig.step_at(0);
        let events = rig.events.borrow();
        let (outcome, msg) = events.last().unwrap();
        assert_eq!(*outcome, Ok(()));
        let call = msg.clone().unwrap();
        drop(events);

        rig.ocpp
            .push_response(
                &call,
                Payload::ChangeConfigurationConf(ChangeConfigurationConf {
                    status: ConfigStatus::Accepted,
                }),
            )
            .unwrap();
        rig.step_at(1);
        let sent = rig.last_sent();
        assert_eq!(sent.role, Role::CallResult);
        assert_eq!(sent.id, long_id);
        // Results are fire-and-forget: the slot is free again.
        assert_eq!(rig.ocpp.queue_lens(), (0, 0, 0));
    }

    #[test]
    fn call_errors_carry_the_request_kind() {
        let mut rig = Rig::new();
        let call = Message {
            id: "req-1".into(),
            role: Role::Call,
            kind: MessageKind::UnlockConnector,
            payload: Payload::UnlockConnector(core::UnlockConnector { connector_id: 1 }),
        };
        rig.ocpp
            .push_response(
                &call,
                Payload::Error(RpcError::new(RpcErrorCode::NotImplemented, "stub")),
            )
            .unwrap();
        rig.step_at(0);
        let sent = rig.last_sent();
        assert_eq!(sent.role, Role::CallError);
        assert_eq!(sent.kind, MessageKind::UnlockConnector);
        assert_eq!(sent.id, "req-1");
    }

    #[test]
    fn mismatched_response_payloads_are_rejected() {
        let mut rig = Rig::new();
        let call = Message {
            id: "req-2".into(),
            role: Role::Call,
            kind: MessageKind::UnlockConnector,
            payload: Payload::UnlockConnector(core::UnlockConnector { connector_id: 1 }),
        };
        let err = rig
            .ocpp
            .push_response(
                &call,
                Payload::ChangeConfigurationConf(ChangeConfigurationConf {
                    status: ConfigStatus::Accepted,
                }),
            )
            .unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    #[test]
    fn kind_of_pending_searches_the_wait_list() {
        let mut rig = Rig::new();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();
        rig.step_at(0);
        let id = rig.last_sent().id;
        assert_eq!(
            rig.ocpp.kind_of_pending(&id),
            Some(MessageKind::DataTransfer)
        );
        assert_eq!(rig.ocpp.kind_of_pending("nope"), None);
    }

    #[test]
    fn transaction_messages_use_the_configured_budget() {
        let mut rig = Rig::new();
        let retry = rig
            .ocpp
            .config()
            .get_int("TransactionMessageRetryInterval")
            .unwrap() as u64;
        rig.ocpp
            .push_request(Payload::StartTransaction(StartTransaction {
                connector_id: 1,
                id_tag: "TAG".into(),
                meter_start: 0,
                timestamp: 0,
                ..Default::default()
            }))
            .unwrap();

        // Sends succeed but no response ever comes; expiry grows linearly
        // with the attempt count.
        let mut now = 0;
        rig.step_at(now); // attempt 1, expiry = retry * 1
        for attempt in 1..3u64 {
            now += retry * attempt;
            rig.step_at(now);
        }
        assert_eq!(rig.sent().len(), 3);

        // The third expiry hits the TransactionMessageAttempts ceiling.
        now += retry * 3;
        rig.step_at(now);
        assert_eq!(rig.sent().len(), 3);
        assert_eq!(rig.ocpp.queue_lens(), (0, 0, 0));
    }

    #[test]
    fn transport_errors_reach_the_callback() {
        let mut rig = Rig::new();
        rig.shared
            .borrow_mut()
            .rx
            .push_back(Err(Error::Transport));
        rig.step_at(0);
        let events = rig.events.borrow();
        let (outcome, msg) = events.last().unwrap();
        assert_eq!(*outcome, Err(Error::Transport));
        assert!(msg.is_none());
    }

    #[test]
    fn snapshot_round_trips_and_validates() {
        let mut rig = Rig::new();
        rig.ocpp
            .config_mut()
            .set_int("HeartbeatInterval", 60)
            .unwrap();
        rig.ocpp.send_data_transfer(data_transfer()).unwrap();

        let mut snap = vec![0u8; Ocpp::snapshot_len()];
        rig.ocpp.snapshot_to(&mut snap).unwrap();

        let mut other = Rig::new();
        other.ocpp.snapshot_from(&snap).unwrap();
        assert_eq!(other.ocpp.config().get_int("HeartbeatInterval").unwrap(), 60);
        // Volatile state is not part of the snapshot.
        assert_eq!(other.ocpp.queue_lens(), (0, 0, 0));

        snap[0] ^= 0xff;
        assert_eq!(other.ocpp.snapshot_from(&snap), Err(Error::BadSnapshot));
        assert_eq!(
            other.ocpp.snapshot_from(&snap[1..]),
            Err(Error::BadSnapshot)
        );
    }
}
