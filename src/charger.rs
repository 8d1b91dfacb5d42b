//! The charge point proper: one engine, one FSM per physical connector, and
//! the dispatch of central-initiated commands.
//!
//! [`ChargePoint::step`] is the only entry the host calls. Each tick it runs
//! the engine (receive, timeout sweep, one send, heartbeat, timer), then
//! routes whatever the engine delivered, then advances every connector.

pub mod connector;
pub mod sim;

use crate::config::{Configuration, DataType};
use crate::engine::Ocpp;
use crate::error::Error;
use crate::message::{
    core, ConfigStatus, Message, Payload, RemoteStatus, Role, RpcError, RpcErrorCode,
};
use crate::platform::Platform;
use connector::{Connector, ConnectorPort};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Event = (Result<(), Error>, Option<Message>);

pub struct ChargePoint {
    ocpp: Ocpp,
    connectors: Vec<Connector>,
    inbox: Rc<RefCell<VecDeque<Event>>>,
}

impl ChargePoint {
    /// One connector per port, numbered from 1 as OCPP counts them.
    pub fn new(platform: Box<dyn Platform>, ports: Vec<Box<dyn ConnectorPort>>) -> Self {
        let inbox: Rc<RefCell<VecDeque<Event>>> = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&inbox);
        let ocpp = Ocpp::new(
            platform,
            Some(Box::new(move |outcome, msg| {
                sink.borrow_mut().push_back((outcome, msg.cloned()));
            })),
        );
        let connectors = ports
            .into_iter()
            .enumerate()
            .map(|(i, port)| Connector::new(i as i32 + 1, port))
            .collect();
        ChargePoint {
            ocpp,
            connectors,
            inbox,
        }
    }

    pub fn ocpp(&mut self) -> &mut Ocpp {
        &mut self.ocpp
    }

    pub fn connector(&self, index: usize) -> &Connector {
        &self.connectors[index]
    }

    /// One top-level tick: engine, inbound routing, then every connector.
    pub fn step(&mut self) {
        self.ocpp.step();

        loop {
            let event = self.inbox.borrow_mut().pop_front();
            let Some((outcome, msg)) = event else { break };
            match (outcome, msg) {
                (Ok(()), Some(msg)) => self.route(msg),
                (Err(err), msg) => {
                    warn!("inbound error: {err} ({:?})", msg.map(|m| m.kind));
                }
                (Ok(()), None) => {}
            }
        }

        for connector in &mut self.connectors {
            connector.step(&mut self.ocpp);
        }
    }

    fn route(&mut self, msg: Message) {
        match msg.role {
            Role::Call => self.handle_central_call(msg),
            Role::CallResult => self.handle_central_result(msg),
            Role::CallError => warn!("central rejected {}: {:?}", msg.id, msg.payload),
            _ => {}
        }
    }

    /// Central-initiated commands. RemoteStart/RemoteStop feed the FSM,
    /// configuration commands go straight to the store; the rest of the
    /// command surface answers NotImplemented until a real handler exists.
    fn handle_central_call(&mut self, msg: Message) {
        let response = match msg.payload.clone() {
            Payload::RemoteStartTransaction(req) => {
                let status = self.remote_start(&req);
                Payload::RemoteStartTransactionConf(core::RemoteStartTransactionConf { status })
            }
            Payload::RemoteStopTransaction(req) => {
                let status = self.remote_stop(req.transaction_id);
                Payload::RemoteStopTransactionConf(core::RemoteStopTransactionConf { status })
            }
            Payload::ChangeConfiguration(req) => {
                let status = self.change_configuration(&req);
                Payload::ChangeConfigurationConf(core::ChangeConfigurationConf { status })
            }
            Payload::GetConfiguration(req) => {
                Payload::GetConfigurationConf(self.get_configuration(&req))
            }
            other => {
                debug!("no handler for central {:?}", other.kind());
                Payload::Error(RpcError::new(
                    RpcErrorCode::NotImplemented,
                    "not handled by this charge point",
                ))
            }
        };
        if let Err(err) = self.ocpp.push_response(&msg, response) {
            warn!("response to {} not queued: {err}", msg.id);
        }
    }

    fn remote_start(&mut self, req: &core::RemoteStartTransaction) -> RemoteStatus {
        let target = match req.connector_id {
            Some(id) => self
                .connectors
                .iter_mut()
                .find(|c| c.id == id && c.can_remote_start()),
            None => self.connectors.iter_mut().find(|c| c.can_remote_start()),
        };
        match target {
            Some(connector) => {
                info!("remote start for {} on connector {}", req.id_tag, connector.id);
                connector.accept_remote_start(&req.id_tag);
                RemoteStatus::Accepted
            }
            None => RemoteStatus::Rejected,
        }
    }

    fn remote_stop(&mut self, transaction_id: i32) -> RemoteStatus {
        let target = self
            .connectors
            .iter_mut()
            .find(|c| c.session().transaction_id == Some(transaction_id));
        match target {
            Some(connector) => {
                connector.request_remote_stop();
                RemoteStatus::Accepted
            }
            None => RemoteStatus::Rejected,
        }
    }

    fn change_configuration(&mut self, req: &core::ChangeConfiguration) -> ConfigStatus {
        let config = self.ocpp.config_mut();
        let result = match Configuration::data_type(&req.key) {
            None => return ConfigStatus::NotSupported,
            Some(DataType::Bool) => match req.value.as_str() {
                "true" => config.set_bool(&req.key, true),
                "false" => config.set_bool(&req.key, false),
                _ => return ConfigStatus::Rejected,
            },
            Some(DataType::Int) => match req.value.parse::<i32>() {
                Ok(v) => config.set_int(&req.key, v),
                Err(_) => return ConfigStatus::Rejected,
            },
            Some(DataType::Csl) => match req.value.parse::<u32>() {
                Ok(v) => config.set_csl(&req.key, v),
                Err(_) => return ConfigStatus::Rejected,
            },
            Some(DataType::Str) => config.set_str(&req.key, &req.value),
        };
        match result {
            Ok(()) => ConfigStatus::Accepted,
            Err(_) => ConfigStatus::Rejected,
        }
    }

    fn get_configuration(&mut self, req: &core::GetConfiguration) -> core::GetConfigurationConf {
        if !Configuration::has(&req.key) || !Configuration::is_readable(&req.key) {
            return core::GetConfigurationConf {
                configuration_key: Vec::new(),
                unknown_key: req.key.clone(),
            };
        }
        let value = self.ocpp.config().value_string(&req.key).ok();
        core::GetConfigurationConf {
            configuration_key: vec![core::KeyValue {
                key: req.key.clone(),
                readonly: !Configuration::is_writable(&req.key),
                value,
            }],
            unknown_key: String::new(),
        }
    }

    /// Responses to our own calls that the charge point itself acts on.
    fn handle_central_result(&mut self, msg: Message) {
        match msg.payload {
            Payload::BootNotificationConf(conf) => {
                info!("boot acknowledged: {:?}, interval {}", conf.status, conf.interval);
                if conf.interval > 0 {
                    if let Err(err) = self
                        .ocpp
                        .config_mut()
                        .set_int("HeartbeatInterval", conf.interval)
                    {
                        warn!("granted heartbeat interval not stored: {err}");
                    }
                }
            }
            Payload::StartTransactionConf(conf) => {
                let stop_on_invalid = self
                    .ocpp
                    .config()
                    .get_bool("StopTransactionOnInvalidId")
                    .unwrap_or(false);
                if let Some(connector) = self
                    .connectors
                    .iter_mut()
                    .find(|c| c.session().awaiting_transaction_id)
                {
                    let session = connector.session_mut();
                    session.awaiting_transaction_id = false;
                    session.transaction_id = Some(conf.transaction_id);
                    if let Some(parent) = conf.id_tag_info.parent_id_tag {
                        session.parent_id = parent;
                    }
                    if conf.id_tag_info.status != crate::message::AuthorizationStatus::Accepted
                        && stop_on_invalid
                    {
                        warn!(
                            "transaction {} runs on a rejected tag, stopping",
                            conf.transaction_id
                        );
                        session.deauthorized = true;
                    }
                }
            }
            Payload::AuthorizeConf(conf) => {
                if conf.id_tag_info.status != crate::message::AuthorizationStatus::Accepted {
                    // Drop not-yet-charging sessions that were waiting on
                    // this authorization.
                    for connector in &mut self.connectors {
                        if connector.state() == connector::ConnectorState::Occupied
                            && connector.session().transaction_id.is_none()
                        {
                            warn!("connector {}: authorization rejected", connector.id);
                            connector.session_mut().clear_identity();
                        }
                    }
                } else if let Some(parent) = conf.id_tag_info.parent_id_tag {
                    for connector in &mut self.connectors {
                        let session = connector.session_mut();
                        if !session.user_id.is_empty() && session.parent_id.is_empty() {
                            session.parent_id = parent.clone();
                        }
                    }
                }
            }
            Payload::StopTransactionConf(_) => {
                debug!("stop transaction acknowledged");
            }
            other => {
                debug!("unhandled central result {:?}", other.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::connector::{ConnectorState, CpStatus};
    use super::sim::{SimPort, SimState};
    use super::*;
    use crate::message::core::{
        BootNotificationConf, ChangeConfiguration, GetConfiguration, RemoteStartTransaction,
        RemoteStopTransaction, Reset,
    };
    use crate::message::{
        AuthorizationStatus, IdTagInfo, MessageKind, RegistrationStatus, ResetKind, StopReason,
    };

    #[derive(Default)]
    struct Wire {
        now: u64,
        sent: Vec<Message>,
        rx: VecDeque<Message>,
        acked: usize,
        next_id: u32,
    }

    struct TestPlatform(Rc<RefCell<Wire>>);

    impl Platform for TestPlatform {
        fn send(&mut self, msg: &Message) -> Result<(), Error> {
            self.0.borrow_mut().sent.push(msg.clone());
            Ok(())
        }

        fn recv(&mut self) -> Result<Message, Error> {
            self.0.borrow_mut().rx.pop_front().ok_or(Error::NoMessage)
        }

        fn generate_message_id(&mut self) -> String {
            let mut w = self.0.borrow_mut();
            w.next_id += 1;
            format!("cp-{:04}", w.next_id)
        }

        fn now(&self) -> u64 {
            self.0.borrow().now
        }
    }

    /// The answer a well-behaved Central System would give.
    fn default_ack(msg: &Message) -> Option<Payload> {
        Some(match msg.kind {
            MessageKind::Authorize => Payload::AuthorizeConf(core::AuthorizeConf {
                id_tag_info: accepted(None),
            }),
            MessageKind::BootNotification => {
                Payload::BootNotificationConf(BootNotificationConf {
                    current_time: 0,
                    interval: 0,
                    status: RegistrationStatus::Accepted,
                })
            }
            MessageKind::StartTransaction => {
                Payload::StartTransactionConf(core::StartTransactionConf {
                    id_tag_info: accepted(Some("PARENT")),
                    transaction_id: 77,
                })
            }
            MessageKind::StopTransaction => {
                Payload::StopTransactionConf(core::StopTransactionConf { id_tag_info: None })
            }
            MessageKind::StatusNotification => {
                Payload::StatusNotificationConf(core::StatusNotificationConf {})
            }
            MessageKind::MeterValues => Payload::MeterValuesConf(core::MeterValuesConf {}),
            MessageKind::Heartbeat => {
                Payload::HeartbeatConf(core::HeartbeatConf { current_time: 0 })
            }
            _ => return None,
        })
    }

    fn accepted(parent: Option<&str>) -> IdTagInfo {
        IdTagInfo {
            expiry_date: None,
            parent_id_tag: parent.map(Into::into),
            status: AuthorizationStatus::Accepted,
        }
    }

    struct Rig {
        cp: ChargePoint,
        wire: Rc<RefCell<Wire>>,
        hw: Rc<RefCell<SimState>>,
    }

    impl Rig {
        fn new() -> Self {
            let wire = Rc::new(RefCell::new(Wire::default()));
            let (port, hw) = SimPort::new();
            let cp = ChargePoint::new(
                Box::new(TestPlatform(Rc::clone(&wire))),
                vec![Box::new(port)],
            );
            Rig { cp, wire, hw }
        }

        /// Steps once and queues Central System answers for every call that
        /// reached the wire.
        fn step_at(&mut self, now: u64) {
            self.step_at_with(now, default_ack);
        }

        fn step_at_with(&mut self, now: u64, ack: impl Fn(&Message) -> Option<Payload>) {
            self.wire.borrow_mut().now = now;
            self.cp.step();
            let mut w = self.wire.borrow_mut();
            let from = w.acked;
            w.acked = w.sent.len();
            for i in from..w.sent.len() {
                let call = w.sent[i].clone();
                if call.role != Role::Call {
                    continue;
                }
                if let Some(payload) = ack(&call) {
                    w.rx.push_back(Message {
                        id: call.id.clone(),
                        role: Role::CallResult,
                        kind: call.kind,
                        payload,
                    });
                }
            }
        }

        fn deliver_call(&mut self, kind: MessageKind, payload: Payload) {
            let mut w = self.wire.borrow_mut();
            let n = w.rx.len();
            w.rx.push_back(Message {
                id: format!("cs-{n}"),
                role: Role::Call,
                kind,
                payload,
            });
        }

        fn sent_payloads(&self) -> Vec<Payload> {
            self.wire.borrow().sent.iter().map(|m| m.payload.clone()).collect()
        }

        fn state(&self) -> ConnectorState {
            self.cp.connector(0).state()
        }

        /// Drives the single connector into Charging with tag "TAG" and
        /// transaction id 77 granted.
        fn charge(&mut self) {
            self.hw.borrow_mut().cp = CpStatus::B;
            self.hw.borrow_mut().present_tag("TAG");
            self.step_at(0);
            assert_eq!(self.state(), ConnectorState::Occupied);
            self.step_at(1);
            assert_eq!(self.state(), ConnectorState::Charging);
            self.hw.borrow_mut().cp = CpStatus::C;
            // Let the StartTransaction reach the wire and its response come
            // back.
            for t in 2..8 {
                self.step_at(t);
            }
            assert_eq!(
                self.cp.connector(0).session().transaction_id,
                Some(77),
                "transaction id granted"
            );
        }
    }

    #[test]
    fn plug_then_tag_starts_charging() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.step_at(0);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        // Plug without identity keeps waiting.
        rig.step_at(1);
        assert_eq!(rig.state(), ConnectorState::Occupied);

        rig.hw.borrow_mut().present_tag("TAG");
        rig.step_at(2);
        assert_eq!(rig.state(), ConnectorState::Charging);
        assert_eq!(rig.cp.connector(0).session().user_id, "TAG");
        assert!(rig.hw.borrow().relay_closed);
    }

    #[test]
    fn tag_then_plug_starts_charging() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().present_tag("TAG");
        rig.step_at(0);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        assert_eq!(rig.cp.connector(0).session().user_id, "TAG");

        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.step_at(1);
        assert_eq!(rig.state(), ConnectorState::Charging);

        // The tag was authorized on the way.
        let authorized = rig
            .sent_payloads()
            .iter()
            .any(|p| matches!(p, Payload::Authorize(a) if a.id_tag == "TAG"));
        assert!(authorized || {
            // Not on the wire yet; it is queued behind the status
            // notification. Give it a tick.
            rig.step_at(2);
            rig.sent_payloads()
                .iter()
                .any(|p| matches!(p, Payload::Authorize(a) if a.id_tag == "TAG"))
        });
    }

    #[test]
    fn unattended_occupation_times_out() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().present_tag("TAG");
        rig.step_at(0);
        assert_eq!(rig.state(), ConnectorState::Occupied);

        rig.step_at(179);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        rig.step_at(180);
        assert_eq!(rig.state(), ConnectorState::Ready);
        assert!(rig.cp.connector(0).session().user_id.is_empty());
    }

    #[test]
    fn plugged_vehicles_do_not_time_out() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.step_at(0);
        rig.step_at(10_000);
        assert_eq!(rig.state(), ConnectorState::Occupied);
    }

    #[test]
    fn stranger_tags_cannot_stop_a_session() {
        let mut rig = Rig::new();
        rig.charge();

        rig.hw.borrow_mut().present_tag("SOMEONE_ELSE");
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Charging);

        rig.hw.borrow_mut().present_tag("TAG");
        rig.step_at(21);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        assert!(!rig.hw.borrow().relay_closed);
        let stop = rig
            .sent_payloads()
            .into_iter()
            .chain({
                rig.step_at(22);
                rig.step_at(23);
                rig.sent_payloads()
            })
            .find_map(|p| match p {
                Payload::StopTransaction(s) => Some(s),
                _ => None,
            })
            .expect("StopTransaction on the wire");
        assert_eq!(stop.transaction_id, 77);
        assert_eq!(stop.reason, StopReason::Local);
    }

    #[test]
    fn parent_tags_stop_the_session_too() {
        let mut rig = Rig::new();
        rig.charge();
        assert_eq!(rig.cp.connector(0).session().parent_id, "PARENT");

        rig.hw.borrow_mut().present_tag("PARENT");
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Occupied);
    }

    #[test]
    fn unplugging_stops_the_session() {
        let mut rig = Rig::new();
        rig.charge();

        rig.hw.borrow_mut().cp = CpStatus::A;
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Ready);
        rig.step_at(21);
        rig.step_at(22);
        let stop = rig
            .sent_payloads()
            .into_iter()
            .find_map(|p| match p {
                Payload::StopTransaction(s) => Some(s),
                _ => None,
            })
            .expect("StopTransaction on the wire");
        assert_eq!(stop.reason, StopReason::EVDisconnected);
    }

    #[test]
    fn ev_suspension_toggles_the_relay_without_ending_the_session() {
        let mut rig = Rig::new();
        rig.charge();

        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Charging);
        assert!(!rig.hw.borrow().relay_closed);
        assert_eq!(rig.cp.connector(0).session().user_id, "TAG");

        rig.hw.borrow_mut().cp = CpStatus::C;
        rig.step_at(21);
        assert_eq!(rig.state(), ConnectorState::Charging);
        assert!(rig.hw.borrow().relay_closed);
    }

    #[test]
    fn hardware_errors_are_absorbing_until_recovery() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().fault = true;
        rig.step_at(0);
        assert_eq!(rig.state(), ConnectorState::Unavailable);
        rig.step_at(1);
        assert_eq!(rig.state(), ConnectorState::Unavailable);

        rig.hw.borrow_mut().fault = false;
        rig.step_at(2);
        assert_eq!(rig.state(), ConnectorState::Ready);
    }

    #[test]
    fn hardware_errors_while_charging_stop_the_transaction() {
        let mut rig = Rig::new();
        rig.charge();

        rig.hw.borrow_mut().fault = true;
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Unavailable);
        assert!(!rig.hw.borrow().relay_closed);
    }

    #[test]
    fn sampled_metering_follows_the_configured_cadence() {
        let mut rig = Rig::new();
        rig.cp
            .ocpp()
            .config_mut()
            .set_int("MeterValueSampleInterval", 10)
            .unwrap();
        rig.charge();

        for t in 8..40 {
            rig.hw.borrow_mut().meter_wh += 50;
            rig.step_at(t);
        }
        let meters = rig
            .sent_payloads()
            .into_iter()
            .filter(|p| matches!(p, Payload::MeterValues(_)))
            .count();
        // Charging started at t=1; samples land every 10 seconds.
        assert!((3..=4).contains(&meters), "got {meters} samples");
    }

    #[test]
    fn remote_start_is_arbitrated_and_picked_up() {
        let mut rig = Rig::new();
        rig.deliver_call(
            MessageKind::RemoteStartTransaction,
            Payload::RemoteStartTransaction(RemoteStartTransaction {
                connector_id: Some(1),
                id_tag: "REMOTE".into(),
                charging_profile: None,
            }),
        );
        rig.step_at(0);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        assert_eq!(rig.cp.connector(0).session().user_id, "REMOTE");

        rig.step_at(1);
        let accepted = rig.sent_payloads().iter().any(|p| {
            matches!(
                p,
                Payload::RemoteStartTransactionConf(c) if c.status == RemoteStatus::Accepted
            )
        });
        assert!(accepted);

        // The vehicle shows up and charging begins on remote credit.
        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.step_at(2);
        assert_eq!(rig.state(), ConnectorState::Charging);
    }

    #[test]
    fn remote_start_is_rejected_mid_session() {
        let mut rig = Rig::new();
        rig.charge();

        rig.deliver_call(
            MessageKind::RemoteStartTransaction,
            Payload::RemoteStartTransaction(RemoteStartTransaction {
                connector_id: Some(1),
                id_tag: "REMOTE".into(),
                charging_profile: None,
            }),
        );
        rig.step_at(20);
        rig.step_at(21);
        let rejected = rig.sent_payloads().iter().any(|p| {
            matches!(
                p,
                Payload::RemoteStartTransactionConf(c) if c.status == RemoteStatus::Rejected
            )
        });
        assert!(rejected);
        assert_eq!(rig.cp.connector(0).session().user_id, "TAG");
    }

    #[test]
    fn remote_stop_matches_the_transaction_id() {
        let mut rig = Rig::new();
        rig.charge();

        rig.deliver_call(
            MessageKind::RemoteStopTransaction,
            Payload::RemoteStopTransaction(RemoteStopTransaction { transaction_id: 99 }),
        );
        rig.step_at(20);
        assert_eq!(rig.state(), ConnectorState::Charging);

        rig.deliver_call(
            MessageKind::RemoteStopTransaction,
            Payload::RemoteStopTransaction(RemoteStopTransaction { transaction_id: 77 }),
        );
        rig.step_at(21);
        assert_eq!(rig.state(), ConnectorState::Occupied);
        rig.step_at(22);
        rig.step_at(23);
        let stop = rig
            .sent_payloads()
            .into_iter()
            .find_map(|p| match p {
                Payload::StopTransaction(s) => Some(s),
                _ => None,
            })
            .expect("StopTransaction on the wire");
        assert_eq!(stop.reason, StopReason::Remote);
    }

    #[test]
    fn rejected_start_stops_on_invalid_id() {
        let mut rig = Rig::new();
        rig.hw.borrow_mut().cp = CpStatus::B;
        rig.hw.borrow_mut().present_tag("TAG");
        rig.step_at(0);
        rig.step_at(1);
        assert_eq!(rig.state(), ConnectorState::Charging);

        // Answer everything normally except the StartTransaction, which
        // comes back for an invalid tag.
        for t in 2..8 {
            rig.step_at_with(t, |msg| match msg.kind {
                MessageKind::StartTransaction => {
                    Some(Payload::StartTransactionConf(core::StartTransactionConf {
                        id_tag_info: IdTagInfo {
                            expiry_date: None,
                            parent_id_tag: None,
                            status: AuthorizationStatus::Invalid,
                        },
                        transaction_id: 13,
                    }))
                }
                _ => default_ack(msg),
            });
        }
        assert_eq!(rig.state(), ConnectorState::Occupied);
        let stop = rig
            .sent_payloads()
            .into_iter()
            .chain({
                rig.step_at(8);
                rig.step_at(9);
                rig.sent_payloads()
            })
            .find_map(|p| match p {
                Payload::StopTransaction(s) => Some(s),
                _ => None,
            })
            .expect("StopTransaction on the wire");
        assert_eq!(stop.reason, StopReason::DeAuthorized);
        assert_eq!(stop.transaction_id, 13);
    }

    #[test]
    fn change_configuration_writes_through() {
        let mut rig = Rig::new();
        rig.deliver_call(
            MessageKind::ChangeConfiguration,
            Payload::ChangeConfiguration(ChangeConfiguration {
                key: "HeartbeatInterval".into(),
                value: "30".into(),
            }),
        );
        rig.step_at(0);
        assert_eq!(
            rig.cp.ocpp().config().get_int("HeartbeatInterval").unwrap(),
            30
        );
        rig.step_at(1);
        let accepted = rig.sent_payloads().iter().any(|p| {
            matches!(
                p,
                Payload::ChangeConfigurationConf(c) if c.status == ConfigStatus::Accepted
            )
        });
        assert!(accepted);
    }

    #[test]
    fn change_configuration_rejects_bad_targets() {
        let mut rig = Rig::new();
        rig.deliver_call(
            MessageKind::ChangeConfiguration,
            Payload::ChangeConfiguration(ChangeConfiguration {
                key: "NoSuchKey".into(),
                value: "1".into(),
            }),
        );
        rig.deliver_call(
            MessageKind::ChangeConfiguration,
            Payload::ChangeConfiguration(ChangeConfiguration {
                key: "NumberOfConnectors".into(),
                value: "4".into(),
            }),
        );
        for t in 0..4 {
            rig.step_at(t);
        }
        let statuses: Vec<ConfigStatus> = rig
            .sent_payloads()
            .into_iter()
            .filter_map(|p| match p {
                Payload::ChangeConfigurationConf(c) => Some(c.status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![ConfigStatus::NotSupported, ConfigStatus::Rejected]
        );
    }

    #[test]
    fn get_configuration_reports_value_and_access() {
        let mut rig = Rig::new();
        rig.deliver_call(
            MessageKind::GetConfiguration,
            Payload::GetConfiguration(GetConfiguration {
                key: "ConnectionTimeOut".into(),
            }),
        );
        rig.deliver_call(
            MessageKind::GetConfiguration,
            Payload::GetConfiguration(GetConfiguration {
                key: "NoSuchKey".into(),
            }),
        );
        for t in 0..4 {
            rig.step_at(t);
        }
        let confs: Vec<core::GetConfigurationConf> = rig
            .sent_payloads()
            .into_iter()
            .filter_map(|p| match p {
                Payload::GetConfigurationConf(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(confs.len(), 2);
        assert_eq!(confs[0].configuration_key[0].key, "ConnectionTimeOut");
        assert_eq!(confs[0].configuration_key[0].value.as_deref(), Some("180"));
        assert!(!confs[0].configuration_key[0].readonly);
        assert_eq!(confs[1].unknown_key, "NoSuchKey");
    }

    #[test]
    fn unhandled_central_commands_get_a_call_error() {
        let mut rig = Rig::new();
        rig.deliver_call(
            MessageKind::Reset,
            Payload::Reset(Reset {
                kind: ResetKind::Soft,
            }),
        );
        rig.step_at(0);
        rig.step_at(1);
        let wire = rig.wire.borrow();
        let error = wire
            .sent
            .iter()
            .find(|m| m.role == Role::CallError)
            .expect("CallError on the wire");
        assert_eq!(error.kind, MessageKind::Reset);
        assert!(
            matches!(&error.payload, Payload::Error(e) if e.code == RpcErrorCode::NotImplemented)
        );
    }

    #[test]
    fn granted_heartbeat_interval_is_adopted() {
        let mut rig = Rig::new();
        rig.cp
            .ocpp()
            .send_boot_notification(core::BootNotification {
                charge_point_model: "Model".into(),
                charge_point_vendor: "Vendor".into(),
                ..Default::default()
            })
            .unwrap();
        rig.step_at_with(0, |msg| match msg.kind {
            MessageKind::BootNotification => {
                Some(Payload::BootNotificationConf(BootNotificationConf {
                    current_time: 0,
                    interval: 42,
                    status: RegistrationStatus::Accepted,
                }))
            }
            _ => default_ack(msg),
        });
        rig.step_at(1);
        assert_eq!(
            rig.cp.ocpp().config().get_int("HeartbeatInterval").unwrap(),
            42
        );
    }
}
