//! Per-connector charging state machine.
//!
//! Each tick the guards of the current state are re-evaluated in declaration
//! order and the first one that holds fires its transition. Hardware comes
//! in through [`ConnectorPort`]; everything observable goes out as OCPP
//! messages through the engine.

use crate::engine::Ocpp;
use crate::message::{
    core, ChargePointErrorCode, ChargePointStatus, MeterValue, Payload, ReadingContext,
    SampledValue, StopReason,
};
use log::{debug, info, warn};

/// Control pilot signal: A = no vehicle, B = connected but not drawing,
/// C = drawing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CpStatus {
    A,
    B,
    C,
}

/// Hardware of one physical outlet.
pub trait ConnectorPort {
    fn cp_status(&self) -> CpStatus;
    fn set_relay(&mut self, closed: bool);
    /// Uid presented at the reader since the last poll, if any.
    fn read_rfid(&mut self) -> Option<String>;
    /// Import energy register, in Wh.
    fn meter_wh(&self) -> i32;
    fn faulty(&self) -> bool;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectorState {
    Ready,
    Occupied,
    Charging,
    Unavailable,
}

/// Who is charging and under which transaction.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub user_id: String,
    pub parent_id: String,
    pub transaction_id: Option<i32>,
    pub remotely_started: bool,
    /// Id tag parked by RemoteStartTransaction until the FSM adopts it.
    pub tmp_id: String,
    /// StartTransaction sent, transaction id not yet granted.
    pub awaiting_transaction_id: bool,
    /// The Central System rejected the tag and StopTransactionOnInvalidId
    /// asks us to stop.
    pub deauthorized: bool,
}

impl Session {
    fn clear(&mut self) {
        *self = Session::default();
    }

    /// Forgets who was authorizing without touching a live transaction.
    pub fn clear_identity(&mut self) {
        self.user_id.clear();
        self.parent_id.clear();
        self.tmp_id.clear();
        self.remotely_started = false;
    }
}

#[derive(Clone, Copy)]
enum Guard {
    PluggedIn,
    RfidTagged,
    RemotelyStarted,
    HardwareError,
    ConnectionTimedOut,
    PluggedOut,
    RemotelyStopped,
    SuspendedByEv,
    ResumedFromSuspended,
    Charging,
    HardwareRecovered,
}

#[derive(Clone, Copy)]
enum Action {
    None,
    PrepareToCharge,
    StartCharging,
    StopCharging,
    CleanSession,
    SuspendCharging,
    ResumeCharging,
    DoMetering,
}

struct Transition {
    from: ConnectorState,
    guard: Guard,
    action: Action,
    to: ConnectorState,
}

macro_rules! row {
    ($from:ident, $guard:ident, $action:ident, $to:ident) => {
        Transition {
            from: ConnectorState::$from,
            guard: Guard::$guard,
            action: Action::$action,
            to: ConnectorState::$to,
        }
    };
}

static TRANSITIONS: &[Transition] = &[
    row!(Ready, PluggedIn, PrepareToCharge, Occupied),
    row!(Ready, RfidTagged, PrepareToCharge, Occupied),
    row!(Ready, RemotelyStarted, PrepareToCharge, Occupied),
    row!(Ready, HardwareError, None, Unavailable),
    row!(Occupied, PluggedIn, StartCharging, Charging),
    row!(Occupied, RfidTagged, StartCharging, Charging),
    row!(Occupied, RemotelyStarted, StartCharging, Charging),
    row!(Occupied, ConnectionTimedOut, CleanSession, Ready),
    row!(Occupied, PluggedOut, CleanSession, Ready),
    row!(Occupied, HardwareError, CleanSession, Unavailable),
    row!(Charging, RfidTagged, StopCharging, Occupied),
    row!(Charging, RemotelyStopped, StopCharging, Occupied),
    row!(Charging, PluggedOut, StopCharging, Ready),
    row!(Charging, SuspendedByEv, SuspendCharging, Charging),
    row!(Charging, ResumedFromSuspended, ResumeCharging, Charging),
    row!(Charging, HardwareError, StopCharging, Unavailable),
    row!(Charging, Charging, DoMetering, Charging),
    row!(Unavailable, HardwareRecovered, None, Ready),
];

/// Everything a tick's guards read, captured once per step so guards stay
/// pure and time never comes from a global.
struct Tick {
    now: u64,
    cp: CpStatus,
    rfid: Option<String>,
    fault: bool,
    connection_timeout: u64,
    clock_interval: u64,
    sample_interval: u64,
    authorize_remote: bool,
}

pub struct Connector {
    pub id: i32,
    state: ConnectorState,
    cp_prev: CpStatus,
    time_occupied: u64,
    meter_clock_at: u64,
    meter_sample_at: u64,
    suspended: bool,
    remotely_stopped: bool,
    session: Session,
    port: Box<dyn ConnectorPort>,
}

impl Connector {
    pub fn new(id: i32, port: Box<dyn ConnectorPort>) -> Self {
        Connector {
            id,
            state: ConnectorState::Ready,
            cp_prev: CpStatus::A,
            time_occupied: 0,
            meter_clock_at: 0,
            meter_sample_at: 0,
            suspended: false,
            remotely_stopped: false,
            session: Session::default(),
            port,
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// RemoteStartTransaction arbitration: a remote start lands only on a
    /// connector nobody has plugged into yet.
    pub fn can_remote_start(&self) -> bool {
        match self.state {
            ConnectorState::Ready => true,
            ConnectorState::Occupied => self.port.cp_status() == CpStatus::A,
            _ => false,
        }
    }

    pub fn accept_remote_start(&mut self, id_tag: &str) {
        self.session.tmp_id = id_tag.into();
        self.session.remotely_started = true;
    }

    pub fn request_remote_stop(&mut self) {
        self.remotely_stopped = true;
    }

    /// One FSM tick. Fires at most one transition.
    pub fn step(&mut self, ocpp: &mut Ocpp) {
        let tick = self.observe(ocpp);

        for t in TRANSITIONS {
            if t.from != self.state || !self.guard_holds(t.guard, &tick) {
                continue;
            }
            self.run(t.action, &tick, ocpp, t.to);
            if t.to != self.state {
                debug!("connector {}: {:?} -> {:?}", self.id, self.state, t.to);
                self.on_state_change(self.state, t.to, &tick, ocpp);
            }
            self.state = t.to;
            break;
        }

        self.cp_prev = tick.cp;
    }

    fn observe(&mut self, ocpp: &Ocpp) -> Tick {
        let config = ocpp.config();
        Tick {
            now: ocpp.now(),
            cp: self.port.cp_status(),
            rfid: self.port.read_rfid(),
            fault: self.port.faulty(),
            connection_timeout: config.get_int("ConnectionTimeOut").unwrap_or(180) as u64,
            clock_interval: config.get_int("ClockAlignedDataInterval").unwrap_or(0) as u64,
            sample_interval: config.get_int("MeterValueSampleInterval").unwrap_or(0) as u64,
            authorize_remote: config.get_bool("AuthorizeRemoteTxRequests").unwrap_or(true),
        }
    }

    fn guard_holds(&self, guard: Guard, tick: &Tick) -> bool {
        match guard {
            Guard::PluggedIn => match self.state {
                ConnectorState::Ready => tick.cp != CpStatus::A,
                // Starting needs both a vehicle and an authorized session.
                _ => tick.cp != CpStatus::A && !self.session.user_id.is_empty(),
            },
            Guard::RfidTagged => match (&tick.rfid, self.state) {
                (None, _) => false,
                (Some(uid), ConnectorState::Charging) => {
                    uid == &self.session.user_id || uid == &self.session.parent_id
                }
                (Some(_), ConnectorState::Occupied) => tick.cp != CpStatus::A,
                (Some(_), _) => true,
            },
            Guard::RemotelyStarted => {
                self.session.remotely_started
                    && (self.state == ConnectorState::Ready || tick.cp != CpStatus::A)
            }
            Guard::HardwareError => tick.fault,
            Guard::ConnectionTimedOut => {
                // Authenticated but never plugged in.
                tick.cp == CpStatus::A
                    && tick.now.saturating_sub(self.time_occupied) >= tick.connection_timeout
            }
            Guard::PluggedOut => tick.cp == CpStatus::A,
            Guard::RemotelyStopped => self.remotely_stopped || self.session.deauthorized,
            Guard::SuspendedByEv => {
                !self.suspended && tick.cp == CpStatus::B && self.cp_prev == CpStatus::C
            }
            Guard::ResumedFromSuspended => self.suspended && tick.cp == CpStatus::C,
            Guard::Charging => true,
            Guard::HardwareRecovered => !tick.fault,
        }
    }

    fn run(&mut self, action: Action, tick: &Tick, ocpp: &mut Ocpp, to: ConnectorState) {
        match action {
            Action::None => {}
            Action::PrepareToCharge => self.prepare_to_charge(tick, ocpp),
            Action::StartCharging => self.start_charging(tick, ocpp),
            Action::StopCharging => self.stop_charging(tick, ocpp, to),
            Action::CleanSession => {
                self.remotely_stopped = false;
                self.session.clear();
            }
            Action::SuspendCharging => {
                self.port.set_relay(false);
                self.suspended = true;
                self.notify_status(ocpp, tick.now, ChargePointStatus::SuspendedEV);
            }
            Action::ResumeCharging => {
                self.port.set_relay(true);
                self.suspended = false;
                self.notify_status(ocpp, tick.now, ChargePointStatus::Charging);
            }
            Action::DoMetering => self.do_metering(tick, ocpp),
        }
    }

    fn prepare_to_charge(&mut self, tick: &Tick, ocpp: &mut Ocpp) {
        self.time_occupied = tick.now;

        if let Some(uid) = &tick.rfid {
            self.session.user_id = uid.clone();
            self.push_authorize(ocpp, uid.clone());
        } else if self.session.remotely_started {
            self.session.user_id = std::mem::take(&mut self.session.tmp_id);
            if tick.authorize_remote {
                self.push_authorize(ocpp, self.session.user_id.clone());
            }
        }

        self.notify_status(ocpp, tick.now, ChargePointStatus::Preparing);
    }

    fn start_charging(&mut self, tick: &Tick, ocpp: &mut Ocpp) {
        // An Occupied connector entered by plugging in picks its identity up
        // from the tag presented now.
        if self.session.user_id.is_empty() {
            if let Some(uid) = &tick.rfid {
                self.session.user_id = uid.clone();
                self.push_authorize(ocpp, uid.clone());
            }
        }
        self.session.remotely_started = false;
        self.suspended = false;
        self.port.set_relay(true);
        self.meter_clock_at = tick.now;
        self.meter_sample_at = tick.now;

        self.session.awaiting_transaction_id = true;
        let start = core::StartTransaction {
            connector_id: self.id,
            id_tag: self.session.user_id.clone(),
            meter_start: self.port.meter_wh(),
            reservation_id: None,
            timestamp: tick.now,
        };
        if let Err(err) = ocpp.push_request(Payload::StartTransaction(start)) {
            warn!("connector {}: StartTransaction not queued: {err}", self.id);
            self.session.awaiting_transaction_id = false;
        }
        self.notify_status(ocpp, tick.now, ChargePointStatus::Charging);
        info!("connector {}: charging for {}", self.id, self.session.user_id);
    }

    fn stop_charging(&mut self, tick: &Tick, ocpp: &mut Ocpp, to: ConnectorState) {
        self.port.set_relay(false);

        let reason = if self.session.deauthorized {
            StopReason::DeAuthorized
        } else if self.remotely_stopped {
            StopReason::Remote
        } else if tick.cp == CpStatus::A {
            StopReason::EVDisconnected
        } else if tick.fault {
            StopReason::Other
        } else {
            StopReason::Local
        };

        let stop = core::StopTransaction {
            id_tag: self.session.user_id.clone(),
            meter_stop: self.port.meter_wh(),
            timestamp: tick.now,
            transaction_id: self.session.transaction_id.unwrap_or(0),
            reason,
            transaction_data: Vec::new(),
        };
        if let Err(err) = ocpp.push_request(Payload::StopTransaction(stop)) {
            warn!("connector {}: StopTransaction not queued: {err}", self.id);
        }

        self.suspended = false;
        self.remotely_stopped = false;
        self.session.clear();

        match to {
            ConnectorState::Ready => self.notify_status(ocpp, tick.now, ChargePointStatus::Available),
            ConnectorState::Occupied => {
                self.notify_status(ocpp, tick.now, ChargePointStatus::Finishing)
            }
            // Unavailable entry is reported by on_state_change.
            _ => {}
        }
    }

    fn do_metering(&mut self, tick: &Tick, ocpp: &mut Ocpp) {
        if Self::periodic_due(self.meter_clock_at, tick.clock_interval, tick.now) {
            self.push_meter_values(ocpp, tick.now, ReadingContext::SampleClock);
            self.meter_clock_at = tick.now;
        }
        if Self::periodic_due(self.meter_sample_at, tick.sample_interval, tick.now) {
            self.push_meter_values(ocpp, tick.now, ReadingContext::SamplePeriodic);
            self.meter_sample_at = tick.now;
        }
    }

    fn periodic_due(base: u64, interval: u64, now: u64) -> bool {
        interval > 0 && base + interval <= now
    }

    fn push_meter_values(&self, ocpp: &mut Ocpp, now: u64, context: ReadingContext) {
        let meter = core::MeterValues {
            connector_id: self.id,
            transaction_id: self.session.transaction_id,
            meter_value: vec![MeterValue {
                timestamp: now,
                sampled_value: vec![SampledValue {
                    value: self.port.meter_wh().to_string(),
                    context: Some(context),
                    format: None,
                    measurand: Some("Energy.Active.Import.Register".into()),
                    phase: None,
                    location: None,
                    unit: Some("Wh".into()),
                }],
            }],
        };
        if let Err(err) = ocpp.push_request(Payload::MeterValues(meter)) {
            warn!("connector {}: MeterValues not queued: {err}", self.id);
        }
    }

    fn push_authorize(&self, ocpp: &mut Ocpp, id_tag: String) {
        if let Err(err) = ocpp.push_request(Payload::Authorize(core::Authorize { id_tag })) {
            warn!("connector {}: Authorize not queued: {err}", self.id);
        }
    }

    fn on_state_change(
        &mut self,
        from: ConnectorState,
        to: ConnectorState,
        tick: &Tick,
        ocpp: &mut Ocpp,
    ) {
        match (from, to) {
            (_, ConnectorState::Unavailable) => {
                self.notify_status_with(
                    ocpp,
                    tick.now,
                    ChargePointStatus::Faulted,
                    ChargePointErrorCode::OtherError,
                );
            }
            (ConnectorState::Unavailable, ConnectorState::Ready) => {
                self.notify_status(ocpp, tick.now, ChargePointStatus::Available);
            }
            _ => {}
        }
    }

    fn notify_status(&self, ocpp: &mut Ocpp, now: u64, status: ChargePointStatus) {
        self.notify_status_with(ocpp, now, status, ChargePointErrorCode::NoError);
    }

    fn notify_status_with(
        &self,
        ocpp: &mut Ocpp,
        now: u64,
        status: ChargePointStatus,
        error_code: ChargePointErrorCode,
    ) {
        let notification = core::StatusNotification {
            connector_id: self.id,
            error_code,
            info: String::new(),
            status,
            timestamp: now,
            vendor_id: String::new(),
            vendor_error_code: String::new(),
        };
        if let Err(err) = ocpp.push_request(Payload::StatusNotification(notification)) {
            warn!("connector {}: StatusNotification not queued: {err}", self.id);
        }
    }
}
