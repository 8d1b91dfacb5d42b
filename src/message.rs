//! OCPP 1.6 operation catalog: roles, type tags, the message envelope and
//! the payload records exchanged with the Central System.
//!
//! The records mirror the OCPP 1.6 JSON schemas field for field (serde
//! renames produce the wire names); the framing itself — WebSocket, the RPC
//! array layout — belongs to the host transport.

pub mod core;
pub mod fwmgmt;
pub mod local;
pub mod reserve;
pub mod sc;
pub mod trigger;

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// Longest correlation id the engine will carry, UUID-sized.
pub const MESSAGE_ID_MAXLEN: usize = 36;
pub const ID_TOKEN_MAXLEN: usize = 20;
pub const VENDOR_ID_MAXLEN: usize = 255;
pub const CONFIG_KEY_MAXLEN: usize = 50;
pub const CONFIG_VALUE_MAXLEN: usize = 500;
pub const URL_MAXLEN: usize = 256;

/// RPC role of a message. The wire values are the OCPP-J MessageTypeId;
/// `None` marks a free pool slot and `Alloc` a slot claimed but not yet
/// queued.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, TryFromPrimitive)]
#[repr(u8)]
pub enum Role {
    #[default]
    None = 0,
    Alloc = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// Every operation this charge point speaks, request and response alike.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MessageKind {
    Authorize,
    BootNotification,
    ChangeAvailability,
    ChangeConfiguration,
    ClearCache,
    DataTransfer,
    GetConfiguration,
    Heartbeat,
    MeterValues,
    RemoteStartTransaction,
    RemoteStopTransaction,
    Reset,
    StartTransaction,
    StatusNotification,
    StopTransaction,
    UnlockConnector,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    GetDiagnostics,
    UpdateFirmware,
    GetLocalListVersion,
    SendLocalList,
    CancelReservation,
    ReserveNow,
    ClearChargingProfile,
    GetCompositeSchedule,
    SetChargingProfile,
    TriggerMessage,
}

impl MessageKind {
    /// OCPP action name, e.g. `"BootNotification"`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Authorize => "Authorize",
            MessageKind::BootNotification => "BootNotification",
            MessageKind::ChangeAvailability => "ChangeAvailability",
            MessageKind::ChangeConfiguration => "ChangeConfiguration",
            MessageKind::ClearCache => "ClearCache",
            MessageKind::DataTransfer => "DataTransfer",
            MessageKind::GetConfiguration => "GetConfiguration",
            MessageKind::Heartbeat => "Heartbeat",
            MessageKind::MeterValues => "MeterValues",
            MessageKind::RemoteStartTransaction => "RemoteStartTransaction",
            MessageKind::RemoteStopTransaction => "RemoteStopTransaction",
            MessageKind::Reset => "Reset",
            MessageKind::StartTransaction => "StartTransaction",
            MessageKind::StatusNotification => "StatusNotification",
            MessageKind::StopTransaction => "StopTransaction",
            MessageKind::UnlockConnector => "UnlockConnector",
            MessageKind::DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
            MessageKind::FirmwareStatusNotification => "FirmwareStatusNotification",
            MessageKind::GetDiagnostics => "GetDiagnostics",
            MessageKind::UpdateFirmware => "UpdateFirmware",
            MessageKind::GetLocalListVersion => "GetLocalListVersion",
            MessageKind::SendLocalList => "SendLocalList",
            MessageKind::CancelReservation => "CancelReservation",
            MessageKind::ReserveNow => "ReserveNow",
            MessageKind::ClearChargingProfile => "ClearChargingProfile",
            MessageKind::GetCompositeSchedule => "GetCompositeSchedule",
            MessageKind::SetChargingProfile => "SetChargingProfile",
            MessageKind::TriggerMessage => "TriggerMessage",
        }
    }

    pub fn from_name(name: &str) -> Option<MessageKind> {
        ALL_KINDS.iter().copied().find(|k| k.as_str() == name)
    }

    /// StartTransaction, StopTransaction and MeterValues get the dedicated
    /// retry budget from the configuration; everything else does not.
    pub fn is_transaction_related(self) -> bool {
        matches!(
            self,
            MessageKind::StartTransaction | MessageKind::StopTransaction | MessageKind::MeterValues
        )
    }
}

const ALL_KINDS: [MessageKind; 28] = [
    MessageKind::Authorize,
    MessageKind::BootNotification,
    MessageKind::ChangeAvailability,
    MessageKind::ChangeConfiguration,
    MessageKind::ClearCache,
    MessageKind::DataTransfer,
    MessageKind::GetConfiguration,
    MessageKind::Heartbeat,
    MessageKind::MeterValues,
    MessageKind::RemoteStartTransaction,
    MessageKind::RemoteStopTransaction,
    MessageKind::Reset,
    MessageKind::StartTransaction,
    MessageKind::StatusNotification,
    MessageKind::StopTransaction,
    MessageKind::UnlockConnector,
    MessageKind::DiagnosticsStatusNotification,
    MessageKind::FirmwareStatusNotification,
    MessageKind::GetDiagnostics,
    MessageKind::UpdateFirmware,
    MessageKind::GetLocalListVersion,
    MessageKind::SendLocalList,
    MessageKind::CancelReservation,
    MessageKind::ReserveNow,
    MessageKind::ClearChargingProfile,
    MessageKind::GetCompositeSchedule,
    MessageKind::SetChargingProfile,
    MessageKind::TriggerMessage,
];

/// OCPP-J RPC error codes carried by a CallError.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RpcErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurrenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub description: String,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, description: &str) -> Self {
        RpcError {
            code,
            description: description.into(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
    pub status: AuthorizationStatus,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum AvailabilityKind {
    Inoperative,
    Operative,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Accepted,
    Rejected,
    Scheduled,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ConfigStatus {
    Accepted,
    Rejected,
    RebootRequired,
    NotSupported,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RemoteStatus {
    Accepted,
    Rejected,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DataTransferStatus {
    Accepted,
    Rejected,
    UnknownMessageId,
    UnknownVendorId,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ResetKind {
    Hard,
    Soft,
}

/// Connector status as reported in StatusNotification.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ChargePointStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEVSE,
    SuspendedEV,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ChargePointErrorCode {
    ConnectorLockFailure,
    EVCommunicationError,
    GroundFailure,
    HighTemperature,
    InternalError,
    LocalListConflict,
    NoError,
    OtherError,
    OverCurrentFailure,
    PowerMeterFailure,
    PowerSwitchFailure,
    ReaderFailure,
    ResetFailure,
    UnderVoltage,
    OverVoltage,
    WeakSignal,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum StopReason {
    DeAuthorized,
    EmergencyStop,
    EVDisconnected,
    HardReset,
    Local,
    Other,
    PowerLoss,
    Reboot,
    Remote,
    SoftReset,
    UnlockCommand,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UnlockStatus {
    Unlocked,
    UnlockFailed,
    NotSupported,
}

/// Upload/download progress for diagnostics and firmware notifications.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum CommStatus {
    Downloaded,
    DownloadFailed,
    Downloading,
    Idle,
    InstallationFailed,
    Installing,
    Installed,
    UploadFailed,
    Uploading,
    Uploaded,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ReadingContext {
    #[serde(rename = "Interruption.Begin")]
    InterruptionBegin,
    #[serde(rename = "Interruption.End")]
    InterruptionEnd,
    Other,
    #[serde(rename = "Sample.Clock")]
    SampleClock,
    #[serde(rename = "Sample.Periodic")]
    SamplePeriodic,
    #[serde(rename = "Transaction.Begin")]
    TransactionBegin,
    #[serde(rename = "Transaction.End")]
    TransactionEnd,
    Trigger,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ValueFormat {
    Raw,
    SignedData,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: u64,
    pub sampled_value: Vec<SampledValue>,
}

/// One bounded message record. Exactly what a pool slot holds and what the
/// transport hooks see.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub payload: Payload,
}

/// Tagged union over every request and response body. The serde form is
/// externally tagged; transports that need the bare body unwrap one level.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub enum Payload {
    Authorize(core::Authorize),
    AuthorizeConf(core::AuthorizeConf),
    BootNotification(core::BootNotification),
    BootNotificationConf(core::BootNotificationConf),
    ChangeAvailability(core::ChangeAvailability),
    ChangeAvailabilityConf(core::ChangeAvailabilityConf),
    ChangeConfiguration(core::ChangeConfiguration),
    ChangeConfigurationConf(core::ChangeConfigurationConf),
    ClearCache(core::ClearCache),
    ClearCacheConf(core::ClearCacheConf),
    DataTransfer(core::DataTransfer),
    DataTransferConf(core::DataTransferConf),
    GetConfiguration(core::GetConfiguration),
    GetConfigurationConf(core::GetConfigurationConf),
    Heartbeat(core::Heartbeat),
    HeartbeatConf(core::HeartbeatConf),
    MeterValues(core::MeterValues),
    MeterValuesConf(core::MeterValuesConf),
    RemoteStartTransaction(core::RemoteStartTransaction),
    RemoteStartTransactionConf(core::RemoteStartTransactionConf),
    RemoteStopTransaction(core::RemoteStopTransaction),
    RemoteStopTransactionConf(core::RemoteStopTransactionConf),
    Reset(core::Reset),
    ResetConf(core::ResetConf),
    StartTransaction(core::StartTransaction),
    StartTransactionConf(core::StartTransactionConf),
    StatusNotification(core::StatusNotification),
    StatusNotificationConf(core::StatusNotificationConf),
    StopTransaction(core::StopTransaction),
    StopTransactionConf(core::StopTransactionConf),
    UnlockConnector(core::UnlockConnector),
    UnlockConnectorConf(core::UnlockConnectorConf),
    DiagnosticsStatusNotification(fwmgmt::DiagnosticsStatusNotification),
    DiagnosticsStatusNotificationConf(fwmgmt::DiagnosticsStatusNotificationConf),
    FirmwareStatusNotification(fwmgmt::FirmwareStatusNotification),
    FirmwareStatusNotificationConf(fwmgmt::FirmwareStatusNotificationConf),
    GetDiagnostics(fwmgmt::GetDiagnostics),
    GetDiagnosticsConf(fwmgmt::GetDiagnosticsConf),
    UpdateFirmware(fwmgmt::UpdateFirmware),
    UpdateFirmwareConf(fwmgmt::UpdateFirmwareConf),
    GetLocalListVersion(local::GetLocalListVersion),
    GetLocalListVersionConf(local::GetLocalListVersionConf),
    SendLocalList(local::SendLocalList),
    SendLocalListConf(local::SendLocalListConf),
    CancelReservation(reserve::CancelReservation),
    CancelReservationConf(reserve::CancelReservationConf),
    ReserveNow(reserve::ReserveNow),
    ReserveNowConf(reserve::ReserveNowConf),
    ClearChargingProfile(sc::ClearChargingProfile),
    ClearChargingProfileConf(sc::ClearChargingProfileConf),
    GetCompositeSchedule(sc::GetCompositeSchedule),
    GetCompositeScheduleConf(sc::GetCompositeScheduleConf),
    SetChargingProfile(sc::SetChargingProfile),
    SetChargingProfileConf(sc::SetChargingProfileConf),
    TriggerMessage(trigger::TriggerMessage),
    TriggerMessageConf(trigger::TriggerMessageConf),
    /// CallError body; the envelope keeps the kind of the original request.
    Error(RpcError),
}

impl Payload {
    /// Operation tag of this body. Requests and their `…Conf` twins map to
    /// the same kind; a CallError body has no kind of its own.
    pub fn kind(&self) -> Option<MessageKind> {
        use Payload::*;
        let kind = match self {
            Authorize(_) | AuthorizeConf(_) => MessageKind::Authorize,
            BootNotification(_) | BootNotificationConf(_) => MessageKind::BootNotification,
            ChangeAvailability(_) | ChangeAvailabilityConf(_) => MessageKind::ChangeAvailability,
            ChangeConfiguration(_) | ChangeConfigurationConf(_) => MessageKind::ChangeConfiguration,
            ClearCache(_) | ClearCacheConf(_) => MessageKind::ClearCache,
            DataTransfer(_) | DataTransferConf(_) => MessageKind::DataTransfer,
            GetConfiguration(_) | GetConfigurationConf(_) => MessageKind::GetConfiguration,
            Heartbeat(_) | HeartbeatConf(_) => MessageKind::Heartbeat,
            MeterValues(_) | MeterValuesConf(_) => MessageKind::MeterValues,
            RemoteStartTransaction(_) | RemoteStartTransactionConf(_) => {
                MessageKind::RemoteStartTransaction
            }
            RemoteStopTransaction(_) | RemoteStopTransactionConf(_) => {
                MessageKind::RemoteStopTransaction
            }
            Reset(_) | ResetConf(_) => MessageKind::Reset,
            StartTransaction(_) | StartTransactionConf(_) => MessageKind::StartTransaction,
            StatusNotification(_) | StatusNotificationConf(_) => MessageKind::StatusNotification,
            StopTransaction(_) | StopTransactionConf(_) => MessageKind::StopTransaction,
            UnlockConnector(_) | UnlockConnectorConf(_) => MessageKind::UnlockConnector,
            DiagnosticsStatusNotification(_) | DiagnosticsStatusNotificationConf(_) => {
                MessageKind::DiagnosticsStatusNotification
            }
            FirmwareStatusNotification(_) | FirmwareStatusNotificationConf(_) => {
                MessageKind::FirmwareStatusNotification
            }
            GetDiagnostics(_) | GetDiagnosticsConf(_) => MessageKind::GetDiagnostics,
            UpdateFirmware(_) | UpdateFirmwareConf(_) => MessageKind::UpdateFirmware,
            GetLocalListVersion(_) | GetLocalListVersionConf(_) => MessageKind::GetLocalListVersion,
            SendLocalList(_) | SendLocalListConf(_) => MessageKind::SendLocalList,
            CancelReservation(_) | CancelReservationConf(_) => MessageKind::CancelReservation,
            ReserveNow(_) | ReserveNowConf(_) => MessageKind::ReserveNow,
            ClearChargingProfile(_) | ClearChargingProfileConf(_) => {
                MessageKind::ClearChargingProfile
            }
            GetCompositeSchedule(_) | GetCompositeScheduleConf(_) => {
                MessageKind::GetCompositeSchedule
            }
            SetChargingProfile(_) | SetChargingProfileConf(_) => MessageKind::SetChargingProfile,
            TriggerMessage(_) | TriggerMessageConf(_) => MessageKind::TriggerMessage,
            Error(_) => return None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(MessageKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_name("NoSuchAction"), None);
    }

    #[test]
    fn roles_map_to_ocppj_message_type_ids() {
        assert_eq!(Role::try_from(2u8).unwrap(), Role::Call);
        assert_eq!(Role::try_from(3u8).unwrap(), Role::CallResult);
        assert_eq!(Role::try_from(4u8).unwrap(), Role::CallError);
        assert!(Role::try_from(9u8).is_err());
    }

    #[test]
    fn payload_kind_covers_both_directions() {
        let req = Payload::Heartbeat(core::Heartbeat {});
        let conf = Payload::HeartbeatConf(core::HeartbeatConf { current_time: 0 });
        assert_eq!(req.kind(), Some(MessageKind::Heartbeat));
        assert_eq!(conf.kind(), Some(MessageKind::Heartbeat));
        let err = Payload::Error(RpcError::new(RpcErrorCode::NotImplemented, "todo"));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn payload_records_carry_wire_field_names() {
        let boot = core::BootNotification {
            charge_point_model: "Model".into(),
            charge_point_vendor: "Vendor".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&boot).unwrap();
        assert_eq!(json["chargePointModel"], "Model");
        assert_eq!(json["chargePointVendor"], "Vendor");
    }
}
