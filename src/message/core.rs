//! Core-profile payload records.

use serde::{Deserialize, Serialize};

use super::{
    AvailabilityKind, AvailabilityStatus, ChargePointErrorCode, ChargePointStatus, ConfigStatus,
    DataTransferStatus, IdTagInfo, MeterValue, RegistrationStatus, RemoteStatus, ResetKind,
    StopReason, UnlockStatus,
};
use crate::message::sc::ChargingProfile;

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorize {
    pub id_tag: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeConf {
    pub id_tag_info: IdTagInfo,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotification {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub charge_box_serial_number: String,
    pub charge_point_model: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub charge_point_serial_number: String,
    pub charge_point_vendor: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub firmware_version: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub iccid: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub imsi: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub meter_serial_number: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub meter_type: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationConf {
    pub current_time: u64,
    /// Heartbeat cadence granted by the Central System, in seconds.
    pub interval: i32,
    pub status: RegistrationStatus,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailability {
    pub connector_id: i32,
    #[serde(rename = "type")]
    pub kind: AvailabilityKind,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityConf {
    pub status: AvailabilityStatus,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeConfiguration {
    pub key: String,
    pub value: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeConfigurationConf {
    pub status: ConfigStatus,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ClearCache {}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheConf {
    pub status: RemoteStatus,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransfer {
    pub vendor_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub data: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferConf {
    pub status: DataTransferStatus,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub data: String,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfiguration {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub key: String,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigurationConf {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub configuration_key: Vec<KeyValue>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub unknown_key: String,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Heartbeat {}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConf {
    pub current_time: u64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValues {
    pub connector_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct MeterValuesConf {}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<i32>,
    pub id_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging_profile: Option<ChargingProfile>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionConf {
    pub status: RemoteStatus,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransaction {
    pub transaction_id: i32,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionConf {
    pub status: RemoteStatus,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reset {
    #[serde(rename = "type")]
    pub kind: ResetKind,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetConf {
    pub status: RemoteStatus,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransaction {
    pub connector_id: i32,
    pub id_tag: String,
    pub meter_start: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i32>,
    pub timestamp: u64,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionConf {
    pub id_tag_info: IdTagInfo,
    pub transaction_id: i32,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
    pub connector_id: i32,
    pub error_code: ChargePointErrorCode,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub info: String,
    pub status: ChargePointStatus,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub vendor_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub vendor_error_code: String,
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct StatusNotificationConf {}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransaction {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub id_tag: String,
    pub meter_stop: i32,
    pub timestamp: u64,
    pub transaction_id: i32,
    pub reason: StopReason,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transaction_data: Vec<MeterValue>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionConf {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnector {
    pub connector_id: i32,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorConf {
    pub status: UnlockStatus,
}
