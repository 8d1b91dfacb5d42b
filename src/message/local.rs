//! Local-auth-list profile payload records.

use serde::{Deserialize, Serialize};

use super::IdTagInfo;

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct GetLocalListVersion {}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLocalListVersionConf {
    pub list_version: i32,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    pub id_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag_info: Option<IdTagInfo>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UpdateKind {
    Differential,
    Full,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum UpdateStatus {
    Accepted,
    Failed,
    NotSupported,
    VersionMismatch,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLocalList {
    pub list_version: i32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub local_authorization_list: Vec<AuthorizationData>,
    pub update_type: UpdateKind,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLocalListConf {
    pub status: UpdateStatus,
}
