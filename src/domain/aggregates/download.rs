//! Download access grants

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record that a buyer was given a downloadable file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAccess {
    pub file_slug: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub order_id: Option<Uuid>,
}

/// Link presented after a zero-total checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub slug: String,
    pub title: String,
    pub file_url: String,
}
