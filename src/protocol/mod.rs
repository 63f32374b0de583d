// Live vessel feed wire protocol (JSON text frames + polling response body)

use crate::entity::{Region, TrackedEntity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe_region")]
    SubscribeRegion { region: Region },
    #[serde(rename = "request_vessels", rename_all = "camelCase")]
    RequestVessels {
        all_vessels: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        page_size: Option<u32>,
    },
}

impl ClientMessage {
    /// Build a vessel request; pagination is omitted in all-vessels mode.
    pub fn request(all_vessels: bool, page: u32, page_size: u32) -> Self {
        if all_vessels {
            ClientMessage::RequestVessels {
                all_vessels: true,
                page: None,
                page_size: None,
            }
        } else {
            ClientMessage::RequestVessels {
                all_vessels: false,
                page: Some(page),
                page_size: Some(page_size),
            }
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Server → Client message types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "vessel_update", rename_all = "camelCase")]
    VesselUpdate {
        /// Decoded per entry; see `decode_entities`
        vessels: Vec<Value>,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        total_count: Option<u64>,
        #[serde(default)]
        total_pages: Option<u32>,
        #[serde(default)]
        current_page: Option<u32>,
        #[serde(default)]
        page_size: Option<u32>,
    },
    #[serde(rename = "error")]
    Error { error: String },
}

/// Body of `GET /api/vessels/polling`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub vessels: Vec<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// One delivered set of entities plus optional pagination metadata,
/// regardless of which transport produced it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub entities: Vec<TrackedEntity>,
    pub timestamp: Option<DateTime<Utc>>,
    pub total_count: Option<u64>,
    pub total_pages: Option<u32>,
    pub current_page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Batch {
    pub fn new(entities: Vec<TrackedEntity>) -> Self {
        Self {
            entities,
            ..Default::default()
        }
    }
}

impl From<PollResponse> for Batch {
    fn from(resp: PollResponse) -> Self {
        Self {
            entities: decode_entities(resp.vessels),
            timestamp: parse_timestamp(resp.timestamp.as_deref()),
            total_count: resp.total_count,
            total_pages: resp.total_pages,
            current_page: resp.current_page,
            page_size: resp.page_size,
        }
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Batch(Batch),
    ServerError(String),
}

/// Decode a server frame.
///
/// Any shape other than `vessel_update` / `error` is a decode error; callers
/// treat it as recoverable.
pub fn parse_server_message(text: &str) -> serde_json::Result<Inbound> {
    let msg: ServerMessage = serde_json::from_str(text)?;

    Ok(match msg {
        ServerMessage::VesselUpdate {
            vessels,
            timestamp,
            total_count,
            total_pages,
            current_page,
            page_size,
        } => Inbound::Batch(Batch {
            entities: decode_entities(vessels),
            timestamp: parse_timestamp(timestamp.as_deref()),
            total_count,
            total_pages,
            current_page,
            page_size,
        }),
        ServerMessage::Error { error } => Inbound::ServerError(error),
    })
}

/// Decode each vessel on its own; entries that cannot be decoded (e.g. a
/// null id) are skipped instead of failing the whole batch.
pub fn decode_entities(raw: Vec<Value>) -> Vec<TrackedEntity> {
    let total = raw.len();
    let mut first_error = None;
    let entities: Vec<TrackedEntity> = raw
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(entity) => Some(entity),
            Err(e) => {
                first_error.get_or_insert(e);
                None
            }
        })
        .collect();

    if let Some(e) = first_error {
        warn!(
            skipped = total - entities.len(),
            total,
            error = %e,
            "Skipping undecodable vessels"
        );
    }
    entities
}

/// Timestamps are informational; unparseable values are dropped, not fatal.
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
