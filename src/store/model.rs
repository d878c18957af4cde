use serde::Deserialize;
use serde_json::Value;

/// Body of `GET v1/apps/{app_id}/listings`: either a bare array of records
/// or an object wrapping them under `listings`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Bare(Vec<Value>),
    Wrapped { listings: Vec<Value> },
}

impl SnapshotPayload {
    pub fn into_records(self) -> Vec<Value> {
        match self {
            SnapshotPayload::Bare(records) => records,
            SnapshotPayload::Wrapped { listings } => listings,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateListingResponse {
    pub id: String,
}
