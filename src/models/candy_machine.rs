use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::candy_machine::RESERVED_FIELDS;
use crate::entities::candy_machine;

/// The JSON document clients see for a candy machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandyMachineDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub candy_machine_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_address: Option<String>,
    pub status: String,
    pub items_minted: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_uri: Option<String>,
    #[serde(default)]
    pub nft_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<candy_machine::Model> for CandyMachineDocument {
    fn from(model: candy_machine::Model) -> Self {
        let nft_uris = match model.nft_uris {
            Value::Array(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(uri) => Some(uri),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let mut extra = match model.extra {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        extra.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));

        Self {
            id: model.id.to_string(),
            candy_machine_id: model.candy_machine_id,
            creator_address: model.creator_address,
            status: model.status,
            items_minted: model.items_minted,
            collection_uri: model.collection_uri,
            nft_uris,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
            extra,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUriRequest {
    #[serde(default)]
    pub collection_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftUrisRequest {
    #[serde(default)]
    pub nft_uris: Vec<Value>,
}
