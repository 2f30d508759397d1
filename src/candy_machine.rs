use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MAX_CANDY_MACHINE_ID_LEN: usize = 128;
pub const MAX_CREATOR_ADDRESS_LEN: usize = 128;
pub const MAX_URI_LEN: usize = 2048;
pub const MAX_NFT_URIS: usize = 10_000;
pub const MAX_EXTRA_FIELDS: usize = 64;

pub const FIELD_ID: &str = "_id";
pub const FIELD_CANDY_MACHINE_ID: &str = "candyMachineId";
pub const FIELD_CREATOR_ADDRESS: &str = "creatorAddress";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_ITEMS_MINTED: &str = "itemsMinted";
pub const FIELD_COLLECTION_URI: &str = "collectionUri";
pub const FIELD_NFT_URIS: &str = "nftUris";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Keys that map onto dedicated columns and never live in the `extra` object.
pub const RESERVED_FIELDS: [&str; 9] = [
    FIELD_ID,
    FIELD_CANDY_MACHINE_ID,
    FIELD_CREATOR_ADDRESS,
    FIELD_STATUS,
    FIELD_ITEMS_MINTED,
    FIELD_COLLECTION_URI,
    FIELD_NFT_URIS,
    FIELD_CREATED_AT,
    FIELD_UPDATED_AT,
];

/// Fields a client may never overwrite through a generic update.
const IMMUTABLE_FIELDS: [&str; 4] = [
    FIELD_ID,
    FIELD_CANDY_MACHINE_ID,
    FIELD_ITEMS_MINTED,
    FIELD_CREATED_AT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandyMachineStatus {
    Active,
    Paused,
    Ended,
}

impl CandyMachineStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for CandyMachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandyMachineStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "ended" => Ok(Self::Ended),
            other => Err(anyhow!("Invalid status: {other}")),
        }
    }
}

pub fn sanitize_candy_machine_id(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("candyMachineId is required"));
    }
    if trimmed.len() > MAX_CANDY_MACHINE_ID_LEN {
        return Err(anyhow!(
            "candyMachineId exceeds {MAX_CANDY_MACHINE_ID_LEN} character limit"
        ));
    }
    if trimmed.contains('/') {
        return Err(anyhow!("candyMachineId must not contain '/'"));
    }
    Ok(trimmed.to_string())
}

pub fn sanitize_creator_address(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("creatorAddress cannot be empty"));
    }
    if trimmed.len() > MAX_CREATOR_ADDRESS_LEN {
        return Err(anyhow!(
            "creatorAddress exceeds {MAX_CREATOR_ADDRESS_LEN} character limit"
        ));
    }
    Ok(trimmed.to_string())
}

pub fn sanitize_uri(value: &str, label: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{label} cannot be empty"));
    }
    if trimmed.len() > MAX_URI_LEN {
        return Err(anyhow!("{label} exceeds {MAX_URI_LEN} character limit"));
    }
    Ok(trimmed.to_string())
}

pub fn sanitize_nft_uris(values: &[Value]) -> Result<Vec<String>> {
    if values.len() > MAX_NFT_URIS {
        return Err(anyhow!("nftUris exceeds {MAX_NFT_URIS} entries"));
    }
    values
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(uri) => sanitize_uri(uri, &format!("nftUris[{index}]")),
            _ => Err(anyhow!("nftUris[{index}] must be a string")),
        })
        .collect()
}

/// A validated creation request. Server-controlled fields in the body are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCandyMachine {
    pub candy_machine_id: String,
    pub creator_address: Option<String>,
    pub collection_uri: Option<String>,
    pub nft_uris: Vec<String>,
    pub extra: Map<String, Value>,
}

impl NewCandyMachine {
    pub fn from_document(mut document: Map<String, Value>) -> Result<Self> {
        let candy_machine_id = match document.remove(FIELD_CANDY_MACHINE_ID) {
            Some(Value::String(id)) => sanitize_candy_machine_id(&id)?,
            Some(Value::Null) | None => return Err(anyhow!("candyMachineId is required")),
            Some(_) => return Err(anyhow!("candyMachineId must be a string")),
        };
        let creator_address = optional_string(&mut document, FIELD_CREATOR_ADDRESS)?
            .map(|address| sanitize_creator_address(&address))
            .transpose()?;
        let collection_uri = optional_string(&mut document, FIELD_COLLECTION_URI)?
            .map(|uri| sanitize_uri(&uri, FIELD_COLLECTION_URI))
            .transpose()?;
        let nft_uris = match document.remove(FIELD_NFT_URIS) {
            Some(Value::Array(values)) => sanitize_nft_uris(&values)?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(anyhow!("nftUris must be an array of strings")),
        };

        for key in RESERVED_FIELDS {
            document.remove(key);
        }
        check_extra_size(document.len())?;

        Ok(Self {
            candy_machine_id,
            creator_address,
            collection_uri,
            nft_uris,
            extra: document,
        })
    }
}

/// A partial update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandyMachinePatch {
    pub creator_address: Option<Option<String>>,
    pub status: Option<CandyMachineStatus>,
    pub collection_uri: Option<Option<String>>,
    pub nft_uris: Option<Vec<String>>,
    pub extra_set: Map<String, Value>,
    pub extra_remove: Vec<String>,
}

impl CandyMachinePatch {
    pub fn from_document(document: Map<String, Value>) -> Result<Self> {
        let mut patch = Self::default();
        for (key, value) in document {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                return Err(anyhow!("Field '{key}' cannot be updated"));
            }
            match key.as_str() {
                FIELD_UPDATED_AT => {}
                FIELD_STATUS => {
                    let status = value
                        .as_str()
                        .ok_or_else(|| anyhow!("Invalid status"))?
                        .parse::<CandyMachineStatus>()?;
                    patch.status = Some(status);
                }
                FIELD_CREATOR_ADDRESS => {
                    patch.creator_address = Some(match value {
                        Value::Null => None,
                        Value::String(address) => Some(sanitize_creator_address(&address)?),
                        _ => return Err(anyhow!("creatorAddress must be a string")),
                    });
                }
                FIELD_COLLECTION_URI => {
                    patch.collection_uri = Some(match value {
                        Value::Null => None,
                        Value::String(uri) => Some(sanitize_uri(&uri, FIELD_COLLECTION_URI)?),
                        _ => return Err(anyhow!("collectionUri must be a string")),
                    });
                }
                FIELD_NFT_URIS => {
                    patch.nft_uris = Some(match value {
                        Value::Null => Vec::new(),
                        Value::Array(values) => sanitize_nft_uris(&values)?,
                        _ => return Err(anyhow!("nftUris must be an array of strings")),
                    });
                }
                _ => {
                    if value.is_null() {
                        patch.extra_remove.push(key);
                    } else {
                        patch.extra_set.insert(key, value);
                    }
                }
            }
        }
        Ok(patch)
    }

    pub fn touches_extra(&self) -> bool {
        !self.extra_set.is_empty() || !self.extra_remove.is_empty()
    }

    /// Merges the extra-field changes into the stored `extra` object.
    pub fn merge_extra(&self, current: &Value) -> Result<Value> {
        let mut merged = match current {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for key in &self.extra_remove {
            merged.remove(key);
        }
        for (key, value) in &self.extra_set {
            merged.insert(key.clone(), value.clone());
        }
        check_extra_size(merged.len())?;
        Ok(Value::Object(merged))
    }
}

fn optional_string(document: &mut Map<String, Value>, key: &str) -> Result<Option<String>> {
    match document.remove(key) {
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(anyhow!("{key} must be a string")),
    }
}

fn check_extra_size(count: usize) -> Result<()> {
    if count > MAX_EXTRA_FIELDS {
        return Err(anyhow!(
            "Candy machine documents are limited to {MAX_EXTRA_FIELDS} custom fields"
        ));
    }
    Ok(())
}
