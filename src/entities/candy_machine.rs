//! Candy machine entity: one configured NFT minting drop.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "candy_machines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// On-chain candy machine address chosen by the client
    #[sea_orm(column_type = "String(StringLen::N(128))", unique)]
    pub candy_machine_id: String,
    #[sea_orm(column_type = "String(StringLen::N(128))", nullable)]
    pub creator_address: Option<String>,
    /// One of `active`, `paused`, `ended`
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub status: String,
    pub items_minted: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub collection_uri: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub nft_uris: Json,
    /// Remaining client fields, kept as a JSON object
    #[sea_orm(column_type = "JsonBinary")]
    pub extra: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
