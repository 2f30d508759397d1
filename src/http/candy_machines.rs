//! Candy machine CRUD handlers.
//!
//! Machines are addressed by their client-chosen `candyMachineId`. There is
//! no delete route: a drop is retired by moving its status to `ended`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeDelta, Timelike, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, SqlErr,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::candy_machine::{
    CandyMachinePatch, CandyMachineStatus, NewCandyMachine, sanitize_creator_address,
    sanitize_nft_uris, sanitize_uri,
};
use crate::entities::candy_machine;
use crate::entities::prelude::CandyMachine;
use crate::models::candy_machine::{
    CandyMachineDocument, CollectionUriRequest, NftUrisRequest, StatusUpdateRequest,
};
use crate::state::AppState;

use super::{ApiJson, HttpError};

const NOT_FOUND_MESSAGE: &str = "Candy machine not found";
const MAX_UPDATE_ATTEMPTS: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_candy_machine).get(list_active))
        .route("/creator/{creator_address}", get(list_by_creator))
        .route(
            "/{candy_machine_id}",
            get(get_candy_machine).put(update_candy_machine),
        )
        .route("/{candy_machine_id}/mint", post(increment_minted))
        .route("/{candy_machine_id}/status", put(update_status))
        .route("/{candy_machine_id}/collection", post(set_collection_uri))
        .route("/{candy_machine_id}/nfts", post(set_nft_uris))
}

async fn create_candy_machine(
    State(state): State<AppState>,
    ApiJson(document): ApiJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<CandyMachineDocument>), HttpError> {
    let new_machine = NewCandyMachine::from_document(document)
        .map_err(|err| HttpError::bad_request(err.to_string()))?;

    let existing = find_by_candy_machine_id(&state.database, &new_machine.candy_machine_id).await?;
    if existing.is_some() {
        return Err(HttpError::bad_request(format!(
            "Candy machine {} already exists",
            new_machine.candy_machine_id
        )));
    }

    let candy_machine_id = new_machine.candy_machine_id;
    let now = now_timestamp();
    let record = candy_machine::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        candy_machine_id: Set(candy_machine_id.clone()),
        creator_address: Set(new_machine.creator_address),
        status: Set(CandyMachineStatus::Active.as_str().to_string()),
        items_minted: Set(0),
        collection_uri: Set(new_machine.collection_uri),
        nft_uris: Set(Value::from(new_machine.nft_uris)),
        extra: Set(Value::Object(new_machine.extra)),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = record.insert(&state.database).await.map_err(|err| {
        // A concurrent create can pass the lookup above and lose on the unique index
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HttpError::bad_request(format!("Candy machine {candy_machine_id} already exists"))
            }
            _ => HttpError::internal(err),
        }
    })?;
    info!(
        candy_machine_id = %inserted.candy_machine_id,
        creator = inserted.creator_address.as_deref().unwrap_or("unknown"),
        "Created candy machine"
    );

    Ok((StatusCode::CREATED, Json(inserted.into())))
}

async fn list_active(
    State(state): State<AppState>,
) -> Result<Json<Vec<CandyMachineDocument>>, HttpError> {
    let machines = candy_machine::Entity::find()
        .filter(candy_machine::Column::Status.eq(CandyMachineStatus::Active.as_str()))
        .order_by_desc(candy_machine::Column::CreatedAt)
        .order_by_desc(candy_machine::Column::Id)
        .all(&state.database)
        .await
        .map_err(HttpError::internal)?;

    Ok(Json(machines.into_iter().map(Into::into).collect()))
}

async fn list_by_creator(
    Path(creator_address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CandyMachineDocument>>, HttpError> {
    let creator_address = sanitize_creator_address(&creator_address)
        .map_err(|err| HttpError::bad_request(err.to_string()))?;

    let machines = candy_machine::Entity::find()
        .filter(candy_machine::Column::CreatorAddress.eq(creator_address))
        .filter(candy_machine::Column::Status.eq(CandyMachineStatus::Active.as_str()))
        .order_by_desc(candy_machine::Column::CreatedAt)
        .order_by_desc(candy_machine::Column::Id)
        .all(&state.database)
        .await
        .map_err(HttpError::internal)?;

    Ok(Json(machines.into_iter().map(Into::into).collect()))
}

async fn get_candy_machine(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
    Ok(Json(machine.into()))
}

async fn update_candy_machine(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(document): ApiJson<Map<String, Value>>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    let patch = CandyMachinePatch::from_document(document)
        .map_err(|err| HttpError::bad_request(err.to_string()))?;

    // Compare-and-swap on `updated_at`: a concurrent writer forces a re-read
    // so merged custom fields are never lost.
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
        let observed = machine.updated_at;

        let mut update = CandyMachine::update_many()
            .col_expr(
                candy_machine::Column::UpdatedAt,
                Expr::value(next_timestamp(observed)),
            )
            .filter(candy_machine::Column::CandyMachineId.eq(candy_machine_id.as_str()))
            .filter(candy_machine::Column::UpdatedAt.eq(observed));
        if let Some(creator_address) = &patch.creator_address {
            update = update.col_expr(
                candy_machine::Column::CreatorAddress,
                Expr::value(creator_address.clone()),
            );
        }
        if let Some(status) = patch.status {
            update = update.col_expr(candy_machine::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(collection_uri) = &patch.collection_uri {
            update = update.col_expr(
                candy_machine::Column::CollectionUri,
                Expr::value(collection_uri.clone()),
            );
        }
        if let Some(nft_uris) = &patch.nft_uris {
            update = update.col_expr(
                candy_machine::Column::NftUris,
                Expr::value(Value::from(nft_uris.clone())),
            );
        }
        if patch.touches_extra() {
            let merged = patch
                .merge_extra(&machine.extra)
                .map_err(|err| HttpError::bad_request(err.to_string()))?;
            update = update.col_expr(candy_machine::Column::Extra, Expr::value(merged));
        }

        let result = update
            .exec(&state.database)
            .await
            .map_err(HttpError::internal)?;
        if result.rows_affected > 0 {
            let updated = require_candy_machine(&state.database, &candy_machine_id).await?;
            return Ok(Json(updated.into()));
        }

        debug!(
            candy_machine_id = %candy_machine_id,
            attempt,
            "Candy machine changed during update, retrying"
        );
        tokio::task::yield_now().await;
    }

    Err(HttpError::internal(format!(
        "Candy machine {candy_machine_id} is under heavy concurrent update, try again"
    )))
}

async fn increment_minted(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    // Single UPDATE so concurrent mints never lose an increment
    let result = candy_machine::Entity::update_many()
        .col_expr(
            candy_machine::Column::ItemsMinted,
            Expr::col(candy_machine::Column::ItemsMinted).add(1),
        )
        .col_expr(
            candy_machine::Column::UpdatedAt,
            Expr::value(now_timestamp()),
        )
        .filter(candy_machine::Column::CandyMachineId.eq(candy_machine_id.as_str()))
        .exec(&state.database)
        .await
        .map_err(HttpError::internal)?;

    if result.rows_affected == 0 {
        return Err(not_found());
    }

    let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
    info!(
        candy_machine_id = %machine.candy_machine_id,
        items_minted = machine.items_minted,
        "Recorded mint"
    );
    Ok(Json(machine.into()))
}

async fn update_status(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StatusUpdateRequest>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    let status = request
        .status
        .as_deref()
        .and_then(|value| value.parse::<CandyMachineStatus>().ok())
        .ok_or_else(|| HttpError::bad_request("Invalid status"))?;

    let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
    let previous = machine.status.clone();
    let mut active = machine.into_active_model();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(now_timestamp());

    let updated = active.update(&state.database).await.map_err(HttpError::internal)?;
    info!(
        candy_machine_id = %updated.candy_machine_id,
        from = %previous,
        to = %status,
        "Candy machine status changed"
    );
    Ok(Json(updated.into()))
}

async fn set_collection_uri(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CollectionUriRequest>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    let collection_uri = request
        .collection_uri
        .filter(|uri| !uri.trim().is_empty())
        .ok_or_else(|| HttpError::bad_request("Collection URI is required"))?;
    let collection_uri = sanitize_uri(&collection_uri, "collectionUri")
        .map_err(|err| HttpError::bad_request(err.to_string()))?;

    let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
    let mut active = machine.into_active_model();
    active.collection_uri = Set(Some(collection_uri));
    active.updated_at = Set(now_timestamp());

    let updated = active.update(&state.database).await.map_err(HttpError::internal)?;
    Ok(Json(updated.into()))
}

async fn set_nft_uris(
    Path(candy_machine_id): Path<String>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NftUrisRequest>,
) -> Result<Json<CandyMachineDocument>, HttpError> {
    if request.nft_uris.is_empty() {
        return Err(HttpError::bad_request("NFT URIs array is required"));
    }
    let nft_uris = sanitize_nft_uris(&request.nft_uris)
        .map_err(|err| HttpError::bad_request(err.to_string()))?;

    let machine = require_candy_machine(&state.database, &candy_machine_id).await?;
    let mut active = machine.into_active_model();
    active.nft_uris = Set(Value::from(nft_uris));
    active.updated_at = Set(now_timestamp());

    let updated = active.update(&state.database).await.map_err(HttpError::internal)?;
    Ok(Json(updated.into()))
}

async fn find_by_candy_machine_id(
    database: &DatabaseConnection,
    candy_machine_id: &str,
) -> Result<Option<candy_machine::Model>, HttpError> {
    CandyMachine::find()
        .filter(candy_machine::Column::CandyMachineId.eq(candy_machine_id))
        .one(database)
        .await
        .map_err(HttpError::internal)
}

async fn require_candy_machine(
    database: &DatabaseConnection,
    candy_machine_id: &str,
) -> Result<candy_machine::Model, HttpError> {
    find_by_candy_machine_id(database, candy_machine_id)
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> HttpError {
    HttpError::new(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_string())
}

/// Current time at the microsecond precision the database stores.
fn now_timestamp() -> DateTimeWithTimeZone {
    let now = Utc::now().fixed_offset();
    now.with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now)
}

/// A write stamp strictly after `observed`, even on a coarse clock.
fn next_timestamp(observed: DateTimeWithTimeZone) -> DateTimeWithTimeZone {
    now_timestamp().max(observed + TimeDelta::microseconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_stamps_always_advance() {
        let far_future = now_timestamp() + TimeDelta::days(1);
        assert_eq!(
            next_timestamp(far_future),
            far_future + TimeDelta::microseconds(1)
        );

        let past = now_timestamp() - TimeDelta::days(1);
        let next = next_timestamp(past);
        assert!(next > past + TimeDelta::hours(23));
        assert_eq!(next.nanosecond() % 1_000, 0);
    }
}
