//! HTTP handlers for the order API
//!
//! Every handler resolves the [`Actor`] first and passes it explicitly to the
//! lifecycle or query service. Successful responses carry `success: true`
//! next to the `order` / `orders` payload.

use crate::core::auth::AuthProvider;
use crate::core::error::{MartError, Result, StorageError};
use crate::core::events::EventBus;
use crate::core::extractors::{Actor, json_body, optional_json, parse_uuid};
use crate::core::query::ListParams;
use crate::core::service::{ProofUpload, ProofUploader};
use crate::orders::model::{NewOrder, OrderStatus};
use crate::orders::query::OrderQueryService;
use crate::orders::service::{CheckoutRequest, OrderLifecycleService, VerificationDecision};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use uuid::Uuid;

/// Slack on top of the upload limit for multipart framing and text fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State shared by the order handlers
#[derive(Clone)]
pub struct OrderApiState {
    pub lifecycle: Arc<OrderLifecycleService>,
    pub queries: Arc<OrderQueryService>,
    pub auth: Arc<dyn AuthProvider>,
    pub uploader: Arc<dyn ProofUploader>,
    pub events: Option<EventBus>,
    pub max_upload_bytes: usize,
}

impl FromRef<OrderApiState> for Arc<dyn AuthProvider> {
    fn from_ref(state: &OrderApiState) -> Self {
        state.auth.clone()
    }
}

/// Build the `/orders` routes
pub fn order_routes(state: OrderApiState) -> Router {
    let proof_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/checkout", post(checkout))
        .route("/orders/recent", get(recent_orders))
        .route("/orders/events", get(order_events))
        .route("/orders/track/{human_order_id}", get(track_order))
        .route("/orders/user/{buyer_id}", get(buyer_orders))
        .route("/orders/seller/{seller_id}", get(seller_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/tracking", get(get_tracking))
        .route("/orders/{id}/payment", get(get_payment_record))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/cancel", patch(cancel_order))
        .route(
            "/orders/{id}/payment-proof",
            post(submit_payment_proof).layer(DefaultBodyLimit::max(proof_limit)),
        )
        .route("/orders/{id}/payment-verification", patch(payment_verification))
        .route(
            "/orders/{id}/reject-incomplete-payment",
            patch(reject_incomplete_payment),
        )
        .with_state(state)
}

fn order_json<T: serde::Serialize>(order: T) -> Json<Value> {
    Json(json!({ "success": true, "order": order }))
}

fn orders_json<T: serde::Serialize>(orders: Vec<T>) -> Json<Value> {
    Json(json!({ "success": true, "count": orders.len(), "orders": orders }))
}

// =============================================================================
// Creation
// =============================================================================

pub async fn create_order(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    payload: std::result::Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let request = json_body(payload)?;
    let order = state.lifecycle.place_order(&actor, request).await?;
    Ok((StatusCode::CREATED, order_json(order)))
}

pub async fn checkout(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let request = json_body(payload)?;
    let order = state.lifecycle.checkout_cart(&actor, request).await?;
    Ok((StatusCode::CREATED, order_json(order)))
}

// =============================================================================
// Reads
// =============================================================================

pub async fn get_order(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let view = state.queries.get(&actor, &parse_uuid(&id)?).await?;
    Ok(order_json(view))
}

pub async fn track_order(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(code): Path<String>,
) -> Result<Json<Value>> {
    let view = state.queries.get_by_human_id(&actor, &code).await?;
    Ok(order_json(view))
}

pub async fn get_tracking(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let tracking = state.queries.tracking(&actor, &parse_uuid(&id)?).await?;
    Ok(Json(json!({ "success": true, "tracking": tracking })))
}

pub async fn get_payment_record(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let record = state.queries.payment_record(&actor, &parse_uuid(&id)?).await?;
    Ok(Json(json!({ "success": true, "payment": record })))
}

pub async fn buyer_orders(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(buyer_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let orders = state
        .queries
        .for_buyer(&actor, &parse_uuid(&buyer_id)?, &params)
        .await?;
    Ok(orders_json(orders))
}

pub async fn seller_orders(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(seller_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let orders = state
        .queries
        .for_seller(&actor, &parse_uuid(&seller_id)?, &params)
        .await?;
    Ok(orders_json(orders))
}

/// Every order; admins only
pub async fn list_orders(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let orders = state.queries.all(&actor, &params).await?;
    Ok(orders_json(orders))
}

pub async fn recent_orders(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let orders = state.queries.recent(&actor, params.limit).await?;
    Ok(orders_json(orders))
}

// =============================================================================
// Transitions
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_status: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

pub async fn update_status(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = parse_uuid(&id)?;
    let update = json_body(payload)?;
    let raw = update
        .order_status
        .ok_or_else(|| MartError::field("orderStatus", "is required"))?;
    let status = OrderStatus::parse(raw.trim())
        .ok_or_else(|| MartError::field("orderStatus", "invalid order status"))?;

    let order = state
        .lifecycle
        .advance_status(&actor, id, status, update.message)
        .await?;
    Ok(order_json(order))
}

/// The body is optional; `{"reason": ...}` ends up in the tracking message
pub async fn cancel_order(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let id = parse_uuid(&id)?;
    let ReasonBody { reason } = optional_json(&body)?;
    let order = state.lifecycle.cancel(&actor, id, reason).await?;
    Ok(order_json(order))
}

pub async fn payment_verification(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    payload: std::result::Result<Json<VerificationDecision>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = parse_uuid(&id)?;
    let decision = json_body(payload)?;
    let order = state
        .lifecycle
        .apply_verification_decision(&actor, id, decision)
        .await?;
    Ok(order_json(order))
}

pub async fn reject_incomplete_payment(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    payload: std::result::Result<Json<ReasonBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = parse_uuid(&id)?;
    let ReasonBody { reason } = json_body(payload)?;
    let order = state
        .lifecycle
        .reject_incomplete_payment(&actor, id, reason.unwrap_or_default())
        .await?;
    Ok(order_json(order))
}

/// Multipart fields: `utrNumber`, and either a `paymentProof` image or a
/// `paymentProofRef` pointing at an image stored elsewhere
pub async fn submit_payment_proof(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let id = parse_uuid(&id)?;
    actor.require_identity()?;

    let mut utr_number = None;
    let mut proof_ref = None;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "utrNumber" => utr_number = Some(field.text().await?),
            "paymentProofRef" => proof_ref = Some(field.text().await?),
            "paymentProof" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                upload = Some(ProofUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let utr_number = utr_number.unwrap_or_default();
    if utr_number.trim().is_empty() {
        return Err(MartError::field("utrNumber", "is required"));
    }
    let evidence = match (upload, proof_ref) {
        (Some(upload), _) => ProofEvidence::Upload(upload),
        (None, Some(reference)) if !reference.trim().is_empty() => {
            ProofEvidence::Reference(reference)
        }
        _ => return Err(MartError::field("paymentProof", "is required")),
    };

    // Nothing is written to disk for an order that would refuse the proof
    state.lifecycle.ensure_accepts_payment_proof(&actor, id).await?;

    let (payment_proof_ref, stored) = match evidence {
        ProofEvidence::Upload(upload) => (state.uploader.store(upload).await?, true),
        ProofEvidence::Reference(reference) => (reference, false),
    };

    let result = state
        .lifecycle
        .submit_payment_proof(&actor, id, utr_number, payment_proof_ref.clone())
        .await;
    if result.is_err() && stored {
        if let Err(e) = state.uploader.discard(&payment_proof_ref).await {
            warn!(proof = %payment_proof_ref, error = %e, "failed to discard payment proof");
        }
    }
    Ok(order_json(result?))
}

enum ProofEvidence {
    Upload(ProofUpload),
    Reference(String),
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub order_id: Option<String>,
}

/// Server-Sent Events feed of order changes
///
/// Admins may follow every order; everyone else must pass `orderId` for an
/// order they can see.
pub async fn order_events(
    State(state): State<OrderApiState>,
    Actor(actor): Actor,
    Query(filter): Query<EventFilter>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    actor.require_identity()?;
    let events = state.events.clone().ok_or_else(|| {
        MartError::Storage(StorageError::Unavailable {
            backend: "event bus".to_string(),
        })
    })?;

    let order_id: Option<Uuid> = filter.order_id.as_deref().map(parse_uuid).transpose()?;
    match order_id {
        Some(id) => {
            state.queries.tracking(&actor, &id).await?;
        }
        None if actor.is_admin() => {}
        None => {
            return Err(MartError::field(
                "orderId",
                "is required unless subscribing as admin",
            ));
        }
    }

    let stream = BroadcastStream::new(events.subscribe()).filter_map(move |item| {
        let event = match item {
            Ok(envelope) if order_id.is_none_or(|id| envelope.event.order_id() == id) => {
                Event::default()
                    .event(envelope.event.action())
                    .id(envelope.id.to_string())
                    .json_data(&envelope)
                    .ok()
                    .map(Ok)
            }
            Ok(_) => None,
            Err(lagged) => {
                warn!(error = %lagged, "order event subscriber lagged");
                None
            }
        };
        futures::future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
