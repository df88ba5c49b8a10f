//! Axum REST API handlers.
//!
//! Every session action answers with the full [`SessionView`], so a client
//! never has to merge partial updates.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use checkout_engine::{
    AddOnSelections, CheckoutApi, CheckoutConfig, CheckoutError, CheckoutSubmissionFlow,
    PledgeSnapshot, SelectionOutcome, SelectionView, ShippingRule, ShippingRulesSource,
    StoredCard, SubmissionResult, SubmissionState, SubmitRequest,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::db;
use crate::errors::{Result, ServiceError};
use crate::records::{CheckoutRecord, NewCheckoutRecord};
use crate::sessions::{OpenSessionRequest, SessionEntry, SessionRegistry, SharedEntry};

pub struct ApiState {
    pub pool: SqlitePool,
    pub registry: SessionRegistry,
    pub checkout_api: Arc<dyn CheckoutApi>,
    pub shipping: Arc<dyn ShippingRulesSource>,
    pub config: CheckoutConfig,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SelectRewardRequest {
    pub reward_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddOnQuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ShippingRequest {
    pub location_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct PledgeAmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub checkout_id: Option<String>,
    pub backing_id: Option<String>,
    pub payment_source_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub reusable: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetupIntentRequest {
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutsQuery {
    pub project_id: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: u64,
    pub project_id: String,
    pub selection: SelectionView,
    pub reward_id: Option<u64>,
    pub add_ons: AddOnSelections,
    pub shipping_rules: Vec<ShippingRule>,
    pub shipping_location_id: Option<u64>,
    pub needs_shipping_rule: bool,
    pub snapshot: Option<PledgeSnapshot>,
    pub submission: SubmissionState,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub failed_attempts: u32,
}

impl SessionView {
    fn of(session_id: u64, entry: &SessionEntry) -> Self {
        let session = &entry.session;
        let state = session.pledge_state();
        Self {
            session_id,
            project_id: session.project().id.clone(),
            selection: session.selection(),
            reward_id: state.reward.as_ref().map(|r| r.id),
            add_ons: state.add_ons.clone(),
            shipping_rules: session.shipping_rules().to_vec(),
            shipping_location_id: state.shipping_rule.as_ref().map(ShippingRule::location_id),
            needs_shipping_rule: session.reward_needing_shipping().is_some()
                && state.shipping_rule.is_none(),
            snapshot: session.snapshot(),
            submission: entry.flow.state(),
            is_loading: state.is_loading,
            last_error: state.last_error.as_ref().map(ToString::to_string),
            failed_attempts: entry.failed_attempts(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub outcome: SelectionOutcome,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub result: SubmissionResult,
    pub session: SessionView,
}

#[derive(Serialize)]
pub struct CheckoutsResponse {
    pub project_id: Option<String>,
    pub count: usize,
    pub checkouts: Vec<CheckoutRecord>,
}

#[derive(Serialize)]
pub struct CardsResponse {
    pub count: usize,
    pub cards: Vec<StoredCard>,
}

#[derive(Serialize)]
pub struct SetupIntentResponse {
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub open_sessions: usize,
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

/// Load shipping rules for the current reward when it ships and has none yet.
/// A failed lookup leaves the session waiting for a rule instead of failing
/// the request.
async fn load_shipping_rules(state: &ApiState, entry: &mut SessionEntry) {
    let Some(reward_id) = entry.session.reward_needing_shipping().map(|r| r.id) else {
        return;
    };
    if !entry.session.shipping_rules().is_empty() {
        return;
    }
    let project_id = entry.session.project().id.clone();
    match state.shipping.fetch_shipping_rules(&project_id, reward_id).await {
        Ok(rules) => entry.session.set_shipping_rules(rules),
        Err(e) => {
            warn!(%project_id, reward_id, "Shipping rules unavailable: {e}");
            entry.session.set_shipping_rules(Vec::new());
        }
    }
}

/// Run a synchronous session action and answer with the resulting view.
async fn with_session<F>(state: &ApiState, id: u64, action: F) -> Result<Json<SessionView>>
where
    F: FnOnce(&mut SessionEntry) -> checkout_engine::Result<()>,
{
    let entry = state.registry.get(id).await?;
    let mut entry = entry.lock().await;
    action(&mut entry)?;
    Ok(Json(SessionView::of(id, &entry)))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        open_sessions: state.registry.len().await,
    })
}

/// `POST /sessions`
pub async fn open_session(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<OpenSessionRequest>,
) -> Result<impl IntoResponse> {
    let (id, entry) = state
        .registry
        .open(body, &state.config, state.checkout_api.clone())
        .await;
    let mut entry = entry.lock().await;
    load_shipping_rules(&state, &mut entry).await;
    Ok((StatusCode::CREATED, Json(SessionView::of(id, &entry))))
}

/// `GET /sessions/:id`
pub async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |_| Ok(())).await
}

/// `DELETE /sessions/:id`
pub async fn close_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.registry.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/reward`
pub async fn select_reward(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<SelectRewardRequest>,
) -> Result<Json<SelectionResponse>> {
    let entry = state.registry.get(id).await?;
    let mut entry = entry.lock().await;
    let outcome = entry.session.select_reward(body.reward_id)?;
    load_shipping_rules(&state, &mut entry).await;
    Ok(Json(SelectionResponse {
        outcome,
        session: SessionView::of(id, &entry),
    }))
}

/// `POST /sessions/:id/confirm`
///
/// Answers the replace-your-pledge dialog raised by a conflicting selection.
pub async fn confirm_selection(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<SelectionResponse>> {
    let entry = state.registry.get(id).await?;
    let mut entry = entry.lock().await;
    let outcome = entry.session.confirm_selection(body.confirmed);
    load_shipping_rules(&state, &mut entry).await;
    Ok(Json(SelectionResponse {
        outcome,
        session: SessionView::of(id, &entry),
    }))
}

/// `PUT /sessions/:id/add-ons/:add_on_id`
pub async fn set_add_on_quantity(
    State(state): State<Arc<ApiState>>,
    Path((id, add_on_id)): Path<(u64, u64)>,
    Json(body): Json<AddOnQuantityRequest>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| {
        e.session.set_add_on_quantity(add_on_id, body.quantity)
    })
    .await
}

/// `POST /sessions/:id/shipping`
pub async fn select_shipping(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<ShippingRequest>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| e.session.select_shipping_rule(body.location_id)).await
}

/// `POST /sessions/:id/pledge/increase`
pub async fn increase_pledge(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| e.session.increase_pledge()).await
}

/// `POST /sessions/:id/pledge/decrease`
pub async fn decrease_pledge(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| e.session.decrease_pledge()).await
}

/// `PUT /sessions/:id/pledge`
pub async fn set_pledge_amount(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<PledgeAmountRequest>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| e.session.set_pledge_amount(body.amount)).await
}

/// `POST /sessions/:id/bonus/increase`
pub async fn increase_bonus(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| {
        e.session.increase_bonus();
        Ok(())
    })
    .await
}

/// `POST /sessions/:id/bonus/decrease`
pub async fn decrease_bonus(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionView>> {
    with_session(&state, id, |e| {
        e.session.decrease_bonus();
        Ok(())
    })
    .await
}

/// `POST /sessions/:id/checkout`
///
/// The session lock is released while the backend calls run; a second
/// submit during that window is refused by the flow itself.
pub async fn submit_checkout(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let shared = state.registry.get(id).await?;

    let (request, flow, reward_id) = {
        let mut entry = shared.lock().await;
        if body.checkout_id.is_some() || body.backing_id.is_some() {
            entry
                .flow
                .provide_checkout(body.checkout_id.clone(), body.backing_id.clone());
        }
        let prepared = entry.session.submit_request(
            body.payment_source_id.clone(),
            body.client_secret.clone(),
            body.reusable,
        );
        let request = match prepared {
            Ok(request) => request,
            Err(e) => {
                let e = entry.flow.reject(e);
                entry.session.record_error(Some(e.clone()));
                return Err(e.into());
            }
        };
        entry.session.record_error(None);
        entry.session.set_loading(true);
        let reward_id = entry
            .session
            .pledge_state()
            .reward
            .as_ref()
            .map(|r| r.id)
            .unwrap_or_default();
        (request, entry.flow.clone(), reward_id)
    };

    // The backend calls run on their own task so a client that disconnects
    // mid-request cannot strand the session in `Loading`.
    let task = tokio::spawn(finish_submission(state, shared, id, flow, request, reward_id));
    task.await.map_err(|e| {
        error!(session_id = id, "Checkout task failed: {e}");
        ServiceError::Checkout(CheckoutError::Api(format!("checkout task failed: {e}")))
    })?
}

async fn finish_submission(
    state: Arc<ApiState>,
    shared: SharedEntry,
    id: u64,
    flow: Arc<CheckoutSubmissionFlow>,
    request: SubmitRequest,
    reward_id: u64,
) -> Result<Json<CheckoutResponse>> {
    let outcome = flow.submit(&request).await;

    let mut entry = shared.lock().await;
    entry.session.set_loading(false);
    match outcome {
        Ok(result) => {
            match NewCheckoutRecord::from_submission(reward_id, &request, &result) {
                Ok(record) => {
                    if let Err(e) = db::insert_checkout(&state.pool, &record).await {
                        error!(checkout_id = %record.checkout_id, "Failed to record checkout: {e}");
                    }
                }
                Err(e) => error!(checkout_id = %result.checkout_id, "Failed to record checkout: {e}"),
            }
            Ok(Json(CheckoutResponse {
                result,
                session: SessionView::of(id, &entry),
            }))
        }
        Err(e) => {
            entry.session.record_error(Some(e.clone()));
            Err(ServiceError::Checkout(e))
        }
    }
}

/// `GET /checkouts`
///
/// Lists recorded checkouts, optionally filtered with `?project_id=`.
pub async fn get_checkouts(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<CheckoutsQuery>,
) -> impl IntoResponse {
    let rows = match &query.project_id {
        Some(project_id) => db::get_checkouts_for_project(&state.pool, project_id).await,
        None => db::get_all_checkouts(&state.pool).await,
    };
    match rows {
        Ok(checkouts) => {
            let count = checkouts.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(CheckoutsResponse {
                    project_id: query.project_id,
                    count,
                    checkouts,
                })),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `GET /cards`
pub async fn get_stored_cards(State(state): State<Arc<ApiState>>) -> Result<Json<CardsResponse>> {
    let cards = state.checkout_api.stored_cards().await?;
    Ok(Json(CardsResponse {
        count: cards.len(),
        cards,
    }))
}

/// `POST /setup-intents`
pub async fn create_setup_intent(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SetupIntentRequest>,
) -> Result<impl IntoResponse> {
    let client_secret = state
        .checkout_api
        .create_setup_intent(body.project_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(SetupIntentResponse { client_secret })))
}
