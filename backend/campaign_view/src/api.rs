//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::coordinator::{ActionKey, ActionStatus};
use crate::errors::ViewError;
use crate::view::{CampaignView, CreateCampaignForm};

#[derive(Clone)]
pub struct ApiState {
    pub view: Arc<CampaignView>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns", get(get_campaigns).post(create_campaign))
        .route("/campaigns/refresh", post(refresh_campaigns))
        .route("/campaigns/:id/donors/toggle", post(toggle_donors))
        .route("/campaigns/:id/donate", post(donate))
        .route("/campaigns/:id/withdraw", post(withdraw))
        .route("/campaigns/:id/actions", get(get_actions))
        .route("/durations", get(get_durations))
        .route(
            "/session",
            get(get_session).post(connect_session).delete(disconnect_session),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub campaigns: usize,
    pub ticking: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub count: usize,
}

#[derive(Serialize)]
pub struct DurationsResponse {
    pub durations: Vec<u64>,
}

#[derive(Serialize)]
pub struct ActionsResponse {
    pub campaign_id: u64,
    pub donate: ActionStatus,
    pub withdraw: ActionStatus,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub account: Option<AccountId>,
}

#[derive(Deserialize)]
pub struct DonateRequest {
    /// Ether, e.g. `"0.5"`.
    pub amount: String,
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub account: String,
}

fn status_for(err: &ViewError) -> StatusCode {
    match err {
        ViewError::Load(_) | ViewError::Gateway(_) | ViewError::DonorFetch { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ViewError::Transaction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ViewError::InvalidAmount(_)
        | ViewError::InvalidAccount(_)
        | ViewError::InvalidCampaign(_) => StatusCode::BAD_REQUEST,
        ViewError::UnknownCampaign(_) => StatusCode::NOT_FOUND,
        ViewError::NotFundraiser(_) => StatusCode::FORBIDDEN,
        ViewError::NoSession => StatusCode::UNAUTHORIZED,
        ViewError::ActionInFlight { .. } => StatusCode::CONFLICT,
        ViewError::Database(_)
        | ViewError::Migrate(_)
        | ViewError::Config(_)
        | ViewError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ViewError) -> Response {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: Result<T, ViewError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        campaigns: state.view.records().len(),
        ticking: state.view.ticker().is_running(),
    })
}

/// `GET /campaigns`
///
/// Active and ended campaigns as of the latest tick.
pub async fn get_campaigns(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.view.snapshot())
}

/// `POST /campaigns/refresh`
pub async fn refresh_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    respond(
        state
            .view
            .refresh()
            .await
            .map(|records| RefreshResponse {
                count: records.len(),
            }),
    )
}

/// `POST /campaigns`
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    Json(form): Json<CreateCampaignForm>,
) -> Response {
    respond(state.view.create_campaign(form).await)
}

/// `GET /durations`
pub async fn get_durations(State(state): State<Arc<ApiState>>) -> Response {
    respond(
        state
            .view
            .durations()
            .await
            .map(|durations| DurationsResponse { durations }),
    )
}

/// `POST /campaigns/:id/donors/toggle`
pub async fn toggle_donors(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
) -> Response {
    respond(state.view.toggle_donors(campaign_id).await)
}

/// `POST /campaigns/:id/donate`
pub async fn donate(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
    Json(req): Json<DonateRequest>,
) -> Response {
    respond(state.view.donate(campaign_id, &req.amount).await)
}

/// `POST /campaigns/:id/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
) -> Response {
    respond(state.view.withdraw(campaign_id).await)
}

/// `GET /campaigns/:id/actions`
pub async fn get_actions(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<u64>,
) -> impl IntoResponse {
    Json(ActionsResponse {
        campaign_id,
        donate: state.view.action_status(ActionKey::donate(campaign_id)),
        withdraw: state.view.action_status(ActionKey::withdraw(campaign_id)),
    })
}

/// `GET /session`
pub async fn get_session(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(SessionResponse {
        account: state.view.session().account(),
    })
}

/// `POST /session`
pub async fn connect_session(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ConnectRequest>,
) -> Response {
    let account: AccountId = match req.account.parse() {
        Ok(account) => account,
        Err(e) => return error_response(e),
    };
    respond(
        state
            .view
            .session()
            .connect(account)
            .await
            .map(|()| SessionResponse {
                account: Some(account),
            }),
    )
}

/// `DELETE /session`
pub async fn disconnect_session(State(state): State<Arc<ApiState>>) -> Response {
    respond(
        state
            .view
            .session()
            .disconnect()
            .await
            .map(|()| SessionResponse { account: None }),
    )
}
