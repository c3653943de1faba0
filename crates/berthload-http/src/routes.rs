//! Route table and handlers

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use berthload_api::{
    CompletionRequest, DeleteQuery, ErrorCode, ErrorInfo, HealthStatus, LoginRequest,
    ProfileUpdate, QuantityRequest, RegisterRequest, RequestFields, RequestFilter,
    RequestListQuery, RequestStatus, ShipFilter, ShipListQuery, ShipSpec,
};
use berthload_util::{parse_date, BerthError, DateRange, RequestId, ShipId};
use chrono::NaiveDate;
use std::time::Instant;
use tracing::info;

use crate::{expired_cookie, session_cookie, ApiError, AppState, Caller};

type ApiResult<T> = Result<T, ApiError>;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let users = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/profile", get(profile).put(update_profile));

    let ships = Router::new()
        .route("/", get(list_ships).post(create_ship))
        .route(
            "/:id",
            get(get_ship).put(update_ship).delete(deactivate_ship),
        )
        .route("/:id/basket-entry", post(add_to_basket));

    let requests = Router::new()
        .route("/", get(list_requests))
        .route(
            "/:id",
            get(get_request).put(update_request).delete(delete_request),
        )
        .route("/:id/formation", put(form_request))
        .route("/:id/completion", put(complete_request))
        .route(
            "/:id/ships/:ship_id",
            put(set_ship_quantity).delete(remove_ship),
        );

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/users", users)
        .nest("/api/ships", ships)
        .route("/api/drafts/basket", get(basket))
        .nest("/api/requests", requests)
        .fallback(fallback)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP request"
    );
    response
}

async fn fallback() -> (StatusCode, Json<ErrorInfo>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorInfo::new(ErrorCode::NotFound, "no such route")),
    )
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let store_ok = state.run(|gate| Ok(gate.is_healthy())).await.unwrap_or(false);
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthStatus {
            live: true,
            store_ok,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

fn cookie_header(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&value)
        .map_err(|e| ApiError(BerthError::internal(format!("bad cookie header: {e}"))))
}

// Users

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let user = state.run(move |gate| gate.register(&request)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let response = state.run(move |gate| gate.login(&request)).await?;
    let cookie = cookie_header(session_cookie(
        &state.cookie_name,
        &response.token,
        state.cookie_ttl,
    ))?;
    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

async fn logout(State(state): State<AppState>, Caller(credential): Caller) -> ApiResult<impl IntoResponse> {
    state.run(move |gate| gate.logout(&credential)).await?;
    let cookie = cookie_header(expired_cookie(&state.cookie_name))?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

async fn profile(State(state): State<AppState>, Caller(credential): Caller) -> ApiResult<impl IntoResponse> {
    let user = state.run(move |gate| gate.profile(&credential)).await?;
    Ok(Json(user))
}

async fn update_profile(
    State(state): State<AppState>,
    Caller(credential): Caller,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = body?;
    let user = state
        .run(move |gate| gate.update_profile(&credential, &update))
        .await?;
    Ok(Json(user))
}

// Ship catalog

async fn list_ships(
    State(state): State<AppState>,
    Caller(credential): Caller,
    query: Result<Query<ShipListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let filter = ShipFilter {
        name: query.name,
        min_capacity: query.min_capacity,
        include_inactive: query.include_inactive,
    };
    let ships = state.run(move |gate| gate.list_ships(&credential, filter)).await?;
    Ok(Json(ships))
}

async fn get_ship(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<ShipId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let ship = state.run(move |gate| gate.get_ship(&credential, id)).await?;
    Ok(Json(ship))
}

async fn create_ship(
    State(state): State<AppState>,
    Caller(credential): Caller,
    body: Result<Json<ShipSpec>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(spec) = body?;
    let ship = state.run(move |gate| gate.create_ship(&credential, &spec)).await?;
    Ok((StatusCode::CREATED, Json(ship)))
}

async fn update_ship(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<ShipId>, PathRejection>,
    body: Result<Json<ShipSpec>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(spec) = body?;
    let ship = state
        .run(move |gate| gate.update_ship(&credential, id, &spec))
        .await?;
    Ok(Json(ship))
}

async fn deactivate_ship(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<ShipId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    state.run(move |gate| gate.deactivate_ship(&credential, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_basket(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<ShipId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(ship_id) = path?;
    let association = state
        .run(move |gate| gate.add_to_basket(&credential, ship_id))
        .await?;
    Ok(Json(association))
}

async fn basket(State(state): State<AppState>, Caller(credential): Caller) -> ApiResult<impl IntoResponse> {
    let view = state.run(move |gate| gate.basket(&credential)).await?;
    Ok(Json(view))
}

// Requests

/// Turn query strings into a filter; blank values count as absent
pub fn request_filter(query: &RequestListQuery) -> Result<RequestFilter, BerthError> {
    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
    fn date(name: &str, value: &Option<String>) -> Result<Option<NaiveDate>, BerthError> {
        present(value)
            .map(|raw| {
                parse_date(raw).ok_or_else(|| {
                    BerthError::invalid(format!("{name} must be YYYY-MM-DD, got '{raw}'"))
                })
            })
            .transpose()
    }

    let status = present(&query.status)
        .map(|raw| {
            raw.parse::<RequestStatus>()
                .map_err(|e| BerthError::invalid(e.to_string()))
        })
        .transpose()?;

    Ok(RequestFilter {
        created: DateRange::new(date("from", &query.from)?, date("to", &query.to)?),
        status,
        owner: None,
    })
}

async fn list_requests(
    State(state): State<AppState>,
    Caller(credential): Caller,
    query: Result<Query<RequestListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let filter = request_filter(&query)?;
    let requests = state
        .run(move |gate| gate.list_requests(&credential, filter))
        .await?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<RequestId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let detail = state.run(move |gate| gate.get_request(&credential, id)).await?;
    Ok(Json(detail))
}

async fn update_request(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<RequestId>, PathRejection>,
    body: Result<Json<RequestFields>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(fields) = body?;
    let request = state
        .run(move |gate| gate.update_request(&credential, id, &fields))
        .await?;
    Ok(Json(request))
}

async fn delete_request(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<RequestId>, PathRejection>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;
    let Query(query) = query?;
    state
        .run(move |gate| gate.delete_request(&credential, id, query.mode))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn form_request(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<RequestId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let request = state.run(move |gate| gate.form_request(&credential, id)).await?;
    Ok(Json(request))
}

async fn complete_request(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<RequestId>, PathRejection>,
    body: Result<Json<CompletionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = path?;
    let Json(completion) = body?;
    let request = state
        .run(move |gate| gate.complete_request(&credential, id, completion.outcome))
        .await?;
    Ok(Json(request))
}

async fn set_ship_quantity(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<(RequestId, ShipId)>, PathRejection>,
    body: Result<Json<QuantityRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path((id, ship_id)) = path?;
    let Json(body) = body?;
    let association = state
        .run(move |gate| gate.set_ship_quantity(&credential, id, ship_id, body.quantity))
        .await?;
    Ok(Json(association))
}

async fn remove_ship(
    State(state): State<AppState>,
    Caller(credential): Caller,
    path: Result<Path<(RequestId, ShipId)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path((id, ship_id)) = path?;
    state
        .run(move |gate| gate.remove_ship(&credential, id, ship_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
