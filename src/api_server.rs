//! HTTP surface for the assistant
//!
//! Exposes the same controller the terminal uses so a web chat UI can talk
//! to it: send a message, create an event, list a day's events. Runs next
//! to the REPL and shares state through the controller mutex.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::calendar::{CalendarGateway, EventInput};
use crate::chat::ConversationController;

pub struct ApiState {
    pub chat: Arc<Mutex<ConversationController>>,
    pub gateway: Arc<CalendarGateway>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub replies: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub date: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub start: String,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub success: bool,
    pub message: String,
    pub events: Vec<EventSummary>,
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

fn bad_request(message: String) -> (StatusCode, Json<ApiResponse>) {
    (StatusCode::BAD_REQUEST, Json(ApiResponse { success: false, message }))
}

async fn health_handler() -> Json<ApiResponse> {
    Json(ApiResponse { success: true, message: "ok".to_string() })
}

async fn chat_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    debug!("API chat message: {}", request.message);
    let mut chat = state.chat.lock().await;
    let replies = chat.handle_message(&request.message).await;
    Json(ChatResponse { success: true, replies })
}

async fn create_event_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateEventRequest>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)> {
    let date = NaiveDate::parse_from_str(&request.date, "%Y-%m-%d")
        .map_err(|_| bad_request(format!("Invalid date: {}", request.date)))?;

    let input = EventInput {
        title: request.title,
        date,
        start_time: request.start_time,
        end_time: request.end_time,
        notes: request.notes,
    };
    match state.gateway.create_event(&input).await {
        Ok(created) => Ok(Json(ApiResponse {
            success: true,
            message: format!("Event {} created", created.title()),
        })),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse { success: false, message: format!("Failed to create event: {}", e) }),
        )),
    }
}

async fn list_events_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, (StatusCode, Json<ApiResponse>)> {
    let date = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| bad_request(format!("Invalid date: {}", raw)))?,
        None => {
            let chat = state.chat.lock().await;
            chat.today()
        }
    };

    match state.gateway.list_events_on(date).await {
        Ok(items) => {
            let events = items
                .into_iter()
                .map(|ev| EventSummary {
                    id: ev.id.clone(),
                    title: ev.title().to_string(),
                    start: ev.start_display(),
                })
                .collect();
            Ok(Json(EventsResponse {
                success: true,
                message: format!("Events on {}", date),
                events,
            }))
        }
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse { success: false, message: format!("Failed to list events: {}", e) }),
        )),
    }
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/events", post(create_event_handler).get(list_events_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_api_server(state: Arc<ApiState>, addr: &str) -> Result<()> {
    let router = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
