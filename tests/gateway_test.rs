//! HTTP-level tests for the calendar gateway against a mock server.

use chrono::NaiveDate;
use fig::auth::TokenStore;
use fig::calendar::{CalendarGateway, EventInput, EventPatch, GatewayError};
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn gateway_for(server: &MockServer, signed_in: bool) -> (CalendarGateway, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(TokenStore::with_path(dir.path().join("token")));
    if signed_in {
        tokens.set(SecretString::from("test-token".to_string())).unwrap();
    }
    let gateway =
        CalendarGateway::new(Some(&server.uri()), "primary", "Asia/Kolkata", "+05:30", tokens);
    (gateway, dir)
}

#[tokio::test]
async fn create_event_builds_fixed_offset_timestamps() {
    let server = MockServer::start().await;
    let expected_body = json!({
        "summary": "Dentist",
        "description": "",
        "start": { "dateTime": "2025-03-15T15:00:00+05:30", "timeZone": "Asia/Kolkata" },
        "end": { "dateTime": "2025-03-15T16:00:00+05:30", "timeZone": "Asia/Kolkata" },
    });
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_json(&expected_body))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "ev1", "summary": "Dentist" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    let input = EventInput {
        title: "Dentist".to_string(),
        date: date(2025, 3, 15),
        start_time: "15:00".to_string(),
        // No end time: defaults to start + 1 hour
        end_time: None,
        notes: None,
    };
    let created = gateway.create_event(&input).await.unwrap();
    assert_eq!(created.id, "ev1");
    assert_eq!(created.title(), "Dentist");
}

#[tokio::test]
async fn create_event_without_token_is_missing_token() {
    let server = MockServer::start().await;
    let (gateway, _dir) = gateway_for(&server, false);
    let input = EventInput {
        title: "Dentist".to_string(),
        date: date(2025, 3, 15),
        start_time: "15:00".to_string(),
        end_time: None,
        notes: None,
    };
    assert!(matches!(
        gateway.create_event(&input).await,
        Err(GatewayError::MissingToken)
    ));
}

#[tokio::test]
async fn list_events_queries_the_day_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("timeMin", "2025-03-15T00:00:00+05:30"))
        .and(query_param("timeMax", "2025-03-15T23:59:59+05:30"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "ev1", "summary": "Dentist",
                  "start": { "dateTime": "2025-03-15T15:00:00+05:30" } },
                { "id": "ev2", "summary": "Walk",
                  "start": { "date": "2025-03-15" } },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    let items = gateway.list_events_on(date(2025, 3, 15)).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title(), "Dentist");
    assert_eq!(items[0].start_display(), "2025-03-15T15:00:00+05:30");
    // All-day events fall back to the bare date
    assert_eq!(items[1].start_display(), "2025-03-15");
}

#[tokio::test]
async fn list_events_surfaces_auth_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    match gateway.list_events_on(date(2025, 3, 15)).await {
        Err(GatewayError::Status(status)) => assert_eq!(status.as_u16(), 401),
        other => panic!("expected status error, got {:?}", other.map(|v| v.len())),
    }
}

#[tokio::test]
async fn update_event_patches_only_given_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/calendars/primary/events/ev1"))
        .and(body_json(&json!({ "summary": "Dentist visit" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "ev1", "summary": "Dentist visit" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    let patch = EventPatch { title: Some("Dentist visit".to_string()), ..Default::default() };
    let updated = gateway.update_event("ev1", &patch).await.unwrap();
    assert_eq!(updated.title(), "Dentist visit");
}

#[tokio::test]
async fn update_event_rebuilds_times_with_date_and_start() {
    let server = MockServer::start().await;
    let expected_body = json!({
        "start": { "dateTime": "2025-03-16T10:00:00+05:30", "timeZone": "Asia/Kolkata" },
        "end": { "dateTime": "2025-03-16T11:00:00+05:30", "timeZone": "Asia/Kolkata" },
    });
    Mock::given(method("PATCH"))
        .and(path("/calendars/primary/events/ev1"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ev1" })))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    let patch = EventPatch {
        date: Some(date(2025, 3, 16)),
        start_time: Some("10:00".to_string()),
        ..Default::default()
    };
    gateway.update_event("ev1", &patch).await.unwrap();
}

#[tokio::test]
async fn delete_event_requires_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/ev1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    assert!(gateway.delete_event("ev1").await.is_ok());
    assert!(matches!(
        gateway.delete_event("gone").await,
        Err(GatewayError::Status(status)) if status.as_u16() == 410
    ));
}

#[tokio::test]
async fn list_calendars_counts_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "primary", "summary": "Personal" },
                { "id": "work@group.calendar.google.com", "summary": "Work" },
            ]
        })))
        .mount(&server)
        .await;

    let (gateway, _dir) = gateway_for(&server, true);
    let calendars = gateway.list_calendars().await.unwrap();
    assert_eq!(calendars.len(), 2);
    assert_eq!(calendars[1].summary.as_deref(), Some("Work"));
}
