use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::{appointment_routes, SlotAllocationService};
use shared_models::Slot;
use shared_utils::test_utils::{date, time, ClinicFixture, CPF_MARIA};

fn app(fixture: &ClinicFixture) -> (Router, Arc<SlotAllocationService>) {
    let allocation = Arc::new(SlotAllocationService::new(fixture.store_handle(), fixture.clock.clone()));
    (appointment_routes(allocation.clone()), allocation)
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn complete_route_marks_past_appointment_completed() {
    let fixture = ClinicFixture::new().await;
    let (app, allocation) = app(&fixture);
    let maria = fixture.seed_patient(CPF_MARIA, "Maria Silva").await;
    let slot = Slot {
        doctor_id: fixture.dr_ana.id,
        doctor_name: fixture.dr_ana.name.clone(),
        specialty_id: fixture.cardiology.id,
        date: date(2026, 10, 16),
        start_time: time(9, 0),
        duration_minutes: 30,
        location_id: None,
        location_name: None,
    };
    let appointment = allocation.reserve(&slot, maria.id, None).await.unwrap();
    let uri = format!("/{}/complete", appointment.id);

    let early = app.clone().oneshot(post(&uri)).await.unwrap();
    assert_eq!(early.status(), StatusCode::UNPROCESSABLE_ENTITY);

    fixture.clock.advance(Duration::days(2));
    let response = app.clone().oneshot(post(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], json!("completed"));

    let again = app.clone().oneshot(post(&uri)).await.unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let unknown = app.oneshot(post(&format!("/{}/complete", Uuid::new_v4()))).await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn candidates_route_filters_by_location() {
    let fixture = ClinicFixture::new().await;
    let (app, _) = app(&fixture);

    let uri = format!(
        "/candidates?specialty_id={}&location_id={}&limit=3",
        fixture.cardiology.id, fixture.norte.id
    );
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let slots = json["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 3);
    assert!(slots.iter().all(|s| s["location_name"] == json!("Unidade Norte")));
}
