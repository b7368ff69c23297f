use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use patient_cell::{
    patient_routes, ContactField, IdentityError, IdentityResolver, IdentityStatus, PatientRegistration,
    UpdateContactRequest,
};
use shared_database::ClinicStore;
use shared_models::CareType;
use shared_utils::test_utils::{ClinicFixture, CPF_MARIA, CPF_UNREGISTERED};

fn registration(cpf: &str) -> PatientRegistration {
    PatientRegistration {
        national_id: cpf.to_string(),
        name: "João Pereira".to_string(),
        phone: Some("(31) 98888-7777".to_string()),
        email: None,
        care_type: CareType::Private,
        health_plan_card: None,
    }
}

#[tokio::test]
async fn resolve_distinguishes_found_missing_and_invalid() {
    let fixture = ClinicFixture::new().await;
    let maria = fixture.seed_patient(CPF_MARIA, "Maria Silva").await;
    let resolver = IdentityResolver::new(fixture.store_handle());

    assert_matches!(resolver.resolve("529.982.247-25").await, Ok(IdentityStatus::Found(p)) if p.id == maria.id);
    assert_matches!(resolver.resolve(CPF_UNREGISTERED).await, Ok(IdentityStatus::NotFound));
    assert_matches!(resolver.resolve("123").await, Ok(IdentityStatus::Invalid));
    assert_matches!(resolver.resolve("52998224726").await, Ok(IdentityStatus::Invalid));
}

#[tokio::test]
async fn create_validates_fields() {
    let fixture = ClinicFixture::new().await;
    let resolver = IdentityResolver::new(fixture.store_handle());

    let mut bad_phone = registration(CPF_UNREGISTERED);
    bad_phone.phone = Some("1234".to_string());
    assert_matches!(
        resolver.create_patient(bad_phone).await,
        Err(IdentityError::Invalid { field: ContactField::Phone, .. })
    );

    assert_matches!(
        resolver.create_patient(registration("123")).await,
        Err(IdentityError::Invalid { field: ContactField::NationalId, .. })
    );
    assert_eq!(fixture.store.find_patient_by_national_id(CPF_UNREGISTERED).await.unwrap(), None);

    let created = resolver.create_patient(registration(CPF_UNREGISTERED)).await.unwrap();
    assert_eq!(created.national_id, CPF_UNREGISTERED);
    assert_eq!(created.phone.as_deref(), Some("31988887777"));
}

#[tokio::test]
async fn health_plan_needs_a_card() {
    let fixture = ClinicFixture::new().await;
    let resolver = IdentityResolver::new(fixture.store_handle());

    let mut no_card = registration(CPF_UNREGISTERED);
    no_card.care_type = CareType::HealthPlan;
    assert_matches!(
        resolver.create_patient(no_card.clone()).await,
        Err(IdentityError::Invalid { field: ContactField::HealthPlanCard, .. })
    );

    let mut with_card = no_card;
    with_card.health_plan_card = Some("uni-2024.5566".to_string());
    let created = resolver.create_patient(with_card).await.unwrap();
    assert_eq!(created.care_type, CareType::HealthPlan);
    assert_eq!(created.health_plan_card.as_deref(), Some("UNI20245566"));
}

#[tokio::test]
async fn private_care_drops_any_card() {
    let fixture = ClinicFixture::new().await;
    let resolver = IdentityResolver::new(fixture.store_handle());

    let mut private = registration(CPF_UNREGISTERED);
    private.health_plan_card = Some("UNI20245566".to_string());
    let created = resolver.create_patient(private).await.unwrap();
    assert_eq!(created.care_type, CareType::Private);
    assert_eq!(created.health_plan_card, None);
}

#[tokio::test]
async fn concurrent_registration_yields_one_patient() {
    let fixture = ClinicFixture::new().await;
    let resolver = Arc::new(IdentityResolver::new(fixture.store_handle()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.create_patient(registration(CPF_UNREGISTERED)).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn contact_update_keeps_identity() {
    let fixture = ClinicFixture::new().await;
    let maria = fixture.seed_patient(CPF_MARIA, "Maria Silva").await;
    let resolver = IdentityResolver::new(fixture.store_handle());

    let updated = resolver
        .update_contact(
            maria.id,
            UpdateContactRequest {
                phone: None,
                email: Some("maria@exemplo.com.br".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.national_id, maria.national_id);
    assert_eq!(updated.phone, maria.phone);
    assert_eq!(updated.email.as_deref(), Some("maria@exemplo.com.br"));
}

#[tokio::test]
async fn lookup_route_reports_status() {
    let fixture = ClinicFixture::new().await;
    fixture.seed_patient(CPF_MARIA, "Maria Silva").await;
    let app = patient_routes(Arc::new(IdentityResolver::new(fixture.store_handle())));

    let request = Request::builder()
        .method("GET")
        .uri(format!("/by-cpf/{}", CPF_MARIA))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "found");
    assert_eq!(json["cpf"], "529.982.247-25");

    let request = Request::builder()
        .method("GET")
        .uri("/by-cpf/123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "invalid");
}
