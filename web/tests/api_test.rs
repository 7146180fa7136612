//! HTTP scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use raffle_core::environment::SeededRandom;
use raffle_core::notification::NotificationSink;
use raffle_core::types::{Actor, ActorId, Raffle};
use raffle_runtime::{EngineConfig, EngineEnvironment, Notifier, RaffleEngine};
use raffle_testing::{InMemoryBlobStore, InMemoryRaffleStore, ManualClock, RecordingSink};
use raffle_web::{ACTOR_ID_HEADER, ACTOR_OPERATOR_HEADER, AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;

fn server() -> TestServer {
    raffle_testing::init_test_tracing();
    let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::new());
    let (notifier, _worker) = Notifier::spawn(sink, 16);
    let engine = RaffleEngine::new(
        EngineEnvironment {
            store: Arc::new(InMemoryRaffleStore::new()),
            clock: Arc::new(ManualClock::starting_at_test_time()),
            random: Arc::new(SeededRandom::new(11)),
            blobs: Arc::new(InMemoryBlobStore::new()),
            notifier,
        },
        EngineConfig::default(),
    );
    TestServer::new(build_router(AppState::new(engine))).expect("Router should start")
}

fn as_actor(request: TestRequest, actor: &Actor) -> TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-actor-id"),
            HeaderValue::from_str(&actor.id.to_string()).unwrap(),
        )
        .add_header(
            HeaderName::from_static("x-actor-operator"),
            HeaderValue::from_static(if actor.is_operator { "true" } else { "false" }),
        )
}

fn operator() -> Actor {
    Actor::operator(ActorId::new())
}

fn buyer() -> Actor {
    Actor::buyer(ActorId::new())
}

async fn create_raffle(server: &TestServer, operator: &Actor, total: u32) -> Raffle {
    let response = as_actor(server.post("/api/raffles"), operator)
        .json(&json!({
            "title": "Mountain bike",
            "ticket_price": 1000,
            "total_tickets": total,
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    serde_json::from_value(body["value"].clone()).unwrap()
}

async fn purchase(server: &TestServer, buyer: &Actor, raffle: &Raffle, quantity: u32) -> Value {
    as_actor(
        server.post(&format!("/api/raffles/{}/purchases", raffle.id)),
        buyer,
    )
    .json(&json!({
        "full_name": "Maria Silva",
        "rg": "12.345.678-9",
        "payment_proof": "mem://proof-1.pdf",
        "quantity": quantity,
    }))
    .await
    .json()
}

#[test]
fn header_names_match_the_extractor() {
    assert_eq!(ACTOR_ID_HEADER.to_ascii_lowercase(), "x-actor-id");
    assert_eq!(ACTOR_OPERATOR_HEADER.to_ascii_lowercase(), "x-actor-operator");
}

#[tokio::test]
async fn health_probes_answer() {
    let server = server();
    server.get("/health").await.assert_status_ok();
    server.get("/ready").await.assert_status_ok();
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let server = server();
    let response = server
        .post("/api/raffles")
        .json(&json!({"title": "Bike", "ticket_price": 1000, "total_tickets": 10}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn buyers_cannot_create_raffles() {
    let server = server();
    let response = as_actor(server.post("/api/raffles"), &buyer())
        .json(&json!({"title": "Bike", "ticket_price": 1000, "total_tickets": 10}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_raffle_fields_are_unprocessable() {
    let server = server();
    let response = as_actor(server.post("/api/raffles"), &operator())
        .json(&json!({"title": "  ", "ticket_price": 1000, "total_tickets": 10}))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn purchase_approve_and_draw() {
    let server = server();
    let operator = operator();
    let buyer = buyer();
    let raffle = create_raffle(&server, &operator, 5).await;

    let bought = purchase(&server, &buyer, &raffle, 2).await;
    assert_eq!(bought["requested"], 2);
    assert_eq!(bought["allocated"], 2);
    assert_eq!(bought["is_short"], false);
    let tickets = bought["tickets"].as_array().unwrap();
    assert!(tickets.iter().all(|t| t["status"] == "pending"));

    let available: Value = server
        .get(&format!("/api/raffles/{}/available", raffle.id))
        .await
        .json();
    assert_eq!(available["count"], 3);

    let ticket_id = tickets[0]["id"].as_str().unwrap();
    let winning_number = tickets[0]["ticket_number"].as_u64().unwrap();
    let approved = as_actor(
        server.post(&format!("/api/tickets/{ticket_id}/approve")),
        &operator,
    )
    .await;
    approved.assert_status_ok();
    let approved: Value = approved.json();
    assert_eq!(approved["value"]["status"], "approved");

    let again = as_actor(
        server.post(&format!("/api/tickets/{ticket_id}/approve")),
        &operator,
    )
    .await;
    again.assert_status(StatusCode::CONFLICT);
    let again: Value = again.json();
    assert_eq!(again["code"], "ALREADY_DECIDED");

    let drawn = as_actor(
        server.post(&format!("/api/raffles/{}/draw", raffle.id)),
        &operator,
    )
    .json(&json!({ "number": winning_number }))
    .await;
    drawn.assert_status_ok();
    let drawn: Value = drawn.json();
    assert_eq!(drawn["value"]["number"], winning_number);
    assert_eq!(drawn["value"]["raffle"]["status"], "completed");

    let stats: Value = server
        .get(&format!("/api/raffles/{}/stats", raffle.id))
        .await
        .json();
    assert_eq!(stats["approved"], 1);
    assert_eq!(stats["revenue"], 1000);
}

#[tokio::test]
async fn sold_out_raffle_reports_no_capacity() {
    let server = server();
    let operator = operator();
    let raffle = create_raffle(&server, &operator, 1).await;
    purchase(&server, &buyer(), &raffle, 1).await;

    let response = as_actor(
        server.post(&format!("/api/raffles/{}/purchases", raffle.id)),
        &buyer(),
    )
    .json(&json!({
        "full_name": "Joao Souza",
        "rg": "98.765.432-1",
        "payment_proof": "mem://proof-2.pdf",
        "quantity": 1,
    }))
    .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "NO_CAPACITY");
}

#[tokio::test]
async fn short_purchase_is_flagged() {
    let server = server();
    let raffle = create_raffle(&server, &operator(), 3).await;
    let bought = purchase(&server, &buyer(), &raffle, 5).await;
    assert_eq!(bought["allocated"], 3);
    assert_eq!(bought["is_short"], true);
}

#[tokio::test]
async fn unknown_raffle_is_not_found() {
    let server = server();
    let response = server
        .get(&format!("/api/raffles/{}", uuid::Uuid::new_v4()))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn group_decision_applies_to_every_ticket_of_a_proof() {
    let server = server();
    let operator = operator();
    let raffle = create_raffle(&server, &operator, 10).await;
    purchase(&server, &buyer(), &raffle, 3).await;

    let response = as_actor(
        server.post(&format!("/api/raffles/{}/groups/decide", raffle.id)),
        &operator,
    )
    .json(&json!({"payment_proof": "mem://proof-1.pdf", "decision": "reject"}))
    .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["applied"].as_array().unwrap().len(), 3);
    assert!(body["failures"].as_array().unwrap().is_empty());

    let available: Value = server
        .get(&format!("/api/raffles/{}/available", raffle.id))
        .await
        .json();
    assert_eq!(available["count"], 10);
}

#[tokio::test]
async fn reservation_is_confirmed_with_a_proof() {
    let server = server();
    let buyer = buyer();
    let raffle = create_raffle(&server, &operator(), 10).await;

    let reserved = as_actor(
        server.post(&format!("/api/raffles/{}/reservations", raffle.id)),
        &buyer,
    )
    .json(&json!({"full_name": "Joao Souza", "rg": "98.765.432-1", "quantity": 2}))
    .await;
    reserved.assert_status(StatusCode::CREATED);
    let reserved: Value = reserved.json();
    let purchase_id = reserved["purchase_id"].as_str().unwrap().to_string();

    let upload = as_actor(server.post("/api/payment-proofs"), &buyer)
        .content_type("application/pdf")
        .bytes(b"receipt".to_vec().into())
        .await;
    upload.assert_status(StatusCode::CREATED);
    let upload: Value = upload.json();

    let confirmed = as_actor(
        server.post(&format!("/api/purchases/{purchase_id}/confirm")),
        &buyer,
    )
    .json(&json!({"payment_proof": upload["payment_proof"]}))
    .await;
    confirmed.assert_status_ok();
    let confirmed: Value = confirmed.json();
    let tickets = confirmed.as_array().unwrap();
    assert_eq!(tickets.len(), 2);
    assert!(tickets.iter().all(|t| t["status"] == "pending"));

    let mine: Value = as_actor(server.get("/api/me/tickets"), &buyer).await.json();
    assert_eq!(mine.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn global_stats_are_operator_only() {
    let server = server();
    as_actor(server.get("/api/stats"), &buyer())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    as_actor(server.get("/api/stats"), &operator())
        .await
        .assert_status_ok();
}
