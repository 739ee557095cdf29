use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use lockpoint::domain::identity::OwnerId;
use lockpoint::infrastructure::StorageConfig;
use lockpoint::interfaces::http::{ServiceConfig, ServiceState, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const TEST_SECRET: &str = "integration-test-secret-at-least-32-chars!!";

async fn service() -> ServiceState {
    ServiceState::bootstrap(ServiceConfig {
        storage: StorageConfig::Memory,
        auth_secret: TEST_SECRET.to_string(),
        token_ttl_seconds: 3600,
    })
    .await
    .unwrap()
}

fn token_for(state: &ServiceState, owner: &str) -> String {
    state.verifier.mint(&OwnerId::new(owner)).unwrap()
}

async fn send(
    app: Router,
    method: &'static str,
    uri: impl Into<String>,
    token: Option<String>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri.into());
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_lock(app: Router, token: &str, payload: Value) -> String {
    let (status, body) = send(app, "POST", "/locks", Some(token.to_string()), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_lifecycle_records_single_outcome() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({
            "title": "Ship v1",
            "commitment": "I will ship v1 by Friday",
            "criteria": "tagged release on the main branch"
        }),
    )
    .await;

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"].as_str(), Some("locked"));
    assert!(!body["locked_at"].is_null());

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/outcome"),
        Some(token.clone()),
        Some(json!({
            "result": "success",
            "proof_url": "https://example.com/release"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"].as_bool(), Some(true));
    assert_eq!(body["status"].as_str(), Some("completed"));

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/outcome"),
        Some(token.clone()),
        Some(json!({ "result": "fail" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"].as_bool(), Some(false));
    assert_eq!(body["error"].as_str(), Some("conflict"));

    // anonymous read of the finished public record
    let (status, body) = send(app, "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"].as_str(), Some("completed"));
    assert!(!body["resolved_at"].is_null());
    let amendments = body["amendments"].as_array().unwrap();
    assert_eq!(amendments.len(), 1);
    assert_eq!(amendments[0]["kind"].as_str(), Some("outcome"));
    assert!(amendments[0]["body"].as_str().unwrap().contains("success"));
}

#[tokio::test]
async fn test_seal_validation() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Hi", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));

    let (status, _) = send(
        app.clone(),
        "PATCH",
        format!("/locks/{id}"),
        Some(token.clone()),
        Some(json!({ "title": "Ship v1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // right length, wrong confirmation token
    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "yes" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let short_commitment = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v2", "commitment": "soon" }),
    )
    .await;
    let (status, _) = send(
        app,
        "POST",
        format!("/locks/{short_commitment}/seal"),
        Some(token),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stake_round_trip() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({
            "confirm": "seal",
            "stake": { "amount": 25, "currency": "usd" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stake"]["amount"].as_str(), Some("25"));
    assert_eq!(body["stake"]["currency"].as_str(), Some("USD"));

    let (status, body) = send(app.clone(), "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stake"]["amount"].as_str(), Some("25"));
    assert_eq!(body["stake"]["currency"].as_str(), Some("USD"));

    let other = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v2", "commitment": "I will ship v2 sometime" }),
    )
    .await;
    let (status, body) = send(
        app,
        "POST",
        format!("/locks/{other}/seal"),
        Some(token),
        Some(json!({
            "confirm": "seal",
            "stake": { "amount": -1, "currency": "USD" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));
}

#[tokio::test]
async fn test_drop_then_seal_conflicts() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/drop"),
        Some(token.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"].as_str(), Some("dropped"));

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"].as_str(), Some("conflict"));

    // still visible to the owner, gone for everyone else
    let (status, body) = send(
        app.clone(),
        "GET",
        format!("/locks/{id}"),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"].as_str(), Some("dropped"));

    let (status, _) = send(app, "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_owner_is_forbidden() {
    let state = service().await;
    let alice = token_for(&state, "alice");
    let mallory = token_for(&state, "mallory");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &alice,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    let (status, body) = send(
        app.clone(),
        "PATCH",
        format!("/locks/{id}"),
        Some(mallory.clone()),
        Some(json!({ "title": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"].as_str(), Some("forbidden"));

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(mallory.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/drop"),
        Some(mallory.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(alice.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/outcome"),
        Some(mallory),
        Some(json!({ "result": "fail" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["ok"].as_bool(), Some(false));
    assert_eq!(body["error"].as_str(), Some("forbidden"));

    let (status, body) = send(app, "GET", format!("/locks/{id}"), Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"].as_str(), Some("Ship v1"));
    assert_eq!(body["status"].as_str(), Some("locked"));
}

#[tokio::test]
async fn test_visibility_and_listings() {
    let state = service().await;
    let alice = token_for(&state, "alice");
    let mallory = token_for(&state, "mallory");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &alice,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    let (status, _) = send(app.clone(), "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        app.clone(),
        "GET",
        format!("/locks/{id}"),
        Some(mallory),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        app.clone(),
        "GET",
        format!("/locks/{id}"),
        Some(alice.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app.clone(), "GET", "/locks", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());

    let (status, body) = send(
        app.clone(),
        "GET",
        "/locks?mine=true",
        Some(alice.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(app.clone(), "GET", "/locks?mine=true", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(alice),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app.clone(), "GET", "/locks", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_str(), Some(id.as_str()));

    let (status, _) = send(app, "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_amendments_flow() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;

    // drafts take no amendments
    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/amendments"),
        Some(token.clone()),
        Some(json!({ "kind": "milestone", "body": "reached beta" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/amendments"),
        Some(token.clone()),
        Some(json!({ "kind": "milestone", "body": "reached beta" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kind"].as_str(), Some("milestone"));

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/amendments"),
        Some(token.clone()),
        Some(json!({ "kind": "note", "body": "still on track" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // outcome rows only come from the outcome route
    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/amendments"),
        Some(token.clone()),
        Some(json!({ "kind": "outcome", "body": "done" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));

    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/amendments"),
        Some(token),
        Some(json!({ "kind": "note", "body": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // newest first, readable anonymously once public
    let (status, body) = send(
        app,
        "GET",
        format!("/locks/{id}/amendments"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["kind"].as_str(), Some("note"));
    assert_eq!(items[1]["kind"].as_str(), Some("milestone"));
}

#[tokio::test]
async fn test_outcome_accepts_legacy_result_names() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({ "title": "Ship v1", "commitment": "I will ship v1 by Friday" }),
    )
    .await;
    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        "POST",
        format!("/locks/{id}/outcome"),
        Some(token),
        Some(json!({ "result": "failed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"].as_bool(), Some(true));
    assert_eq!(body["status"].as_str(), Some("broken"));
}

#[tokio::test]
async fn test_malformed_requests_answer_in_the_error_envelope() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    let id = create_lock(
        app.clone(),
        &token,
        json!({
            "title": "Ship v3",
            "commitment": "I will ship v3 by Friday"
        }),
    )
    .await;
    let (status, _) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/seal"),
        Some(token.clone()),
        Some(json!({ "confirm": "seal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // An unknown result value is answered in the outcome contract, not as
    // bare extractor text.
    let (status, body) = send(
        app.clone(),
        "POST",
        format!("/locks/{id}/outcome"),
        Some(token.clone()),
        Some(json!({ "result": "maybe" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"].as_bool(), Some(false));
    assert_eq!(body["error"].as_str(), Some("invalid_input"));
    assert!(!body["message"].as_str().unwrap().is_empty());

    let (status, view) = send(app.clone(), "GET", format!("/locks/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"].as_str(), Some("locked"));
    assert!(view["amendments"].as_array().unwrap().is_empty());

    // Body that does not deserialize into a draft.
    let (status, body) = send(
        app.clone(),
        "POST",
        "/locks",
        Some(token.clone()),
        Some(json!({ "title": "Ship v3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));

    // Unparseable ids, on both envelope flavors.
    let (status, body) = send(app.clone(), "GET", "/locks/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));
    assert!(body["ok"].is_null());

    let (status, body) = send(
        app.clone(),
        "POST",
        "/locks/not-a-uuid/outcome",
        Some(token.clone()),
        Some(json!({ "result": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"].as_bool(), Some(false));
    assert_eq!(body["error"].as_str(), Some("invalid_input"));

    let (status, body) = send(app, "GET", "/locks?mine=sometimes", Some(token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"].as_str(), Some("invalid_input"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outcomes_have_one_winner() {
    let state = service().await;
    let token = token_for(&state, "alice");
    let app = build_router(state);

    for round in 0..4 {
        let id = create_lock(
            app.clone(),
            &token,
            json!({
                "title": format!("Race {round}"),
                "commitment": "I will finish this race exactly once"
            }),
        )
        .await;
        let (status, _) = send(
            app.clone(),
            "POST",
            format!("/locks/{id}/seal"),
            Some(token.clone()),
            Some(json!({ "confirm": "seal" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (first, second) = if rand::random::<bool>() {
            ("success", "fail")
        } else {
            ("fail", "success")
        };
        let a = tokio::spawn(send(
            app.clone(),
            "POST",
            format!("/locks/{id}/outcome"),
            Some(token.clone()),
            Some(json!({ "result": first })),
        ));
        let b = tokio::spawn(send(
            app.clone(),
            "POST",
            format!("/locks/{id}/outcome"),
            Some(token.clone()),
            Some(json!({ "result": second })),
        ));
        let (status_a, body_a) = a.await.unwrap();
        let (status_b, body_b) = b.await.unwrap();

        let statuses = [status_a, status_b];
        assert_eq!(
            statuses.iter().filter(|s| **s == StatusCode::OK).count(),
            1,
            "round {round}: expected exactly one winner, got {statuses:?}"
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == StatusCode::CONFLICT)
                .count(),
            1,
            "round {round}: expected exactly one conflict, got {statuses:?}"
        );

        let winner = if status_a == StatusCode::OK {
            &body_a
        } else {
            &body_b
        };
        let final_status = winner["status"].as_str().unwrap();

        let (status, view) = send(app.clone(), "GET", format!("/locks/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"].as_str(), Some(final_status));
        assert_eq!(view["amendments"].as_array().unwrap().len(), 1);
    }
}
