//! End-to-end tests driving the HTTP surface directly, without binding a
//! real TCP socket.

use std::sync::Once;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tinyfaas::config::Config;
use tinyfaas::{engine, http, store};

static INIT_ENGINE: Once = Once::new();

fn init_engine_once() {
    INIT_ENGINE.call_once(|| {
        engine::init().unwrap();
    });
}

async fn test_router() -> axum::Router {
    init_engine_once();
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let config = Config {
        db_path: db_file.path().to_string_lossy().to_string(),
        addr: "127.0.0.1:0".to_string(),
    };
    // Leak the tempfile handle so the backing file survives the pool;
    // the OS reclaims it at process exit.
    std::mem::forget(db_file);
    let pool = store::connect(&config).await.unwrap();
    http::router(pool)
}

async fn post(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(router: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn root_reports_the_service_name() {
    let router = test_router().await;
    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"tinyfaas");
}

#[tokio::test]
async fn ad_hoc_invoke_round_trips_json_values() {
    let router = test_router().await;
    let (status, body) = post(
        &router,
        "/invoke",
        json!({ "source": "export default (x) => ({ doubled: x.n * 2 });", "payload": { "n": 21 } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "doubled": 42 }));
}

#[tokio::test]
async fn absent_payload_becomes_undefined() {
    let router = test_router().await;
    let (status, body) = post(
        &router,
        "/invoke",
        json!({ "source": "export default (x) => x === undefined;" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));
}

#[tokio::test]
async fn null_payload_also_becomes_undefined() {
    let router = test_router().await;
    let (status, body) = post(
        &router,
        "/invoke",
        json!({ "source": "export default (x) => x === undefined;", "payload": null }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));
}

#[tokio::test]
async fn awaits_promise_all_before_responding() {
    let router = test_router().await;
    let source = r#"
        export default async () => {
            const [a, b] = await Promise.all([Promise.resolve(1), Promise.resolve(2)]);
            return a + b;
        };
    "#;
    let (status, body) = post(&router, "/invoke", json!({ "source": source })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(3));
}

#[tokio::test]
async fn empty_source_is_rejected() {
    let router = test_router().await;
    let (status, body) = post(&router, "/invoke", json!({ "source": "" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"].as_str().is_some());
}

#[tokio::test]
async fn synchronous_throw_surfaces_as_server_error() {
    let router = test_router().await;
    let (status, body) = post(
        &router,
        "/invoke",
        json!({ "source": "export default () => { throw new Error('boom'); };" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("boom"));
}

#[tokio::test]
async fn rejected_promise_surfaces_as_server_error() {
    let router = test_router().await;
    let (status, body) = post(
        &router,
        "/invoke",
        json!({ "source": "export default () => Promise.reject(new Error('nope'));" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("nope"));
}

#[tokio::test]
async fn full_function_lifecycle_create_deploy_invoke() {
    let router = test_router().await;

    let (status, body) = post(&router, "/functions", json!({ "name": "greeter" })).await;
    assert_eq!(status, StatusCode::OK);
    let function_id = body["function"]["id"].as_str().unwrap().to_string();
    assert!(body["function"]["live_deployment_id"].is_null());

    let (status, _) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(
        &router,
        &format!("/functions/{function_id}/deployments"),
        json!({ "source": "let count = 0; export default () => { count += 1; return count; };" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployment"]["function_id"], json!(function_id));

    let (status, body) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1));

    // Warm state persists across invocations of the same live deployment.
    let (status, body) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2));

    let (status, body) = get(&router, &format!("/functions/{function_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["function"]["live_deployment_id"].is_string());
}

#[tokio::test]
async fn redeploy_replaces_the_warm_isolate_and_resets_state() {
    let router = test_router().await;

    let (_, body) = post(&router, "/functions", json!({ "name": "counter" })).await;
    let function_id = body["function"]["id"].as_str().unwrap().to_string();

    post(
        &router,
        &format!("/functions/{function_id}/deployments"),
        json!({ "source": "let count = 0; export default () => { count += 1; return count; };" }),
    )
    .await;

    let (_, body) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(body, json!(1));
    let (_, body) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(body, json!(2));

    let (status, body) = post(
        &router,
        &format!("/functions/{function_id}/deployments"),
        json!({ "source": "export default () => 'redeployed';" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_deployment_id = body["deployment"]["id"].as_str().unwrap().to_string();

    let (status, body) = post(&router, &format!("/functions/{function_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("redeployed"));

    let (_, body) = get(&router, &format!("/functions/{function_id}")).await;
    assert_eq!(body["function"]["live_deployment_id"], json!(new_deployment_id));
}

#[tokio::test]
async fn invoking_an_unknown_function_is_not_found() {
    let router = test_router().await;
    let (status, _) = post(&router, "/functions/fn-does-not-exist/invocations", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deploying_to_an_unknown_function_is_not_found() {
    let router = test_router().await;
    let (status, _) = post(
        &router,
        "/functions/fn-does-not-exist/deployments",
        json!({ "source": "export default () => 1;" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_functions_includes_created_ones() {
    let router = test_router().await;
    post(&router, "/functions", json!({ "name": "a" })).await;
    post(&router, "/functions", json!({ "name": "b" })).await;

    let (status, body) = get(&router, "/functions").await;
    assert_eq!(status, StatusCode::OK);
    let functions = body["functions"].as_array().unwrap();
    assert!(functions.len() >= 2);
}

#[tokio::test]
async fn a_throw_in_one_deployment_does_not_affect_another() {
    let router = test_router().await;

    let (_, body) = post(&router, "/functions", json!({ "name": "broken" })).await;
    let broken_id = body["function"]["id"].as_str().unwrap().to_string();
    post(
        &router,
        &format!("/functions/{broken_id}/deployments"),
        json!({ "source": "export default () => { throw new Error('error'); };" }),
    )
    .await;

    let (_, body) = post(&router, "/functions", json!({ "name": "fine" })).await;
    let fine_id = body["function"]["id"].as_str().unwrap().to_string();
    post(
        &router,
        &format!("/functions/{fine_id}/deployments"),
        json!({ "source": "export default () => ({ result: 'hello' });" }),
    )
    .await;

    let (status, body) = post(&router, &format!("/functions/{broken_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"].as_str().unwrap().contains("error"));

    let (status, body) = post(&router, &format!("/functions/{fine_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "result": "hello" }));

    // The broken deployment's own isolate is still usable for subsequent
    // invocations too -- a throw doesn't poison anything beyond that call.
    let (status, body) = post(&router, &format!("/functions/{broken_id}/invocations"), Value::Null).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]["message"].as_str().unwrap().contains("error"));
}
