//! MCP over HTTP through the actix routes.

mod common;

use std::sync::Arc;

use actix_web::{App, http::StatusCode, test, web};
use common::StubProvider;
use llm_delegator::core::server::{self, McpResponse, ServerState};
use serde_json::{Value, json};

fn state() -> Arc<ServerState> {
    Arc::new(ServerState::new(server::initialize_tools(StubProvider::replying(
        "reviewed",
    ))))
}

#[actix_rt::test]
async fn health_endpoints() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(state()))
            .configure(server::routes),
    )
    .await;

    for path in ["/health", "/"] {
        let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(body, json!({"status": "ok", "service": "llm-delegator"}));
    }
}

#[actix_rt::test]
async fn json_rpc_over_post() {
    let state = state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(Arc::clone(&state)))
            .configure(server::routes),
    )
    .await;

    let init = test::TestRequest::post()
        .uri("/mcp")
        .set_json(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
        .to_request();
    let response: McpResponse = test::call_and_read_body_json(&app, init).await;
    assert_eq!(response.result.unwrap()["protocolVersion"], "2024-11-05");

    let call = test::TestRequest::post()
        .uri("/")
        .set_json(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "tools/call",
            "params": {"name": "glm_code_reviewer", "arguments": {"task": "Review the diff"}}
        }))
        .to_request();
    let response: McpResponse = test::call_and_read_body_json(&app, call).await;
    assert_eq!(response.id, Some(json!("abc")));
    assert_eq!(response.result.unwrap()["content"][0]["text"], "reviewed");

    let notification = test::TestRequest::post()
        .uri("/mcp")
        .set_json(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .to_request();
    let reply = test::call_service(&app, notification).await;
    assert_eq!(reply.status(), StatusCode::ACCEPTED);

    let metrics: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(metrics["requests_total"], 3);
    assert_eq!(state.request_count(), 3);
}

#[actix_rt::test]
async fn rejects_non_json_body() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(state()))
            .configure(server::routes),
    )
    .await;
    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("content-type", "application/json"))
        .set_payload("{oops")
        .to_request();
    let reply = test::call_service(&app, req).await;
    assert!(reply.status().is_client_error());
}
