//! Minimal kiroku example — instrumented CRUD-style endpoints.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl 'http://localhost:3000/users/42?verbose=true'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -H 'x-request-id: demo-1' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl -O http://localhost:3000/users.csv
//!   curl http://localhost:3000/healthz
//!
//! Every response shows up twice: as an enriched log line and as a metrics
//! event printed by the on_response hook.

use std::sync::Arc;

use kiroku::{Exchange, Finished, RequestContext, Router, Server, StatusCode, Telemetry, health};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let telemetry = Arc::new(
        Telemetry::builder()
            .route_with_method(true)
            .on_request(|route| println!("metrics: request  {route}"))
            .on_response(|route, status, elapsed| {
                println!("metrics: response {route} -> {status} in {elapsed:?}")
            })
            .build(),
    );

    let app = Router::new()
        .get("/users/{id}", get_user)
        .post("/users", create_user)
        .delete("/users/{id}", delete_user)
        .get("/users.csv", export_users)
        .get("/old-users/{id}", moved)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    Server::bind("0.0.0.0:3000")
        .telemetry(telemetry)
        // Trust the reverse proxy's request id header; everything downstream
        // of this line logs it automatically.
        .context_from(|headers| {
            let mut ctx = RequestContext::new();
            if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
                ctx = ctx.with_request_id(id);
            }
            ctx
        })
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}?verbose=true
async fn get_user(ex: Exchange) -> Finished {
    let id = ex.path_value("id").to_u64();
    if id == 0 {
        let payload = ex.error_response("user id must be a positive integer");
        return ex.json(StatusCode::BAD_REQUEST, &payload);
    }
    let verbose = ex.query_value("verbose").to_bool();
    ex.json(
        StatusCode::OK,
        &serde_json::json!({ "id": id, "name": "alice", "verbose": verbose }),
    )
}

// POST /users
async fn create_user(ex: Exchange) -> Finished {
    if ex.body().is_empty() {
        return ex.bad_request("empty body");
    }
    ex.finish(StatusCode::CREATED, "created")
}

// DELETE /users/{id} -> 204
async fn delete_user(ex: Exchange) -> Finished {
    ex.no_content()
}

// GET /users.csv -> file download
async fn export_users(ex: Exchange) -> Finished {
    ex.file(StatusCode::OK, "users.csv", "text/csv", b"id,name\n42,alice\n")
}

// GET /old-users/{id} -> redirect to the new path
async fn moved(ex: Exchange) -> Finished {
    let id = ex.path_value("id").into_string();
    ex.redirect(StatusCode::PERMANENT_REDIRECT, &format!("/users/{id}"))
}
