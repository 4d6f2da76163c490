//! A small waypost service: a home page, a validated user collection and a
//! per-user endpoint, plus the built-in health probes.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3001/
//!   curl http://localhost:3001/api/users/42
//!   curl -X POST http://localhost:3001/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3001/api/users -d '{"name":1}'    # 400
//!   curl -X DELETE http://localhost:3001/api/users/42                # 403 without a token
//!   curl http://localhost:3001/health

use waypost::{Config, Registry, RouteSource, Server};

/// One module per route file. In a real service these live under the routes
/// directory as `index.rs`, `api/users.rs` and `api/users/_id.rs`.
mod routes {
    pub mod index {
        use waypost::{Context, Method, Request, Route, RouteError};

        pub fn route() -> Result<Route, RouteError> {
            Route::new().on(Method::Get, |_req: Request, _ctx: Context| async {
                "waypost demo: try /api/users"
            })
        }
    }

    pub mod users {
        use http::StatusCode;
        use serde_json::{Value, json};
        use waypost::{Context, Facet, JsonSchema, Method, Request, Response, Route, RouteError};

        pub fn route() -> Result<Route, RouteError> {
            Route::new()
                .on(Method::Get, list)?
                .on(Method::Post, create)?
                .schema(Method::Post, |s| {
                    Ok(s.body(JsonSchema::new(&json!({
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "email": { "type": "string" }
                        }
                    }))?)
                    .query(JsonSchema::coercing(&json!({
                        "type": "object",
                        "properties": { "notify": { "type": "boolean" } }
                    }))?))
                })
        }

        async fn list(_req: Request, _ctx: Context) -> Value {
            json!([{ "id": "1", "name": "alice" }])
        }

        async fn create(req: Request, _ctx: Context) -> Response {
            let body = req.validated(Facet::Body).cloned().unwrap_or_default();
            let notify = req
                .validated(Facet::Query)
                .and_then(|q| q["notify"].as_bool())
                .unwrap_or(false);
            Response::builder()
                .status(StatusCode::CREATED)
                .header("location", "/api/users/99")
                .json(&json!({ "id": "99", "name": body["name"], "notified": notify }))
        }
    }

    pub mod user {
        use http::StatusCode;
        use serde_json::{Value, json};
        use waypost::{
            Context, JsonSchema, Method, Request, Response, Route, RouteError, middleware,
        };

        pub fn route() -> Result<Route, RouteError> {
            Route::new()
                .on(Method::Get, show)?
                .on(Method::Delete, remove)?
                .with(
                    Method::Delete,
                    middleware::from_fn(|req: &mut Request, _ctx: &Context| {
                        req.header("authorization") == Some("Bearer demo")
                    }),
                )
                .schema(Method::Get, |s| {
                    Ok(s.params(JsonSchema::coercing(&json!({
                        "type": "object",
                        "properties": { "id": { "type": "integer", "minimum": 1 } }
                    }))?))
                })
        }

        async fn show(req: Request, ctx: Context) -> Value {
            json!({
                "id": req.param("id"),
                "endpoint": ctx.endpoint().map(ToString::to_string),
            })
        }

        async fn remove(_req: Request, _ctx: Context) -> Response {
            Response::status(StatusCode::NO_CONTENT)
        }
    }
}

static ROUTES: &[RouteSource] = &[
    RouteSource::new("index.rs", routes::index::route),
    RouteSource::new("api/users.rs", routes::users::route),
    RouteSource::new("api/users/_id.rs", routes::user::route),
];

#[tokio::main]
async fn main() -> Result<(), waypost::Error> {
    let config = Config::from_env()?;
    waypost::telemetry::init(&config.log)?;

    // With a routes directory on disk, only the files actually present are
    // registered; otherwise the whole manifest is.
    let registry = if config.routes_dir.is_dir() {
        Registry::discover(&config.routes_dir, ROUTES)
    } else {
        Registry::build(ROUTES)
    };

    Server::from_config(&config).serve(registry).await
}
