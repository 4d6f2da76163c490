//! Request dispatch: the per-request state machine.
//!
//! ```text
//! path ──lookup──▶ not found ─────────────────────────▶ 404 {"error":"Not found"}
//!   │
//!   └─ found ──method──▶ not handled ─────────────────▶ 405 {"error":"Method Not Allowed"}
//!                │
//!                └─ handled ──▶ middleware → handler ──▶ whatever they produce
//!
//! panic anywhere above ───────────────────────────────▶ 500 {"error":"Internal Server Error"}
//! ```
//!
//! Dispatch never fails: every request gets a well-formed response. There is
//! no retry at this layer.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::{error, info};

use crate::registry::{Registry, panic_message};
use crate::request::{Context, Request};
use crate::response::Response;

impl Registry {
    /// Routes one request and produces one response.
    pub async fn dispatch(&self, req: Request, remote_addr: Option<SocketAddr>) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();
        info!(%method, %path, "→");

        match AssertUnwindSafe(self.route(req, Context::new(remote_addr)))
            .catch_unwind()
            .await
        {
            Ok(res) => res,
            Err(panic) => {
                error!(
                    %method,
                    %path,
                    panic = panic_message(panic.as_ref()),
                    "request pipeline panicked",
                );
                Response::internal_error()
            }
        }
    }

    async fn route(&self, mut req: Request, ctx: Context) -> Response {
        let Some((entry, params)) = self.lookup(req.path()) else {
            return match self.fallback().resolve(req.method().as_str()) {
                Some(pipeline) => pipeline.run(req, ctx).await,
                None => Response::error(StatusCode::NOT_FOUND, "Not found"),
            };
        };

        let method = req.method().as_str().to_ascii_uppercase();
        let Some(pipeline) = entry.route.resolve(&method) else {
            let allow = entry.route.methods().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("allow", &allow)
                .json(&serde_json::json!({ "error": "Method Not Allowed" }));
        };

        req.set_params(params);
        pipeline.run(req, ctx.with_endpoint(entry.pattern.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::method::Method;
    use crate::route::Route;

    fn get(uri: &str) -> Request {
        http::Request::get(uri).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let res = Registry::build(&[]).dispatch(get("/nope"), None).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body_json().unwrap(), json!({"error": "Not found"}));
    }

    #[tokio::test]
    async fn handler_sees_params_and_endpoint() {
        let registry = Registry::builder()
            .route(
                "users/_id.rs",
                Route::new()
                    .on(Method::Get, |req: Request, ctx: Context| async move {
                        json!({
                            "id": req.param("id"),
                            "endpoint": ctx.endpoint().map(ToString::to_string),
                            "peer": ctx.remote_addr().map(|a| a.to_string()),
                        })
                    })
                    .unwrap(),
            )
            .build();

        let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        let res = registry.dispatch(get("/users/42"), Some(peer)).await;
        assert_eq!(
            res.body_json().unwrap(),
            json!({"id": "42", "endpoint": "/users/:id", "peer": "10.0.0.7:5555"})
        );
    }

    #[tokio::test]
    async fn unhandled_method_lists_allowed() {
        let registry = Registry::builder()
            .route(
                "items.rs",
                Route::new()
                    .on(Method::Get, |_r: Request, _c: Context| async { "list" })
                    .unwrap()
                    .on(Method::Put, |_r: Request, _c: Context| async { "put" })
                    .unwrap(),
            )
            .build();
        let req: Request = http::Request::delete("/items").body(Bytes::new()).unwrap().into();
        let res = registry.dispatch(req, None).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, PUT"));
    }

    #[tokio::test]
    async fn panics_become_generic_500() {
        let registry = Registry::builder()
            .route(
                "boom.rs",
                Route::new()
                    .on(Method::Get, |_r: Request, _c: Context| async {
                        if true {
                            panic!("secret internal detail");
                        }
                        "unreachable"
                    })
                    .unwrap(),
            )
            .build();
        let res = registry.dispatch(get("/boom"), None).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8_lossy(res.body()).into_owned();
        assert_eq!(body, r#"{"error":"Internal Server Error"}"#);
    }
}
