//! Schema validation middleware.
//!
//! Checks the facets of a request against the [`Schemas`] declared for its
//! method, in the fixed order body → query → headers → params. The first
//! failing facet ends the request:
//!
//! ```text
//! 400 {"error":"Invalid JSON in request body"}                  body not JSON
//! 400 {"error":"<Facet> validation failed","issues":[…]}        schema said no
//! 500 {"error":"Internal Server Error"}                         validator broke
//! ```
//!
//! Accepted facets are written back onto the request, so the handler reads
//! validated data through [`Request::validated`] / [`Request::json`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;
use serde_json::json;
use tracing::{debug, error};

use super::{Flow, Middleware};
use crate::handler::BoxFuture;
use crate::request::{Context, Facet, FacetError, Request};
use crate::response::Response;
use crate::schema::{Schemas, ValidateError};

/// Builds the validation middleware for one method's schemas.
pub fn for_method(schemas: Arc<Schemas>) -> Validate {
    Validate { schemas }
}

/// The middleware produced by [`for_method`].
pub struct Validate {
    schemas: Arc<Schemas>,
}

impl Middleware for Validate {
    fn call<'a>(&'a self, req: &'a mut Request, _ctx: &'a Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move { self.check(req) })
    }
}

impl Validate {
    fn check(&self, req: &mut Request) -> Flow {
        for facet in Facet::ALL {
            let Some(schema) = self.schemas.get(facet) else { continue };

            let raw = match req.raw_facet(facet) {
                Ok(v) => v,
                Err(e @ FacetError::MalformedJson(_)) => {
                    debug!(path = req.path(), error = %e, "rejecting request body");
                    return Flow::Respond(Response::error(StatusCode::BAD_REQUEST, &e.to_string()));
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(|| schema.validate(raw))) {
                Ok(Ok(value)) => req.set_validated(facet, value),
                Ok(Err(ValidateError::Issues(issues))) => {
                    debug!(path = req.path(), %facet, count = issues.len(), "validation failed");
                    return Flow::Respond(
                        Response::builder()
                            .status(StatusCode::BAD_REQUEST)
                            .json(&json!({
                                "error": format!("{} validation failed", facet.label()),
                                "issues": issues,
                            })),
                    );
                }
                Ok(Err(ValidateError::Internal(message))) => {
                    error!(path = req.path(), %facet, %message, "validator failed");
                    return Flow::Respond(Response::internal_error());
                }
                Err(_) => {
                    error!(path = req.path(), %facet, "validator panicked");
                    return Flow::Respond(Response::internal_error());
                }
            }
        }
        Flow::Next
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde_json::{Value, json};

    use super::*;
    use crate::schema::{self, Issue, JsonSchema};

    fn request(uri: &str, body: &'static [u8]) -> Request {
        let mut req: Request = http::Request::post(uri)
            .header("x-api-key", "k")
            .body(Bytes::from_static(body))
            .unwrap()
            .into();
        req.set_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        req
    }

    async fn run(schemas: Schemas, req: &mut Request) -> Flow {
        for_method(Arc::new(schemas)).call(req, &Context::default()).await
    }

    fn respond(flow: Flow) -> Response {
        match flow {
            Flow::Respond(res) => res,
            Flow::Next => panic!("expected a response, got Next"),
            Flow::Reject => panic!("expected a response, got Reject"),
        }
    }

    fn refuse(label: &'static str) -> impl schema::Schema {
        schema::from_fn(move |_| Err(vec![Issue::new("", label)].into()))
    }

    #[tokio::test]
    async fn no_schemas_pass_through() {
        let mut req = request("/", b"not json");
        assert!(matches!(run(Schemas::new(), &mut req).await, Flow::Next));
        assert!(req.validated(Facet::Body).is_none());
    }

    #[tokio::test]
    async fn malformed_body_has_its_own_error() {
        let mut req = request("/", b"{oops");
        let res = respond(run(Schemas::new().body(schema::from_fn(Ok)), &mut req).await);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body_json().unwrap(), json!({"error": "Invalid JSON in request body"}));
    }

    #[tokio::test]
    async fn failure_names_facet_and_issues() {
        let mut req = request("/", br#"{"name":1}"#);
        let schemas = Schemas::new().body(
            JsonSchema::new(&json!({
                "type": "object",
                "properties": { "name": { "type": "string" } }
            }))
            .unwrap(),
        );
        let res = respond(run(schemas, &mut req).await);
        let body = res.body_json().unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Body validation failed");
        assert_eq!(body["issues"][0]["path"], "/name");
    }

    #[tokio::test]
    async fn facets_run_in_fixed_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let seen = Arc::clone(&seen);
            schema::from_fn(move |v: Value| {
                seen.lock().unwrap().push(name);
                Ok(v)
            })
        };
        // Declared out of order on purpose.
        let schemas = Schemas::new()
            .params(record("params"))
            .headers(record("headers"))
            .query(record("query"))
            .body(record("body"));

        let mut req = request("/?a=1", b"{}");
        assert!(matches!(run(schemas, &mut req).await, Flow::Next));
        assert_eq!(*seen.lock().unwrap(), ["body", "query", "headers", "params"]);
    }

    #[tokio::test]
    async fn first_failing_facet_wins() {
        let mut req = request("/?a=1", b"{}");
        let schemas = Schemas::new().params(refuse("params")).query(refuse("query"));
        let body = respond(run(schemas, &mut req).await).body_json().unwrap();
        assert_eq!(body["error"], "Query validation failed");
        assert_eq!(body["issues"][0]["message"], "query");

        let schemas = Schemas::new().params(refuse("params"));
        let body = respond(run(schemas, &mut req).await).body_json().unwrap();
        assert_eq!(body["error"], "URL Parameters validation failed");
    }

    #[tokio::test]
    async fn accepted_values_replace_raw_ones() {
        let mut req = request("/?page=3", b"{}");
        let schemas = Schemas::new()
            .query(
                JsonSchema::coercing(&json!({
                    "type": "object",
                    "properties": { "page": { "type": "integer" } }
                }))
                .unwrap(),
            )
            .headers(schema::from_fn(|mut v: Value| {
                v["seen"] = json!(true);
                Ok(v)
            }));

        assert!(matches!(run(schemas, &mut req).await, Flow::Next));
        assert_eq!(req.validated(Facet::Query), Some(&json!({"page": 3})));
        assert_eq!(req.validated(Facet::Headers).unwrap()["seen"], true);
        assert_eq!(req.validated(Facet::Headers).unwrap()["x-api-key"], "k");
    }

    #[tokio::test]
    async fn validator_failures_become_500() {
        let mut req = request("/", b"{}");
        let internal = Schemas::new()
            .body(schema::from_fn(|_| Err(ValidateError::Internal("db down".into()))));
        let res = respond(run(internal, &mut req).await);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_json().unwrap(), json!({"error": "Internal Server Error"}));

        let panicking = Schemas::new().body(schema::from_fn(|_| panic!("validator bug")));
        let res = respond(run(panicking, &mut req).await);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
