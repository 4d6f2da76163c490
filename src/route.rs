//! Route definitions and their compiled dispatch tables.
//!
//! A [`Route`] describes one endpoint: for each HTTP method, an optional
//! handler, an optional set of [`Schemas`] and a list of middleware. State is
//! kept in a fixed array with one slot per [`Method`], so duplicate
//! registration is a plain "is this slot taken?" check.
//!
//! [`Route::build`] freezes the definition into a [`CompiledRoute`]: per
//! method, a [`Pipeline`] that runs
//!
//! ```text
//! explicit middleware (registration order) → schema validation → handler
//! ```
//!
//! whatever order `with` and `schema` were called in.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::error::RouteError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Flow, Middleware, validate};
use crate::request::{Context, Request};
use crate::response::Response;
use crate::schema::{SchemaError, Schemas};

#[derive(Default)]
struct Slot {
    handler: Option<BoxedHandler>,
    schemas: Option<Arc<Schemas>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Declarative definition of one endpoint.
///
/// ```rust
/// use waypost::{Context, Method, Request, Route, RouteError, middleware};
/// use serde_json::{Value, json};
///
/// fn route() -> Result<Route, RouteError> {
///     Route::new()
///         .on(Method::Get, list)?
///         .on(Method::Post, create)?
///         .with(Method::Post, middleware::from_fn(|req: &mut Request, _: &Context| {
///             req.header("authorization").is_some()
///         }))
///         .schema(Method::Post, |s| Ok(s.body(waypost::schema::from_fn(Ok))))
/// }
///
/// async fn list(_req: Request, _ctx: Context) -> Value { json!([]) }
/// async fn create(req: Request, _ctx: Context) -> Value {
///     req.json::<Value>().unwrap_or_default()
/// }
/// # route().unwrap().build();
/// ```
#[derive(Default)]
pub struct Route {
    slots: [Slot; Method::COUNT],
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `method`.
    ///
    /// # Errors
    ///
    /// [`RouteError::DuplicateHandler`] if `method` already has one.
    pub fn on(mut self, method: Method, handler: impl Handler) -> Result<Self, RouteError> {
        let slot = &mut self.slots[method.index()];
        if slot.handler.is_some() {
            return Err(RouteError::DuplicateHandler(method));
        }
        slot.handler = Some(handler.into_boxed_handler());
        Ok(self)
    }

    /// Declares the facet schemas for `method`.
    ///
    /// `factory` receives an empty [`Schemas`] and returns it populated. A
    /// validation middleware is added to `method`'s chain, after every
    /// explicit middleware.
    ///
    /// # Errors
    ///
    /// [`RouteError::DuplicateSchema`] if `method` already has schemas, or
    /// [`RouteError::Schema`] if the factory fails.
    pub fn schema<F>(mut self, method: Method, factory: F) -> Result<Self, RouteError>
    where
        F: FnOnce(Schemas) -> Result<Schemas, SchemaError>,
    {
        let slot = &mut self.slots[method.index()];
        if slot.schemas.is_some() {
            return Err(RouteError::DuplicateSchema(method));
        }
        slot.schemas = Some(Arc::new(factory(Schemas::new())?));
        Ok(self)
    }

    /// Appends an explicit middleware to `method`'s chain.
    pub fn with(mut self, method: Method, middleware: impl Middleware) -> Self {
        self.slots[method.index()].middleware.push(Arc::new(middleware));
        self
    }

    /// Appends `middleware` to the chain of every method in `methods`.
    pub fn with_each(mut self, methods: &[Method], middleware: impl Middleware) -> Self {
        let shared: Arc<dyn Middleware> = Arc::new(middleware);
        for method in methods {
            self.slots[method.index()].middleware.push(Arc::clone(&shared));
        }
        self
    }

    /// Freezes the definition into its dispatch table.
    ///
    /// Schemas or middleware declared for a method without a handler are
    /// dropped with a warning.
    pub fn build(self) -> CompiledRoute {
        let mut pipelines: [Option<Pipeline>; Method::COUNT] = Default::default();

        for (method, slot) in Method::ALL.into_iter().zip(self.slots) {
            let Some(handler) = slot.handler else {
                if slot.schemas.is_some() || !slot.middleware.is_empty() {
                    warn!(%method, "schemas or middleware declared without a handler; ignored");
                }
                continue;
            };

            let mut chain = slot.middleware;
            if let Some(schemas) = slot.schemas {
                chain.push(Arc::new(validate::for_method(schemas)));
            }
            pipelines[method.index()] = Some(Pipeline { middleware: chain, handler });
        }

        CompiledRoute { pipelines, any: None }
    }
}

// ── CompiledRoute ─────────────────────────────────────────────────────────────

/// An immutable method → [`Pipeline`] table.
///
/// Built from a [`Route`], or with [`CompiledRoute::any`] for endpoints (the
/// health probes, the not-found fallback) that answer every method alike.
pub struct CompiledRoute {
    pipelines: [Option<Pipeline>; Method::COUNT],
    any: Option<Pipeline>,
}

impl CompiledRoute {
    /// A route that answers every method, routable or not, with `handler`.
    pub fn any(handler: impl Handler) -> Self {
        Self {
            pipelines: Default::default(),
            any: Some(Pipeline { middleware: Vec::new(), handler: handler.into_boxed_handler() }),
        }
    }

    /// Methods with a dedicated handler, in slot order.
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        Method::ALL.into_iter().filter(|m| self.pipelines[m.index()].is_some())
    }

    pub fn handles(&self, method: Method) -> bool {
        self.pipelines[method.index()].is_some() || self.any.is_some()
    }

    /// Resolves a wire method name (any case) to its pipeline.
    pub fn resolve(&self, method: &str) -> Option<&Pipeline> {
        method
            .parse::<Method>()
            .ok()
            .and_then(|m| self.pipelines[m.index()].as_ref())
            .or(self.any.as_ref())
    }

    /// The `[GET, POST]`-style summary logged at startup.
    pub(crate) fn verbs(&self) -> String {
        if self.any.is_some() {
            return "ANY".to_owned();
        }
        self.methods().map(Method::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute").field("methods", &self.verbs()).finish()
    }
}

/// One method's middleware chain followed by its handler.
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: BoxedHandler,
}

impl Pipeline {
    /// Runs the chain. A middleware's [`Flow::Respond`] is returned as is,
    /// [`Flow::Reject`] becomes a bodiless `403`, and the handler only runs
    /// once every middleware said [`Flow::Next`].
    pub async fn run(&self, mut req: Request, ctx: Context) -> Response {
        for middleware in &self.middleware {
            match middleware.call(&mut req, &ctx).await {
                Flow::Next => {}
                Flow::Reject => return Response::status(StatusCode::FORBIDDEN),
                Flow::Respond(res) => return res,
            }
        }
        self.handler.call(req, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use serde_json::{Value, json};

    use super::*;
    use crate::middleware;
    use crate::schema::JsonSchema;

    fn request(method: &str, body: &'static [u8]) -> Request {
        http::Request::builder()
            .method(method)
            .uri("/")
            .body(Bytes::from_static(body))
            .unwrap()
            .into()
    }

    async fn echo(req: Request, _ctx: Context) -> Value {
        req.json::<Value>().unwrap_or(Value::Null)
    }

    async fn ok(_req: Request, _ctx: Context) -> &'static str {
        "ok"
    }

    /// A handler that counts its invocations.
    fn counted(calls: &Arc<AtomicUsize>) -> impl Handler {
        let calls = Arc::clone(calls);
        move |_req: Request, _ctx: Context| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                json!({"handled": true})
            }
        }
    }

    async fn run(route: &CompiledRoute, req: Request) -> Response {
        route.resolve(req.method().as_str()).unwrap().run(req, Context::default()).await
    }

    #[test]
    fn duplicate_handler_is_rejected() {
        let err = Route::new().on(Method::Get, ok).unwrap().on(Method::Get, ok).err().unwrap();
        assert!(matches!(err, RouteError::DuplicateHandler(Method::Get)));
        assert_eq!(err.to_string(), "handler for GET already defined");
    }

    #[test]
    fn duplicate_schema_is_rejected() {
        let err = Route::new()
            .schema(Method::Post, Ok)
            .unwrap()
            .schema(Method::Post, Ok)
            .err()
            .unwrap();
        assert!(matches!(err, RouteError::DuplicateSchema(Method::Post)));
    }

    #[test]
    fn schema_factory_errors_surface() {
        let err = Route::new()
            .schema(Method::Post, |s| Ok(s.body(JsonSchema::new(&json!({"type": 3}))?)))
            .err()
            .unwrap();
        assert!(matches!(err, RouteError::Schema(_)));
    }

    #[test]
    fn same_handler_on_different_methods_is_fine() {
        let route = Route::new().on(Method::Get, ok).unwrap().on(Method::Head, ok).unwrap().build();
        assert_eq!(route.methods().collect::<Vec<_>>(), [Method::Get, Method::Head]);
        assert_eq!(route.verbs(), "GET, HEAD");
    }

    #[test]
    fn methods_without_handler_are_not_compiled() {
        let route = Route::new()
            .on(Method::Get, ok)
            .unwrap()
            .schema(Method::Post, Ok)
            .unwrap()
            .with(Method::Delete, middleware::from_fn(|_: &mut Request, _: &Context| true))
            .build();
        assert!(route.handles(Method::Get));
        assert!(!route.handles(Method::Post));
        assert!(!route.handles(Method::Delete));
        assert!(route.resolve("TRACE").is_none());
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let route = Route::new().on(Method::Patch, ok).unwrap().build();
        assert!(route.resolve("patch").is_some());
        assert!(route.resolve("PATCH").is_some());
    }

    #[tokio::test]
    async fn plain_values_become_json() {
        let route = Route::new().on(Method::Post, echo).unwrap().build();
        let res = run(&route, request("POST", br#"{"a":1}"#)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body_json().unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn rejection_is_403_and_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let route = Route::new()
            .on(Method::Get, counted(&calls))
            .unwrap()
            .with(Method::Get, middleware::from_fn(|_: &mut Request, _: &Context| false))
            .build();

        let res = run(&route, request("GET", b"")).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(res.body().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_response_is_returned_verbatim() {
        let calls = Arc::new(AtomicUsize::new(0));
        let route = Route::new()
            .on(Method::Get, counted(&calls))
            .unwrap()
            .with(Method::Get, middleware::from_fn(|_: &mut Request, _: &Context| {
                Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .header("retry-after", "60")
                    .text("slow down")
            }))
            .build();

        let res = run(&route, request("GET", b"")).await;
        assert_eq!(res.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.header("retry-after"), Some("60"));
        assert_eq!(&res.body()[..], b"slow down");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_middleware_runs_before_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        // Schema declared before the middleware: the guard must still win.
        let route = Route::new()
            .on(Method::Post, counted(&calls))
            .unwrap()
            .schema(Method::Post, |s| {
                Ok(s.body(JsonSchema::new(&json!({"required": ["name"]}))?))
            })
            .unwrap()
            .with(Method::Post, middleware::from_fn(|req: &mut Request, _: &Context| {
                req.header("authorization").is_some()
            }))
            .build();

        // Unauthorized and invalid: the guard answers first.
        let res = run(&route, request("POST", b"{}")).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

        let authorized: Request = http::Request::post("/")
            .header("authorization", "token")
            .body(Bytes::from_static(b"{}"))
            .unwrap()
            .into();
        let res = run(&route, authorized).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let route = Route::new()
            .on(Method::Get, ok)
            .unwrap()
            .with(Method::Get, middleware::from_fn(|_: &mut Request, _: &Context| {
                Response::text("first")
            }))
            .with(Method::Get, middleware::from_fn(|_: &mut Request, _: &Context| {
                Response::text("second")
            }))
            .build();
        let res = run(&route, request("GET", b"")).await;
        assert_eq!(&res.body()[..], b"first");
    }

    #[tokio::test]
    async fn with_each_shares_one_middleware() {
        let route = Route::new()
            .on(Method::Get, ok)
            .unwrap()
            .on(Method::Delete, ok)
            .unwrap()
            .with_each(
                &[Method::Get, Method::Delete],
                middleware::from_fn(|_: &mut Request, _: &Context| false),
            )
            .build();
        for method in ["GET", "DELETE"] {
            let res = run(&route, request(method, b"")).await;
            assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn any_route_answers_every_method() {
        let route = CompiledRoute::any(ok);
        for method in ["GET", "POST", "TRACE"] {
            let res = run(&route, request(method, b"")).await;
            assert_eq!(&res.body()[..], b"ok");
        }
        assert_eq!(route.verbs(), "ANY");
    }
}
