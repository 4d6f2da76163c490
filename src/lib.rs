//! # waypost
//!
//! File-convention routing for HTTP services. A route's URL comes from where
//! its definition file sits under a routes directory; everything else, from
//! matching to validation to the fallbacks, is handled here.
//!
//! ## The pieces
//!
//! - [`endpoint::derive`] maps a route file path to an endpoint pattern:
//!   `api/users/_id.rs` → `/api/users/:id`, `index.rs` → `/`.
//! - [`Route`] declares, per HTTP method, a handler, optional schemas and
//!   middleware. [`Route::build`] freezes it into a [`CompiledRoute`].
//! - [`middleware::validate`] checks body, query, headers and URL
//!   parameters against the declared schemas before the handler runs.
//! - [`Registry`] holds every compiled route plus the built-in health probes
//!   and the 404 fallback; [`Registry::dispatch`] turns one request into one
//!   response.
//! - [`Server`] feeds requests from hyper into the registry and drains
//!   in-flight connections on shutdown.
//!
//! What the reverse proxy already owns (TLS, rate limiting, body-size
//! limits, slow-client protection) is left to it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use waypost::{
//!     Config, Context, JsonSchema, Method, Registry, Request, Route, RouteError,
//!     RouteSource, Server,
//! };
//!
//! fn users() -> Result<Route, RouteError> {
//!     Route::new()
//!         .on(Method::Post, |req: Request, _ctx: Context| async move {
//!             let name = req.validated(waypost::Facet::Body).map(|b| b["name"].clone());
//!             json!({ "created": name })
//!         })?
//!         .schema(Method::Post, |s| {
//!             Ok(s.body(JsonSchema::new(&json!({
//!                 "type": "object",
//!                 "required": ["name"],
//!                 "properties": { "name": { "type": "string" } }
//!             }))?))
//!         })
//! }
//!
//! static ROUTES: &[RouteSource] = &[RouteSource::new("api/users.rs", users)];
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let config = Config::from_env()?;
//!     waypost::telemetry::init(&config.log)?;
//!     Server::from_config(&config).serve(Registry::build(ROUTES)).await
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod method;
mod registry;
mod request;
mod response;
mod route;
mod server;

pub mod endpoint;
pub mod health;
pub mod middleware;
pub mod schema;
pub mod telemetry;

pub use config::{Config, ConfigError, LogConfig, LogFormat};
pub use endpoint::EndpointPattern;
pub use error::{Error, RouteError};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use middleware::{Flow, Middleware};
pub use registry::{Loader, Registry, RegistryBuilder, RouteSource};
pub use request::{Context, Facet, FacetError, Request};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use route::{CompiledRoute, Pipeline, Route};
pub use schema::{Issue, JsonSchema, Schema, SchemaError, Schemas, ValidateError};
pub use server::{Server, serve_listener};
