//! Middleware layer.
//!
//! A middleware runs before a route's handler and decides what happens next
//! by returning a [`Flow`]:
//!
//! | Returned            | Effect                                          |
//! |---------------------|-------------------------------------------------|
//! | `Flow::Next`        | run the next middleware, then the handler       |
//! | `Flow::Reject`      | stop; answer `403 Forbidden` with no body       |
//! | `Flow::Respond(res)`| stop; answer with `res` exactly as given        |
//!
//! Middleware is registered per method with [`Route::with`](crate::Route::with).
//! Schema validation ([`validate`]) is itself a middleware and always runs
//! after the explicitly registered ones.
//!
//! Synchronous checks wrap a closure with [`from_fn`]; `bool`, `()`,
//! [`Response`] and `Option<Response>` all convert into a [`Flow`]:
//!
//! ```rust
//! use waypost::{Context, Request, middleware};
//!
//! let require_key = middleware::from_fn(|req: &mut Request, _ctx: &Context| {
//!     req.header("x-api-key") == Some("secret")
//! });
//! # let _ = require_key;
//! ```

pub mod validate;

use crate::handler::BoxFuture;
use crate::request::{Context, Request};
use crate::response::Response;

/// What a middleware decided.
pub enum Flow {
    Next,
    Reject,
    Respond(Response),
}

impl From<bool> for Flow {
    fn from(allow: bool) -> Self {
        if allow { Self::Next } else { Self::Reject }
    }
}

impl From<()> for Flow {
    fn from((): ()) -> Self {
        Self::Next
    }
}

impl From<Response> for Flow {
    fn from(res: Response) -> Self {
        Self::Respond(res)
    }
}

impl From<Option<Response>> for Flow {
    fn from(res: Option<Response>) -> Self {
        res.map_or(Self::Next, Self::Respond)
    }
}

/// Pre-handler logic for one route method.
///
/// The request is borrowed mutably so a middleware may annotate it (the
/// validation middleware stores validated facets this way). Implement the
/// trait directly for async work; use [`from_fn`] for synchronous checks.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a mut Request, ctx: &'a Context) -> BoxFuture<'a, Flow>;
}

/// Wraps a synchronous closure as a [`Middleware`].
pub fn from_fn<F, R>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut Request, &Context) -> R + Send + Sync + 'static,
    R: Into<Flow>,
{
    FnMiddleware(f)
}

/// A closure-backed [`Middleware`]; see [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F, R> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, &Context) -> R + Send + Sync + 'static,
    R: Into<Flow>,
{
    fn call<'a>(&'a self, req: &'a mut Request, ctx: &'a Context) -> BoxFuture<'a, Flow> {
        let flow = (self.0)(req, ctx).into();
        Box::pin(std::future::ready(flow))
    }
}
