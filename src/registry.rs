//! The route registry: endpoint pattern → compiled route.
//!
//! Routes are declared in a manifest of [`RouteSource`]s, one per route file:
//!
//! ```rust
//! use waypost::{Registry, RouteSource};
//!
//! mod routes {
//!     pub mod users {
//!         use waypost::{Context, Method, Request, Route, RouteError};
//!
//!         pub fn route() -> Result<Route, RouteError> {
//!             Route::new().on(Method::Get, |_req: Request, _ctx: Context| async { "[]" })
//!         }
//!     }
//! }
//!
//! static ROUTES: &[RouteSource] = &[RouteSource::new("api/users.rs", routes::users::route)];
//!
//! let registry = Registry::build(ROUTES);
//! assert!(registry.get("/api/users").is_some());
//! ```
//!
//! # Build order
//!
//! 1. Built-ins are seeded: `/health` (liveness) and `/health/ready`
//!    (readiness).
//! 2. Sources are loaded in lexicographic path order, component by component
//!    (the order a sorted directory walk visits them). A source whose pattern
//!    is already taken replaces the earlier entry, built-ins included; every
//!    replacement is logged at `warn`.
//! 3. A source that fails to load (error or panic) is logged and left out.
//!    One bad route never aborts startup.
//!
//! The not-found fallback is not part of the table and cannot be replaced.

use std::collections::{BTreeMap, HashMap};
use std::panic;
use std::path::Path;
use std::sync::Arc;

use http::StatusCode;
use percent_encoding::percent_decode_str;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::endpoint::{self, EndpointPattern};
use crate::error::RouteError;
use crate::health;
use crate::request::{Context, Request};
use crate::response::Response;
use crate::route::{CompiledRoute, Route};

/// Loads one route definition.
pub type Loader = fn() -> Result<Route, RouteError>;

/// A route file and the function that builds its definition.
///
/// `path` is relative to the routes root and determines the endpoint (see
/// [`endpoint::derive`]).
#[derive(Clone, Copy, Debug)]
pub struct RouteSource {
    path: &'static str,
    load: Loader,
}

impl RouteSource {
    pub const fn new(path: &'static str, load: Loader) -> Self {
        Self { path, load }
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Path with `\` separators normalized to `/`, for matching walk results.
    fn normalized(&self) -> String {
        self.path.replace('\\', "/")
    }
}

/// A registered endpoint.
pub(crate) struct Entry {
    pub(crate) pattern: EndpointPattern,
    pub(crate) route: CompiledRoute,
}

// ── RegistryBuilder ───────────────────────────────────────────────────────────

/// Accumulates routes; [`RegistryBuilder::build`] freezes them.
///
/// Starts seeded with the built-in health endpoints.
pub struct RegistryBuilder {
    entries: BTreeMap<EndpointPattern, (String, CompiledRoute)>,
}

impl RegistryBuilder {
    fn new() -> Self {
        let mut builder = Self { entries: BTreeMap::new() };
        builder.insert("<built-in>", endpoint::derive("health"), CompiledRoute::any(health::liveness));
        builder.insert("<built-in>", endpoint::derive("health/ready"), CompiledRoute::any(health::readiness));
        builder
    }

    /// Adds an already-built definition as if it were loaded from `path`.
    pub fn route(mut self, path: &str, route: Route) -> Self {
        self.insert(path, endpoint::derive(path), route.build());
        self
    }

    /// Runs `source`'s loader and adds the result. Failures are logged and
    /// the source is skipped.
    pub fn load(mut self, source: &RouteSource) -> Self {
        match panic::catch_unwind(source.load) {
            Ok(Ok(route)) => {
                self.insert(source.path, endpoint::derive(source.path), route.build());
            }
            Ok(Err(e)) => error!(path = source.path, error = %e, "failed to load route"),
            Err(panic) => error!(
                path = source.path,
                panic = panic_message(panic.as_ref()),
                "route loader panicked",
            ),
        }
        self
    }

    fn insert(&mut self, origin: &str, pattern: EndpointPattern, route: CompiledRoute) {
        if let Some((previous, _)) =
            self.entries.insert(pattern.clone(), (origin.to_owned(), route))
        {
            warn!(%pattern, replaced = %previous, by = origin, "endpoint defined twice; last definition wins");
        }
    }

    /// Freezes the table. Patterns the radix tree cannot hold alongside the
    /// others (e.g. `/users/:id` next to `/users/:name`) are logged and
    /// dropped.
    pub fn build(self) -> Registry {
        let mut tree = matchit::Router::new();
        let mut patterns = BTreeMap::new();

        for (pattern, (origin, route)) in self.entries {
            let entry = Arc::new(Entry { pattern: pattern.clone(), route });
            match tree.insert(pattern.to_tree_path(), Arc::clone(&entry)) {
                Ok(()) => {
                    info!("↪ [{}] {pattern}", entry.route.verbs());
                    patterns.insert(pattern, entry);
                }
                Err(e) => error!(%pattern, %origin, error = %e, "conflicting endpoint; route dropped"),
            }
        }

        Registry {
            tree,
            patterns,
            fallback: CompiledRoute::any(not_found),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The immutable routing table served by the dispatcher.
pub struct Registry {
    tree: matchit::Router<Arc<Entry>>,
    patterns: BTreeMap<EndpointPattern, Arc<Entry>>,
    fallback: CompiledRoute,
}

impl Registry {
    /// An empty builder, seeded with the built-in endpoints.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds the registry from a manifest, loading sources in lexicographic
    /// path order.
    pub fn build(sources: &[RouteSource]) -> Self {
        let mut ordered: Vec<&RouteSource> = sources.iter().collect();
        ordered.sort_by(|a, b| Path::new(&a.normalized()).cmp(Path::new(&b.normalized())));
        ordered
            .into_iter()
            .fold(Self::builder(), RegistryBuilder::load)
            .build()
    }

    /// Builds the registry from the files present under `root`.
    ///
    /// The tree is walked in sorted order. Each file is matched by relative
    /// path against `catalog`; files with no registered loader are logged and
    /// skipped, as are catalog entries whose file is absent. An unreadable
    /// `root` leaves only the built-in endpoints.
    pub fn discover(root: &Path, catalog: &[RouteSource]) -> Self {
        let by_path: HashMap<String, &RouteSource> =
            catalog.iter().map(|s| (s.normalized(), s)).collect();
        let mut builder = Self::builder();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    error!(root = %root.display(), error = %e, "cannot read routes directory");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let key = relative.to_string_lossy().replace('\\', "/");
            match by_path.get(&key) {
                Some(source) => builder = builder.load(source),
                None => warn!(file = %key, "no route registered for file; skipped"),
            }
        }

        builder.build()
    }

    /// Exact lookup by pattern string, e.g. `"/api/users/:id"`.
    pub fn get(&self, pattern: &str) -> Option<&CompiledRoute> {
        self.patterns.get(pattern).map(|e| &e.route)
    }

    /// Every registered pattern, sorted.
    pub fn patterns(&self) -> impl Iterator<Item = &EndpointPattern> {
        self.patterns.keys()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Matches a request path, returning the entry and its path parameters.
    pub(crate) fn lookup(&self, path: &str) -> Option<(Arc<Entry>, HashMap<String, String>)> {
        let matched = self.tree.at(path).ok()?;
        // matchit hands back raw path segments.
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }

    pub(crate) fn fallback(&self) -> &CompiledRoute {
        &self.fallback
    }
}

async fn not_found(_req: Request, _ctx: Context) -> Response {
    Response::error(StatusCode::NOT_FOUND, "Not found")
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
