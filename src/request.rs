//! Incoming HTTP request type and the per-request [`Context`].
//!
//! A [`Request`] carries four *facets* that schemas can validate: the JSON
//! body, the query string, the headers, and the matched path parameters.
//! Once the validation middleware has accepted a facet, the validated (and
//! possibly coerced) value replaces the raw one for everything downstream:
//! [`Request::facet`] and [`Request::json`] return it instead of re-reading
//! the wire data.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::endpoint::EndpointPattern;

// ── Facet ─────────────────────────────────────────────────────────────────────

/// One of the four validated parts of a request.
///
/// [`Facet::ALL`] is the order validation runs in, which decides the error a
/// request that is wrong in several places reports first.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Facet {
    Body,
    Query,
    Headers,
    Params,
}

impl Facet {
    pub const ALL: [Facet; 4] = [Self::Body, Self::Query, Self::Headers, Self::Params];

    /// Human-readable name used in `"<label> validation failed"` errors.
    pub fn label(self) -> &'static str {
        match self {
            Self::Body    => "Body",
            Self::Query   => "Query",
            Self::Headers => "Headers",
            Self::Params  => "URL Parameters",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The raw value of a facet could not be extracted.
#[derive(Debug, thiserror::Error)]
pub enum FacetError {
    #[error("Invalid JSON in request body")]
    MalformedJson(#[source] serde_json::Error),
}

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request with its body fully buffered.
///
/// Build one from an `http::Request<Bytes>`:
///
/// ```rust
/// use bytes::Bytes;
/// use waypost::Request;
///
/// let req: Request = http::Request::post("/users?page=2")
///     .header("content-type", "application/json")
///     .body(Bytes::from_static(br#"{"name":"alice"}"#))
///     .unwrap()
///     .into();
/// assert_eq!(req.path(), "/users");
/// ```
pub struct Request {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    validated: [Option<Value>; 4],
}

impl Request {
    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Returns `None` for non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route derived from `users/_id.rs`, `req.param("id")` on
    /// `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The validated value of `facet`, if a schema accepted it.
    pub fn validated(&self, facet: Facet) -> Option<&Value> {
        self.validated[facet.index()].as_ref()
    }

    /// The current value of `facet`: the validated value when a schema ran,
    /// otherwise the raw value extracted from the request.
    pub fn facet(&self, facet: Facet) -> Result<Cow<'_, Value>, FacetError> {
        match self.validated(facet) {
            Some(v) => Ok(Cow::Borrowed(v)),
            None => self.raw_facet(facet).map(Cow::Owned),
        }
    }

    /// Deserializes the body, preferring the validated value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.validated(Facet::Body) {
            Some(v) => T::deserialize(v),
            None => serde_json::from_slice(&self.body),
        }
    }

    /// Deserializes any facet, preferring the validated value.
    pub fn facet_as<T: DeserializeOwned>(&self, facet: Facet) -> Result<T, serde_json::Error> {
        match self.facet(facet) {
            Ok(v) => T::deserialize(&*v),
            Err(FacetError::MalformedJson(e)) => Err(e),
        }
    }

    /// Extracts a facet straight from the wire data.
    ///
    /// - body: parsed as JSON (an empty body is malformed)
    /// - query: `name → value` object; a repeated name keeps its last value
    /// - headers: lowercase `name → value` object; repeated headers are joined
    ///   with `", "`
    /// - params: the matched path parameters
    pub(crate) fn raw_facet(&self, facet: Facet) -> Result<Value, FacetError> {
        match facet {
            Facet::Body => serde_json::from_slice(&self.body).map_err(FacetError::MalformedJson),
            Facet::Query => {
                let pairs = url::form_urlencoded::parse(self.query().unwrap_or("").as_bytes());
                let map: Map<String, Value> = pairs
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect();
                Ok(Value::Object(map))
            }
            Facet::Headers => {
                let mut map = Map::new();
                for name in self.headers.keys() {
                    let joined = self
                        .headers
                        .get_all(name)
                        .iter()
                        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                        .collect::<Vec<_>>()
                        .join(", ");
                    map.insert(name.as_str().to_owned(), Value::String(joined));
                }
                Ok(Value::Object(map))
            }
            Facet::Params => Ok(Value::Object(
                self.params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
        }
    }

    pub(crate) fn set_validated(&mut self, facet: Facet, value: Value) {
        self.validated[facet.index()] = Some(value);
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}

impl Request {
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            validated: Default::default(),
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Per-request information about the server side of the exchange.
///
/// Handed to every middleware and handler next to the [`Request`].
#[derive(Clone, Debug, Default)]
pub struct Context {
    remote_addr: Option<SocketAddr>,
    endpoint: Option<EndpointPattern>,
}

impl Context {
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Self { remote_addr, endpoint: None }
    }

    /// Address of the connected peer. `None` when dispatching in-process.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The pattern the request matched, e.g. `/api/users/:id`.
    pub fn endpoint(&self) -> Option<&EndpointPattern> {
        self.endpoint.as_ref()
    }

    pub(crate) fn with_endpoint(mut self, endpoint: EndpointPattern) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(uri: &str, body: &'static [u8]) -> Request {
        http::Request::post(uri)
            .header("x-tag", "a")
            .header("x-tag", "b")
            .header("content-type", "application/json")
            .body(Bytes::from_static(body))
            .unwrap()
            .into()
    }

    #[test]
    fn query_keeps_last_duplicate() {
        let req = request("/search?q=rust&page=1&page=2", b"");
        assert_eq!(
            req.raw_facet(Facet::Query).unwrap(),
            json!({"q": "rust", "page": "2"})
        );
    }

    #[test]
    fn missing_query_is_empty_object() {
        let req = request("/search", b"");
        assert_eq!(req.raw_facet(Facet::Query).unwrap(), json!({}));
    }

    #[test]
    fn headers_are_flattened_and_joined() {
        let req = request("/", b"");
        let headers = req.raw_facet(Facet::Headers).unwrap();
        assert_eq!(headers["x-tag"], "a, b");
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn empty_body_is_malformed_json() {
        let req = request("/", b"");
        assert!(matches!(req.raw_facet(Facet::Body), Err(FacetError::MalformedJson(_))));
    }

    #[test]
    fn validated_value_shadows_raw() {
        let mut req = request("/", br#"{"n":"5"}"#);
        assert_eq!(&*req.facet(Facet::Body).unwrap(), &json!({"n": "5"}));

        req.set_validated(Facet::Body, json!({"n": 5}));
        assert_eq!(&*req.facet(Facet::Body).unwrap(), &json!({"n": 5}));

        #[derive(serde::Deserialize)]
        struct N {
            n: u32,
        }
        assert_eq!(req.json::<N>().unwrap().n, 5);
    }

    #[test]
    fn params_facet_reflects_matched_params() {
        let mut req = request("/users/42", b"");
        req.set_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.raw_facet(Facet::Params).unwrap(), json!({"id": "42"}));
    }
}
