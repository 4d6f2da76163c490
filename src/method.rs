//! HTTP method as a typed enum.
//!
//! Routes answer a fixed set of seven methods. Each variant doubles as an index
//! into the per-method slot arrays held by [`Route`](crate::Route) and
//! [`CompiledRoute`](crate::CompiledRoute), so "is a handler registered for
//! POST?" is a bounds-free array read rather than a map lookup.
//!
//! Anything outside this set (TRACE, CONNECT, WebDAV verbs, …) never matches a
//! route slot and is answered with `405 Method Not Allowed` by the dispatcher.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    /// Number of routable methods; the length of every per-method slot array.
    pub const COUNT: usize = 7;

    /// Every routable method, in slot order.
    pub const ALL: [Method; Self::COUNT] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get     => "GET",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Delete  => "DELETE",
            Self::Patch   => "PATCH",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Error returned when a string names no routable method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

/// Parses a method name. Case-insensitive: the dispatcher uppercases whatever
/// arrives on the wire, and route authors may write `"post"` or `"POST"`.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod(s.to_owned()))
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
