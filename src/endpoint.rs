//! Source path → URL pattern derivation.
//!
//! One file, one route. The file's location under the routes root *is* its
//! URL:
//!
//! | Source path            | Endpoint          |
//! |------------------------|-------------------|
//! | `index.rs`             | `/`               |
//! | `api/users.rs`         | `/api/users`      |
//! | `api/users/index.rs`   | `/api/users`      |
//! | `api/users/_id.rs`     | `/api/users/:id`  |
//! | `output.css.rs`        | `/output.css`     |
//!
//! Derivation is pure and total: every input yields exactly one pattern.

use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

/// Source-file extensions stripped from the final segment.
const EXTENSIONS: &[&str] = &["rs"];

/// Trailing segments that collapse onto their parent directory.
const COLLAPSED: &[&str] = &["index", "root"];

/// A normalized URL pattern: always starts with `/`, never ends with one
/// (except the root itself), and names parameters as `:name` segments.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EndpointPattern(String);

impl EndpointPattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names of the `:param` segments, in path order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments().filter_map(|s| s.strip_prefix(':'))
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Renders the pattern in the radix tree's syntax: `:id` becomes `{id}`
    /// and literal braces are doubled.
    pub(crate) fn to_tree_path(&self) -> String {
        if self.0 == "/" {
            return "/".to_owned();
        }
        let mut out = String::with_capacity(self.0.len() + 8);
        for segment in self.segments() {
            out.push('/');
            match segment.strip_prefix(':') {
                Some(name) => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
                None => out.push_str(&segment.replace('{', "{{").replace('}', "}}")),
            }
        }
        out
    }
}

impl Borrow<str> for EndpointPattern {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the endpoint for a path relative to the routes root.
///
/// Both `/` and `\` separate segments, so manifests written on either OS
/// produce the same table.
pub fn derive(relative: &str) -> EndpointPattern {
    let mut segments: Vec<String> = relative
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    if let Some(last) = segments.last_mut() {
        strip_extension(last);
        if last.is_empty() {
            segments.pop();
        }
    }

    if segments
        .last()
        .is_some_and(|last| COLLAPSED.iter().any(|c| last.eq_ignore_ascii_case(c)))
    {
        segments.pop();
    }

    if segments.is_empty() {
        return EndpointPattern("/".to_owned());
    }

    let mut pattern = String::new();
    for segment in &segments {
        pattern.push('/');
        match segment.strip_prefix('_') {
            Some(name) if !name.is_empty() => {
                pattern.push(':');
                pattern.push_str(name);
            }
            _ => pattern.push_str(segment),
        }
    }
    EndpointPattern(pattern)
}

/// Derives the endpoint for `file`, stripping the `root` prefix first.
///
/// A `file` outside `root` is derived from its full path rather than
/// rejected.
pub fn derive_under(root: &Path, file: &Path) -> EndpointPattern {
    let relative = file.strip_prefix(root).unwrap_or(file);
    derive(&relative.to_string_lossy())
}

fn strip_extension(segment: &mut String) {
    let Some(dot) = segment.rfind('.') else { return };
    let ext = &segment[dot + 1..];
    if EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
        segment.truncate(dot);
    }
}
