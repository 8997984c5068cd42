//! URL composition and domain syntax checks.
//!
//! Composition is a pure, total function: domains are syntax-checked
//! when the audit request is accepted, not here.

pub mod validator;

pub use validator::validate_all;

use url::Url;

/// Returns true if `domain` is an absolute http/https origin with a host
/// and no path, query, fragment or credentials.
pub fn is_valid_domain(domain: &str) -> bool {
    let trimmed = domain.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return false;
    }

    let Ok(parsed) = Url::parse(trimmed) else {
        return false;
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return false,
    }

    // The parser resolves dot-segments, so `/.` or `/%2e` also parse to "/".
    parsed.username().is_empty()
        && parsed.password().is_none()
        && parsed.path() == "/"
        && parsed.query().is_none()
        && parsed.fragment().is_none()
        && raw_suffix_is_root(trimmed)
}

/// Whether the text after the authority is empty or a single `/`.
fn raw_suffix_is_root(domain: &str) -> bool {
    let Some((_, rest)) = domain.split_once("://") else {
        return false;
    };

    match rest.find(|c: char| matches!(c, '/' | '\\' | '?' | '#')) {
        Some(start) => &rest[start..] == "/",
        None => true,
    }
}

/// Canonical origin form of an accepted domain, e.g. `https://example.com`.
///
/// Scheme and host are lowercased and a default port is dropped. Text that
/// does not parse is only trimmed, keeping composition total.
pub fn canonical_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    match Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => parsed.origin().ascii_serialization(),
        _ => trimmed.trim_end_matches('/').to_string(),
    }
}

/// Normalize a page path to exactly one leading slash and at most one
/// trailing slash.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let had_trailing = trimmed.ends_with('/');
    let inner = trimmed.trim_matches('/');

    if inner.is_empty() {
        return "/".to_string();
    }

    if had_trailing {
        format!("/{}/", inner)
    } else {
        format!("/{}", inner)
    }
}

/// Combine an accepted domain and a relative path into an absolute URL.
pub fn compose(domain: &str, path: &str) -> String {
    format!("{}{}", canonical_domain(domain), normalize_path(path))
}
