//! HTTP route normalization.
//!
//! Route definitions (`#[get("/users/{id}")]`, `@app.get("/users/<id>")`,
//! `app.get("/users/:id")`) and client calls (`fetch(`/users/${id}`)`) spell
//! the same path differently. Both sides are reduced to one canonical form
//! before the linker compares them.

/// Longest literal considered a route.
const MAX_ROUTE_LEN: usize = 512;

/// Placeholder for any parameter segment.
pub const PARAM: &str = "{}";

/// Wildcard HTTP method.
pub const ANY_METHOD: &str = "ANY";

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Normalize a route literal.
///
/// Strips scheme and host, query and fragment, collapses repeated slashes,
/// drops the trailing slash, replaces parameter segments with `{}` and
/// lowercases the result. Returns `None` for strings that are not absolute
/// paths (relative file paths, prose, empty strings).
pub fn normalize_route(raw: &str) -> Option<String> {
    let mut value = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if value.is_empty() || value.len() > MAX_ROUTE_LEN {
        return None;
    }
    if value.chars().any(char::is_whitespace) || value.contains('\\') {
        return None;
    }

    if let Some(rest) = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
    {
        value = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
    } else if value.starts_with("${") || value.starts_with('{') {
        // `${BASE_URL}/users`, f"{BASE}/users" -> `/users`
        let close = value.find('}')?;
        value = &value[close + 1..];
    }

    if !value.starts_with('/') {
        return None;
    }
    if let Some(end) = value.find(['?', '#']) {
        value = &value[..end];
    }

    let segments: Vec<String> = value
        .split('/')
        .filter(|s| !s.is_empty())
        .map(normalize_segment)
        .collect();
    if segments.is_empty() {
        return Some("/".to_string());
    }

    let mut out = String::with_capacity(value.len());
    for segment in segments {
        out.push('/');
        out.push_str(&segment);
    }
    Some(out.to_ascii_lowercase())
}

fn normalize_segment(segment: &str) -> String {
    let is_param = segment.starts_with(':')
        || segment.starts_with('{')
        || segment.starts_with('<')
        || (segment.starts_with('[') && segment.ends_with(']'))
        || segment.contains("${")
        || segment == "*"
        || segment.bytes().all(|b| b.is_ascii_digit())
        || is_uuid_like(segment);
    if is_param {
        PARAM.to_string()
    } else {
        segment.to_string()
    }
}

fn is_uuid_like(segment: &str) -> bool {
    let hex = segment.bytes().filter(u8::is_ascii_hexdigit).count();
    let dashes = segment.bytes().filter(|&b| b == b'-').count();
    dashes > 0 && hex >= 16 && hex + dashes == segment.len()
}

/// Normalize an HTTP method name; `None` for anything that is not one.
///
/// `route`/`api_route`/`all`/`any`/`request` style registrations map to
/// [`ANY_METHOD`].
pub fn normalize_method(raw: &str) -> Option<String> {
    let upper = raw.trim().to_ascii_uppercase();
    if METHODS.contains(&upper.as_str()) {
        return Some(upper);
    }
    match upper.as_str() {
        "ALL" | "ANY" | "ROUTE" | "API_ROUTE" | "REQUEST" | "USE" => Some(ANY_METHOD.to_string()),
        "DEL" => Some("DELETE".to_string()),
        _ => None,
    }
}

/// Whether a client call with `call` method may hit a route defined for
/// `route`. A missing method on either side matches anything.
pub fn methods_compatible(call: Option<&str>, route: Option<&str>) -> bool {
    match (call, route) {
        (Some(a), Some(b)) => a == b || a == ANY_METHOD || b == ANY_METHOD,
        _ => true,
    }
}

/// Name given to a route symbol: `"GET /users/{}"`.
pub fn route_symbol_name(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

/// Split a route symbol name back into method and path.
pub fn parse_route_symbol_name(name: &str) -> Option<(&str, &str)> {
    let (method, path) = name.split_once(' ')?;
    path.starts_with('/').then_some((method, path))
}
