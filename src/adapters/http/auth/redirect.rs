//! Post-login redirect sanitisation.

use url::Url;

/// Reduce a client-supplied redirect to a path on the app.
///
/// - `/path` is kept; `//host` and backslash tricks are rejected
/// - an absolute http(s) URL on the app's host becomes path+query+fragment
/// - anything else falls back to `default_path`
pub fn sanitize_redirect(candidate: Option<&str>, app_url: &str, default_path: &str) -> String {
    let Some(candidate) = candidate.map(str::trim).filter(|c| !c.is_empty()) else {
        return default_path.to_string();
    };
    if candidate.chars().any(|c| c == '\\' || c.is_control()) {
        return default_path.to_string();
    }
    if candidate.starts_with('/') {
        return if candidate.starts_with("//") {
            default_path.to_string()
        } else {
            candidate.to_string()
        };
    }

    match (Url::parse(candidate), Url::parse(app_url)) {
        (Ok(target), Ok(app))
            if matches!(target.scheme(), "http" | "https") && same_host(&target, &app) =>
        {
            let mut path = target.path().to_string();
            if let Some(query) = target.query() {
                path.push('?');
                path.push_str(query);
            }
            if let Some(fragment) = target.fragment() {
                path.push('#');
                path.push_str(fragment);
            }
            if path.starts_with("//") {
                default_path.to_string()
            } else {
                path
            }
        }
        _ => default_path.to_string(),
    }
}

fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// `app_url` joined with an already sanitised path.
pub fn app_location(app_url: &str, path: &str) -> String {
    format!("{}{}", app_url.trim_end_matches('/'), path)
}
