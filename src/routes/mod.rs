//! HTTP handlers, grouped by the part of the lab they manage

pub mod lab_sessions;
pub mod mentors;
pub mod reports;
pub mod sms;
pub mod students;
pub mod tags;

use axum::http::header::REFERER;
use axum::http::HeaderMap;
use axum::response::Redirect;

/// Page the browser came from, empty when unknown
pub(crate) fn referrer(headers: &HeaderMap) -> String {
    headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Return to the page an edit was started from
pub(crate) fn redirect_back(referrer: &str) -> Redirect {
    if referrer.trim().is_empty() {
        Redirect::to("/leader_board")
    } else {
        Redirect::to(referrer)
    }
}

/// Treat blank form fields as absent
pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;

    #[test]
    fn test_referrer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(referrer(&headers), "");

        headers.insert(REFERER, HeaderValue::from_static("http://hours.local/students/4"));
        assert_eq!(referrer(&headers), "http://hours.local/students/4");
    }

    #[test]
    fn test_redirect_back_defaults_to_leader_board() {
        let response = redirect_back("  ").into_response();
        assert_eq!(response.headers()[LOCATION], "/leader_board");

        let response = redirect_back("/students/4").into_response();
        assert_eq!(response.headers()[LOCATION], "/students/4");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(" notes "), Some("notes"));
        assert_eq!(non_empty("   "), None);
    }
}
