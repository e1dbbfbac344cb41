use axum::{
    body::Body,
    http::{
        header::{self, HeaderValue},
        Method, Request, Response, StatusCode,
    },
    middleware::Next,
};
use tracing::debug;

/// Origin to echo back, if any. A `*` entry reflects every origin outside
/// production so credentialed requests keep working in development.
pub fn allowed_origin(origin: Option<&str>, allowed: &[String], production: bool) -> Option<String> {
    let origin = origin?;
    let has_wildcard = allowed.iter().any(|o| o == "*");

    if (has_wildcard && !production) || allowed.iter().any(|o| o == origin) {
        Some(origin.to_string())
    } else {
        debug!("CORS: origin not allowed: {}", origin);
        None
    }
}

fn apply_headers(response: &mut Response<Body>, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

pub async fn dynamic_cors_middleware(req: Request<Body>, next: Next) -> Response<Body> {
    let config = crate::app_config::config();

    let origin = allowed_origin(
        req.headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok()),
        &config.security.cors_allowed_origins,
        config.is_production(),
    );

    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        if let Some(origin) = origin {
            apply_headers(&mut response, &origin);
            let headers = response.headers_mut();
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(
                    "content-type, authorization, accept, origin, x-requested-with",
                ),
            );
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
        }
        return response;
    }

    let mut response = next.run(req).await;
    if let Some(origin) = origin {
        apply_headers(&mut response, &origin);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_whitelisted_origin() {
        let allowed = origins(&["https://app.example.com"]);
        assert_eq!(
            allowed_origin(Some("https://app.example.com"), &allowed, true).as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(allowed_origin(Some("https://evil.example"), &allowed, true), None);
        assert_eq!(allowed_origin(None, &allowed, true), None);
    }

    #[test]
    fn test_wildcard_only_outside_production() {
        let allowed = origins(&["*"]);
        assert!(allowed_origin(Some("http://localhost:3000"), &allowed, false).is_some());
        assert!(allowed_origin(Some("http://localhost:3000"), &allowed, true).is_none());
    }
}
