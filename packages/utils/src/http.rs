pub mod auth {
    use axum::{
        body::Body,
        extract::{Request, State},
        http::{header, HeaderMap, Response, StatusCode},
        middleware::Next,
        response::IntoResponse,
    };
    use subtle::ConstantTimeEq;

    /// Constant-time string comparison, used everywhere a caller-supplied
    /// credential is checked against a known value so timing does not leak
    /// how many leading bytes matched.
    pub fn constant_time_eq(provided: &str, expected: &str) -> bool {
        provided.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    /// Shared bearer token middleware with realm support.
    /// State is a tuple: (token, realm).
    pub async fn verify_bearer_with_realm(
        State((token, realm)): State<(String, String)>,
        req: Request,
        next: Next,
    ) -> impl IntoResponse {
        let unauthorized = || {
            Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header(header::WWW_AUTHENTICATE, format!("Bearer realm=\"{realm}\""))
                .body(Body::from("Unauthorized"))
                .unwrap()
        };

        let header_val = match req.headers().get(header::AUTHORIZATION) {
            Some(h) => h,
            None => return unauthorized(),
        };

        let Ok(as_str) = header_val.to_str() else {
            return unauthorized();
        };
        let expected = format!("Bearer {token}");
        if !constant_time_eq(as_str, &expected) {
            return unauthorized();
        }

        next.run(req).await.into_response()
    }

    /// Extracts a runner token from `X-Oracle-Runner-Token` or a bearer
    /// `Authorization` header, per PolicyHooks' two accepted forms.
    pub fn extract_runner_token(headers: &HeaderMap) -> Option<String> {
        if let Some(value) = headers.get("X-Oracle-Runner-Token") {
            return value.to_str().ok().map(str::to_string);
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    /// An empty allowlist means "open": every token (including none) passes.
    /// Otherwise the presented token must constant-time-match one entry.
    pub fn runner_token_allowed(allowlist: &[String], presented: Option<&str>) -> bool {
        if allowlist.is_empty() {
            return true;
        }
        match presented {
            Some(token) => allowlist.iter().any(|known| constant_time_eq(token, known)),
            None => false,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use axum::http::HeaderValue;

        #[test]
        fn constant_time_eq_matches_equal_strings() {
            assert!(constant_time_eq("secret", "secret"));
            assert!(!constant_time_eq("secret", "wrong"));
        }

        #[test]
        fn empty_allowlist_is_open() {
            assert!(runner_token_allowed(&[], None));
            assert!(runner_token_allowed(&[], Some("anything")));
        }

        #[test]
        fn nonempty_allowlist_requires_a_match() {
            let allowlist = vec!["token-a".to_string(), "token-b".to_string()];
            assert!(runner_token_allowed(&allowlist, Some("token-b")));
            assert!(!runner_token_allowed(&allowlist, Some("token-c")));
            assert!(!runner_token_allowed(&allowlist, None));
        }

        #[test]
        fn extract_runner_token_prefers_dedicated_header() {
            let mut headers = HeaderMap::new();
            headers.insert("X-Oracle-Runner-Token", HeaderValue::from_static("dedicated"));
            headers.insert(
                axum::http::header::AUTHORIZATION,
                HeaderValue::from_static("Bearer fallback"),
            );
            assert_eq!(extract_runner_token(&headers).as_deref(), Some("dedicated"));
        }

        #[test]
        fn extract_runner_token_falls_back_to_bearer() {
            let mut headers = HeaderMap::new();
            headers.insert(
                axum::http::header::AUTHORIZATION,
                HeaderValue::from_static("Bearer fallback"),
            );
            assert_eq!(extract_runner_token(&headers).as_deref(), Some("fallback"));
        }
    }
}
