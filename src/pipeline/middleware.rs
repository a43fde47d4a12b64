use std::io::Write;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::models::{AppConfig, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

/// First of `gzip`/`deflate` listed in `Accept-Encoding`.
pub fn negotiate_encoding(headers: &HeaderMap) -> Option<Encoding> {
    let accept = headers.get(ACCEPT_ENCODING)?.to_str().ok()?;

    accept.split(',').find_map(|candidate| {
        let mut params = candidate.split(';').map(str::trim);
        let name = params.next()?;
        let refused = params.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q == 0.0)
        });
        if refused {
            None
        } else if name.eq_ignore_ascii_case("gzip") {
            Some(Encoding::Gzip)
        } else if name.eq_ignore_ascii_case("deflate") {
            Some(Encoding::Deflate)
        } else {
            None
        }
    })
}

/// Client address for the access log, preferring `X-Forwarded-For`.
pub fn client_address(req: &Request) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "-".to_string())
}

/// Aborts requests that outlive the configured budget.
pub async fn timeout(State(app_state): State<AppState>, req: Request, next: Next) -> Response {
    let budget = app_state.config.request_timeout();
    let method = req.method().clone();
    let uri = req.uri().clone();

    match tokio::time::timeout(budget, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%method, %uri, ?budget, "Request timed out");
            (StatusCode::SERVICE_UNAVAILABLE, "timed out").into_response()
        }
    }
}

/// Compression and the access log.
pub async fn request_pipeline(
    State(app_state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let addr = client_address(&req);
    let method = req.method().clone();
    let uri = req.uri().clone();
    let encoding = negotiate_encoding(req.headers());

    let mut response = next.run(req).await;

    if let Some(encoding) = encoding {
        response = compress_response(response, encoding).await;
    }

    if app_state.config.access_log {
        tracing::info!(target: "access", "{} {} {} {}", addr, response.status().as_u16(), method, uri);
    }

    response
}

async fn compress_response(response: Response, encoding: Encoding) -> Response {
    if response.headers().contains_key(CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Could not buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::from(bytes));
    }

    match encoding.compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
            parts
                .headers
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            tracing::error!(error = %e, encoding = encoding.as_str(), "Compression failed");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// CORS headers from the configured origin and methods, if any are set.
pub fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    let methods: Vec<Method> = config
        .cors_methods
        .split(',')
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .filter_map(|method| match Method::from_bytes(method.as_bytes()) {
            Ok(method) => Some(method),
            Err(e) => {
                tracing::warn!(%method, error = %e, "Ignoring invalid CORS method");
                None
            }
        })
        .collect();

    let origin = match config.cors_origin.as_str() {
        "" => None,
        "*" => Some(AllowOrigin::any()),
        origin => match HeaderValue::from_str(origin) {
            Ok(origin) => Some(AllowOrigin::exact(origin)),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        },
    };

    if origin.is_none() && methods.is_empty() {
        return None;
    }

    let mut cors = CorsLayer::new();
    if let Some(origin) = origin {
        cors = cors.allow_origin(origin);
    }
    if !methods.is_empty() {
        cors = cors.allow_methods(methods);
    }
    Some(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::with_pipeline;
    use crate::test_utils::test_state_with;
    use axum::Router;
    use axum::http::Request;
    use axum::http::header::{
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD,
        ORIGIN,
    };
    use axum::routing::get;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;
    use std::time::Duration;
    use tower::ServiceExt;
    use tracing_test::traced_test;

    const BODY: &str = "hello hello hello hello hello";

    fn app(config: impl FnOnce(&mut crate::models::AppConfig)) -> Router {
        let (state, _, _) = test_state_with(config);
        let router = Router::new()
            .route("/hello", get(|| async { BODY }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    "too late"
                }),
            )
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }));
        with_pipeline(router, state.clone()).with_state(state)
    }

    fn headers(accept: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(accept).unwrap());
        headers
    }

    async fn get_with(app: Router, uri: &str, accept: Option<&str>) -> Response {
        let mut req = axum::http::Request::builder().uri(uri);
        if let Some(accept) = accept {
            req = req.header(ACCEPT_ENCODING, accept);
        }
        app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[test]
    fn test_negotiate_first_supported() {
        assert_eq!(negotiate_encoding(&headers("gzip, deflate")), Some(Encoding::Gzip));
        assert_eq!(negotiate_encoding(&headers("br, deflate, gzip")), Some(Encoding::Deflate));
        assert_eq!(negotiate_encoding(&headers("gzip;q=0, deflate;q=0.5")), Some(Encoding::Deflate));
        assert_eq!(negotiate_encoding(&headers("GZIP")), Some(Encoding::Gzip));
        assert_eq!(negotiate_encoding(&headers("br, Deflate;q=0.8")), Some(Encoding::Deflate));
        assert_eq!(negotiate_encoding(&headers("br, identity")), None);
        assert_eq!(negotiate_encoding(&HeaderMap::new()), None);
    }

    #[test]
    fn test_client_address_prefers_forwarded_for() {
        let mut req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_address(&req), "203.0.113.7");

        req.headers_mut().remove("x-forwarded-for");
        assert_eq!(client_address(&req), "127.0.0.1");

        let bare = axum::http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_address(&bare), "-");
    }

    #[tokio::test]
    async fn test_gzip_response() {
        let response = get_with(app(|_| {}), "/hello", Some("gzip, deflate")).await;
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
        assert!(response.headers().get_all(VARY).iter().any(|v| v == "Accept-Encoding"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, BODY);
    }

    #[tokio::test]
    async fn test_deflate_response() {
        let response = get_with(app(|_| {}), "/hello", Some("deflate")).await;
        assert_eq!(response.headers()[CONTENT_ENCODING], "deflate");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut decoded = String::new();
        ZlibDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, BODY);
    }

    #[tokio::test]
    async fn test_identity_response() {
        let response = get_with(app(|_| {}), "/hello", None).await;
        assert!(response.headers().get(CONTENT_ENCODING).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_body_is_not_encoded() {
        let response = get_with(app(|_| {}), "/empty", Some("gzip")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_cors_allow_origin() {
        let response = get_with(app(|_| {}), "/hello", None).await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let response = get_with(
            app(|config| config.cors_origin = "https://app.example".into()),
            "/hello",
            None,
        )
        .await;
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
    }

    #[tokio::test]
    async fn test_cors_preflight_lists_methods() {
        let app = app(|config| config.cors_methods = "GET, POST".into());
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/hello")
                    .header(ORIGIN, "https://app.example")
                    .header(ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let methods = response.headers()[ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("GET") && methods.contains("POST"));
    }

    #[tokio::test]
    async fn test_cors_disabled() {
        let response = get_with(
            app(|config| {
                config.cors_origin = String::new();
                config.cors_methods = String::new();
            }),
            "/hello",
            None,
        )
        .await;
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    fn forwarded(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_access_log_line() {
        let app = app(|config| config.access_log = true);
        let response = app.oneshot(forwarded("/hello?x=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        logs_assert(|lines: &[&str]| {
            let access: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("203.0.113.7"))
                .collect();
            match access.as_slice() {
                [line] if line.contains("access") && line.ends_with("203.0.113.7 200 GET /hello?x=1") => {
                    Ok(())
                }
                other => Err(format!("unexpected access lines: {other:?}")),
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_access_log_disabled() {
        let app = app(|config| config.access_log = false);
        let response = app.oneshot(forwarded("/hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(!logs_contain("203.0.113.7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let response = get_with(
            app(|config| config.request_timeout_secs = 300),
            "/slow",
            Some("gzip"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(CONTENT_ENCODING).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"timed out");
    }
}
