//! Verb-routed JSON resources and the response envelope.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{Method, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppError;
use crate::models::AppState;
use crate::models::oauth::AuthorizedSession;
use crate::session::check_session;

const BODY_LIMIT: usize = 100 * 1024 * 1024;

/// Outcome of a resource call.
#[derive(Debug)]
pub struct ApiStatus {
    success: bool,
    code: StatusCode,
    message: String,
}

impl ApiStatus {
    pub fn success(code: StatusCode) -> Self {
        Self {
            success: true,
            code,
            message: String::new(),
        }
    }

    pub fn fail(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
        }
    }

    /// A failure whose message is the status line, e.g. `405 Method Not Allowed`.
    pub fn fail_simple(code: StatusCode) -> Self {
        let message = format!("{} {}", code.as_u16(), code.canonical_reason().unwrap_or_default());
        Self::fail(code, message)
    }
}

/// Status plus payload returned by a resource verb.
#[derive(Debug)]
pub struct ApiReply {
    status: ApiStatus,
    payload: Result<Option<Value>, serde_json::Error>,
}

impl ApiReply {
    pub fn success<T: Serialize>(code: StatusCode, payload: &T) -> Self {
        Self {
            status: ApiStatus::success(code),
            payload: serde_json::to_value(payload).map(Some),
        }
    }

    pub fn fail(code: StatusCode, message: impl Into<String>) -> Self {
        ApiStatus::fail(code, message).into()
    }

    pub fn fail_simple(code: StatusCode) -> Self {
        ApiStatus::fail_simple(code).into()
    }
}

impl From<ApiStatus> for ApiReply {
    fn from(status: ApiStatus) -> Self {
        Self {
            status,
            payload: Ok(None),
        }
    }
}

/// Everything a resource verb receives.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    pub session: AuthorizedSession,
    pub path: String,
    pub queries: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResourceRequest {
    pub fn query(&self, key: &str) -> Option<&str> {
        self.queries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A RESTful resource. Verbs it does not override answer 405.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    async fn options(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }

    async fn get(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }

    async fn post(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }

    async fn put(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }

    async fn patch(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }

    async fn delete(&self, _req: ResourceRequest) -> ApiReply {
        ApiReply::fail_simple(StatusCode::METHOD_NOT_ALLOWED)
    }
}

#[derive(Serialize)]
struct EnvelopeHeader<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
}

#[derive(Serialize)]
struct Envelope<'a> {
    header: EnvelopeHeader<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

/// Serializes a reply into its envelope.
pub fn envelope(reply: ApiReply) -> Result<(StatusCode, Vec<u8>), AppError> {
    let ApiReply { status, payload } = reply;

    let content = if status.success {
        serde_json::to_vec(&Envelope {
            header: EnvelopeHeader {
                status: "success",
                message: "",
            },
            response: payload?,
        })?
    } else {
        serde_json::to_vec(&Envelope {
            header: EnvelopeHeader {
                status: "fail",
                message: &status.message,
            },
            response: None,
        })?
    };

    Ok((status.code, content))
}

/// Routes every method on a path to `resource`.
pub fn resource_handler<R: Resource>(resource: R) -> MethodRouter<AppState> {
    let resource = Arc::new(resource);
    any(move |State(app_state): State<AppState>, req: Request| {
        let resource = resource.clone();
        async move { dispatch(resource.as_ref(), &app_state, req).await }
    })
}

async fn dispatch<R: Resource>(resource: &R, app_state: &AppState, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read request body");
            return reply_response(
                CookieJar::new(),
                ApiReply::fail(StatusCode::BAD_REQUEST, "Could not read request body"),
            );
        }
    };
    let queries = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map(|Query(queries)| queries)
        .unwrap_or_default();

    let (jar, check) = check_session(
        CookieJar::from_headers(&parts.headers),
        app_state.config.secured_cookie,
    );

    let req = ResourceRequest {
        session: check.session(),
        path: parts.uri.path().to_string(),
        queries,
        body,
    };

    let reply = match parts.method {
        Method::OPTIONS => resource.options(req).await,
        Method::GET => resource.get(req).await,
        Method::POST => resource.post(req).await,
        Method::PUT => resource.put(req).await,
        Method::PATCH => resource.patch(req).await,
        Method::DELETE => resource.delete(req).await,
        _ => return (jar, StatusCode::METHOD_NOT_ALLOWED).into_response(),
    };

    reply_response(jar, reply)
}

fn reply_response(jar: CookieJar, reply: ApiReply) -> Response {
    match envelope(reply) {
        Ok((code, content)) => (code, jar, [(CONTENT_TYPE, "application/json")], content).into_response(),
        Err(e) => e.into_response(),
    }
}
