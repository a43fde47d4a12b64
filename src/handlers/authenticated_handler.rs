use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Serialize;

use crate::pipeline::{ApiReply, Resource, ResourceRequest};

/// `/authenticated`: what the session cookie says about the caller.
pub struct Authenticated;

#[derive(Debug, Serialize)]
struct AuthenticatedUser<'a> {
    name: &'a str,
    img: &'a str,
    token: &'a str,
    secret: &'a str,
}

#[async_trait]
impl Resource for Authenticated {
    async fn get(&self, req: ResourceRequest) -> ApiReply {
        let session = &req.session;
        ApiReply::success(
            StatusCode::OK,
            &AuthenticatedUser {
                name: &session.screen_name,
                img: &session.screen_image,
                token: &session.access_token_key,
                secret: &session.access_token_secret,
            },
        )
    }
}
