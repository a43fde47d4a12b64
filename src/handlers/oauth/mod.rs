//! The three-legged handshake with the identity provider.

mod callback_handler;
mod logout_handler;
mod signin_handler;

pub use callback_handler::callback_handler;
pub use logout_handler::logout_handler;
pub use signin_handler::{entry_handler, signin_handler};

use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};

pub const SIGNIN_PATH: &str = "/twitter/signin";

/// `302 Found` to `url`.
pub(crate) fn found(url: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}
