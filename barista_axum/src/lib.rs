//! Axum extractors that enforce `barista` permissions on protected routes
//!
//! Each guard type declared with [`permission_guard!`] or
//! [`permission_guards!`] is an extractor. Adding one to a handler's
//! arguments authorizes the request before the handler body runs: the
//! bearer token is verified by the [`AuthGuard`](barista::AuthGuard) held in
//! router state, and its `permissions` claim must grant the guard's
//! permission. Rejected requests receive the [`AuthError`] status along with
//! its JSON body.
//!
//! # Example
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use barista::{AuthConfig, AuthGuard};
//! use barista_axum::permission_guards;
//!
//! permission_guards! {
//!     permission GetDrinksDetail = "get:drinks-detail";
//!     permission PostDrinks = "post:drinks";
//! }
//!
//! async fn drinks_detail(GetDrinksDetail(claims): GetDrinksDetail) -> String {
//!     format!("detail for {}", claims.subject().unwrap_or("someone"))
//! }
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> color_eyre::Result<()> {
//! let guard = AuthGuard::from_config(&AuthConfig::from_env()?)?;
//!
//! let app = Router::new()
//!     .route("/drinks-detail", get(drinks_detail))
//!     .with_state(guard);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::{error::Error, fmt};

use axum_core::response::{IntoResponse, Response};
use barista::{AuthError, PermissionRef};
use http::{header, HeaderValue};

mod macros;


/// The permission an extractor requires
pub trait EndpointPermission {
    /// The required permission
    fn permission() -> &'static PermissionRef;
}

/// A request rejected by a permission guard
///
/// Responds with the status of the underlying [`AuthError`] and a JSON body
/// of the form `{"success": false, "message": ..., "error": ...}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRejection(AuthError);

impl AuthRejection {
    /// The underlying authorization error
    pub fn error(&self) -> &AuthError {
        &self.0
    }

    /// Takes ownership of the underlying authorization error
    pub fn into_inner(self) -> AuthError {
        self.0
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for AuthRejection {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = self.0.status();

        match serde_json::to_vec(&self.0.body()) {
            Ok(body) => (
                status,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                body,
            )
                .into_response(),
            Err(err) => {
                let error: &dyn Error = &err;
                tracing::error!(error, "unable to serialize authorization error");
                (status, self.0.description().to_owned()).into_response()
            }
        }
    }
}

#[doc(hidden)]
pub mod __private {
    pub use barista::{AuthGuard, DecodedPayload, PermissionRef};
    use http::request::Parts;

    use crate::AuthRejection;

    pub async fn from_request(
        req: &Parts,
        guard: &AuthGuard,
        permission: &'static PermissionRef,
    ) -> Result<DecodedPayload, AuthRejection> {
        guard
            .authorize(&req.headers, permission)
            .await
            .map_err(AuthRejection::from)
    }
}
