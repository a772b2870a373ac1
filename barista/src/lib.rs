//! Bearer token authorization for the drinks API
//!
//! Requests to protected routes must carry an `Authorization: Bearer <jwt>`
//! header holding an access token issued by the configured identity
//! provider. Tokens are verified against the provider's published JSON Web
//! Key Set (JWKS), their standard claims are validated, and the token's
//! `permissions` claim must grant the permission the route requires.
//!
//! Every failure is reported as an [`AuthError`], carrying a machine-readable
//! code, a human-readable description, and the HTTP status to respond with.
//!
//! ```no_run
//! use barista::{AuthConfig, AuthGuard, PermissionRef};
//! use http::HeaderMap;
//!
//! # async fn handle(headers: HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_env()?;
//! let guard = AuthGuard::from_config(&config)?;
//!
//! match guard.authorize(&headers, PermissionRef::from_str("get:drinks-detail")).await {
//!     Ok(claims) => println!("hello, {:?}", claims.subject()),
//!     Err(err) => println!("{} {}", err.status(), serde_json::to_string(&err.body())?),
//! }
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

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod guard;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jwt;
pub mod permission;
pub mod verify;


#[doc(inline)]
pub use config::{AuthConfig, ConfigError};
#[doc(inline)]
pub use error::{AuthError, ErrorBody, ErrorCode};
#[doc(inline)]
pub use fetch::{KeySet, KeySetFetcher};
#[doc(inline)]
pub use guard::{AuthGuard, Guarded};
#[doc(inline)]
pub use jwk::Jwk;
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{DecodedPayload, Jwt, JwtRef};
#[doc(inline)]
pub use permission::{Permission, PermissionRef};
#[doc(inline)]
pub use verify::TokenVerifier;
