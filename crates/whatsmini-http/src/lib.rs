//! HTTP access to the whatsmini backend.
//!
//! Provides:
//! - `ResilientHttpClient` - Timeout, retry and wake-request executor
//! - `AuthService` - Register/login
//! - `KeyService` - Public-key lookup and best-effort upload
//! - `UploadService` - Multipart file upload

pub mod auth;
pub mod client;
pub mod error;
pub mod keys;
pub mod outcome;
pub mod upload;

pub use auth::AuthService;
pub use client::{Method, Payload, ResilientHttpClient, UploadForm};
pub use error::{ApiError, AuthError, NetworkError};
pub use keys::KeyService;
pub use outcome::{HttpOutcome, ResponseBody};
pub use upload::UploadService;
