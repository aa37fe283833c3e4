//! Challenge-response authentication with Ed25519 signed assertions and
//! bearer session management.

pub mod assertion;
pub mod error;
pub mod keys;
pub mod middleware;
pub mod nonce;
pub mod service;
pub mod session;
pub mod verify;

pub use error::AuthError;
pub use middleware::{
    enforce_rate_limit, AdminGuard, AppState, AuthSession, BearerToken, ClientAddr, RateLimited,
};
pub use service::AuthService;
pub use session::{generate_challenge_nonce, generate_session_token};
pub use verify::{verify_assertion, verify_signature};
