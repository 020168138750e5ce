pub mod chat;
pub mod client;
pub mod csrf;
pub mod error;
pub mod session;
pub mod types;

pub use client::{BackendClient, ClientConfig};
pub use error::{ApiError, ApiResult};
pub use session::{Credentials, Session, SessionStore};
pub use types::*;
