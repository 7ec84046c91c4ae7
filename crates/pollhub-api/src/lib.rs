pub mod auth;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod polls;
pub mod routes;

pub use auth::{AppState, AppStateInner};
pub use routes::router;
