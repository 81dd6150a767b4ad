pub mod auth;
pub(crate) mod cookies;
pub mod health;
pub mod password;
pub mod register;
pub mod state;
pub mod types;

pub use state::{AppState, PortalConfig};
