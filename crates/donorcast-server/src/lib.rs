pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use bootstrap::{BootstrapError, build_context};
pub use config::AppConfig;
pub use server::{AppState, DonorcastServer, ServerBuilder, build_app};
