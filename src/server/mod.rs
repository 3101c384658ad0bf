pub mod config;
mod http_layers;
pub mod server;
pub(crate) mod session;
mod songs_routes;
pub mod state;
pub(crate) mod stream;

pub use config::ServerConfig;
pub use http_layers::*;
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};
