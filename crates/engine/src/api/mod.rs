pub mod routes;
pub mod handlers;
pub mod server;
pub mod types;

pub use server::{AppState, start_server};
