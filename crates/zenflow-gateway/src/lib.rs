mod error;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use server::GatewayServer;
