pub mod routes;
pub mod server;
pub mod ws;
