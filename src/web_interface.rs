// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;


pub use routes::{routes, SESSION_COOKIE};
pub use web_server::{AppState, WebServer};
