pub mod config;
pub mod errors;
pub mod generate;
pub mod logging;
pub mod oauth;
pub mod plan;
pub mod server;
pub mod tracker;
