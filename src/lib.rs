pub mod board;
pub mod cache;
pub mod commentary;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http_client;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod scorers;
pub mod standings;
