pub mod alerts;
pub mod auth;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod keygen;
pub mod live;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod storage;
