//! Server side: token issuance, account storage and the HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod server;
