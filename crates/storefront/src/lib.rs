//! Restwell Storefront library.
//!
//! The JSON API behind the Restwell shop: catalog, checkout, order tracking,
//! PhonePe payments and the admin back office. The binary in `main.rs` wires
//! this library to `PostgreSQL`; tests wire it to the in-memory store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod phonepe;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
pub use state::{AppState, Repositories};
