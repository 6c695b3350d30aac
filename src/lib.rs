// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod sanitizer;
pub mod state;
pub mod utils;

pub use routes::create_router;
pub use sanitizer::{HtmlSanitizer, Policy};
