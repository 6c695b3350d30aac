// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod interaction;
pub mod posts;
pub mod tags;
