//! Request handlers

pub mod admin;
pub mod ask;
pub mod health;
