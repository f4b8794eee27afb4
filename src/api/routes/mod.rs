//! API Routes
//!
//! Route handlers organized by functionality.

pub mod auth;
pub mod demo;
pub mod functions;
pub mod health;
pub mod records;
pub mod settings;
pub mod storage;
pub mod users;
