//! certkit - certificate rendering service
//!
//! Fills certificate scene templates with per-recipient variables, injects
//! validation QR codes and exports the result as images or A4 PDFs.
//! This library exposes modules for integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod rendering;
pub mod server;
pub mod services;
