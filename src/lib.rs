//! Lectern - upload client for a school content library.
//!
//! The library wraps the content-library REST API: it starts multipart
//! uploads for lecture videos and study materials, polls the upload
//! progress endpoint until a terminal stage, and keeps the local query
//! cache for listing endpoints coherent by invalidating it on success.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod notify;
pub mod upload;
pub mod utils;
