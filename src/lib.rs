//! Plant disease and pest diagnosis service.
//!
//! Images are uploaded to object storage, diagnosis jobs are queued in Redis,
//! and a worker classifies each image, maps the label to the taxonomy and,
//! where the taxonomy asks for it, writes an advisory from retrieved
//! references.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod worker;
