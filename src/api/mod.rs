//! HTTP surface hosting the publish and consume triggers.

pub mod handlers;

pub use handlers::AppState;
