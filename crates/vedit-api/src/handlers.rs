//! Request handlers.

pub mod health;
pub mod jobs;
pub mod projects;

pub use health::*;
pub use jobs::*;
pub use projects::*;
