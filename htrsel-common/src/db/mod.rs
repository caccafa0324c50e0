//! Database models and queries

pub mod documents;
pub mod init;
pub mod migrations;
pub mod models;
pub mod notebooks;
pub mod segments;
pub mod users;

pub use init::*;
pub use migrations::*;
pub use models::*;
