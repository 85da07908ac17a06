pub mod anchor;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod merkle;
pub mod record;

pub use error::{AnchorError, ErrorKind};
