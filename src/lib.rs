pub mod config;
pub mod db;
pub mod error;
pub mod massage;
pub mod rewrite;
pub mod schema;

pub use error::{Result, ShimError};
