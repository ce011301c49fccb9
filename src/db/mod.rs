mod backend;
mod connection;
mod postgres;
mod query;
mod sqlite;
mod value;

pub use backend::*;
pub use connection::*;
pub use postgres::*;
pub use query::*;
pub use sqlite::*;
pub use value::*;
