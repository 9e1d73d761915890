pub mod gateway;
pub mod models;
pub mod postgres;
pub mod queries;
pub mod sql;
pub mod sqlite;

pub use gateway::{Backend, Gateway, QueryOutcome, Record, SqlValue, Store};
