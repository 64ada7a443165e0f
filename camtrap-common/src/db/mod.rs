//! SQLite connection helpers and table metadata queries

pub mod init;
pub mod tables;

pub use init::*;
pub use tables::*;
