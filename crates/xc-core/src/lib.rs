//! Base types shared by the command-execution engine: error taxonomy,
//! shell quoting and `PATH` search.

pub mod error;
pub mod quoting;
pub mod which;

pub use error::Error;
pub use quoting::{quote, quote_token};
pub use which::{which, which_in};

pub type Result<T> = std::result::Result<T, Error>;
