pub mod client;
pub mod continuous_queries;
pub mod databases;
pub mod error;
pub mod response;
pub mod users;

pub use client::Client;
pub use error::ApiError;
pub use response::{QueryResponse, Row, Series, StatementResult};
