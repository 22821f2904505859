//! Infrastructure layer - backend selection and connection.

mod connect;

pub use connect::connect_store;
