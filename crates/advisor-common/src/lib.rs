pub mod assistant;
pub mod context;
pub mod error;
