pub mod queries;
pub mod tables;
