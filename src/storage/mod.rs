pub mod schema;
pub mod staging;
