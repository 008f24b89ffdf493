pub mod aggregate;
pub mod engine;
pub mod result;
pub mod sessions;
