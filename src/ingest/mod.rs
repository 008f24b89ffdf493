pub mod table;
pub mod timestamp;
