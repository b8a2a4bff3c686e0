pub mod database;
pub mod sync;
