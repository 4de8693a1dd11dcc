pub mod cache;
pub mod db;
pub mod push;
pub mod queue;
