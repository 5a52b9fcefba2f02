pub mod collection;
pub mod database;
pub mod redis;
pub mod storage;
