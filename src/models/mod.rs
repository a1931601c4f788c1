pub mod account;
pub mod refresh_log;
pub mod schedule;
