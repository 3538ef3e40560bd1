pub mod alarm_repository;
pub mod error;
pub mod fire_sink;
pub mod storage;
pub mod wake_timer;
