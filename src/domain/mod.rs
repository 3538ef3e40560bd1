pub mod holiday;
pub mod models;
pub mod recurrence;
