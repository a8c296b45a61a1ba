pub mod backup;
pub mod core;
pub mod exchange;
pub mod reports;
pub mod setup;
pub mod summary;
pub mod uploads;
