pub mod clock;
pub mod config;
pub mod metrics;
pub mod storage;
pub mod timespan;
