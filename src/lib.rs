pub mod allocator;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod promo;
pub mod reaper;
pub mod runtime;
pub mod wal;
