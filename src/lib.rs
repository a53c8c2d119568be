pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod library;
pub mod logging;
pub mod preload;
pub mod progress;
pub mod provider;
pub mod queue;
pub mod storage;
pub mod worker;

pub use app::run;
