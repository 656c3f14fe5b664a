pub mod config;
pub mod models;
pub mod remote;
pub mod services;

pub use services::{Notice, NoticeKind, SyncCoordinator, SyncError};
