//! Incremental Wildberries statistics poller that forwards new orders, buyouts
//! and feedback flags to Telegram chats.

pub mod config;
pub mod cursor;
pub mod fetcher;
pub mod format;
pub mod model;
pub mod notify;
pub mod poller;
pub mod scheduler;
pub mod wb;
