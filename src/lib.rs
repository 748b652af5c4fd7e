//! Saved-search watcher for the Encar used-car marketplace, driven through a
//! Telegram bot.

pub mod access;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod query;
pub mod service;
pub mod store;
pub mod telegram;
pub mod watch;
pub mod wizard;
