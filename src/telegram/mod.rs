//! Telegram transport: Bot API client and the update router.

pub mod api;
pub mod bot;
pub mod keyboards;

pub use api::TelegramApi;
pub use bot::Bot;
