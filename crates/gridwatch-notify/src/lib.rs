//! # GridWatch Notify
//!
//! - `telegram` — thin Telegram Bot API client (long polling + sendMessage)
//! - `dispatch` — maps a schedule diff to affected subscribers, best-effort
//!   per-subscriber delivery with at-most-once dedup
//! - `render` — per-subscriber message formatting

pub mod dispatch;
pub mod render;
pub mod telegram;

pub use dispatch::{Dispatcher, Transport};
pub use telegram::{TelegramClient, escape_markdown};
