//! mediaindex-bot: a Telegram bot that appends stream info to the captions
//! of channel media and maintains per-title index posts.
//!
//! Commands (owner and `AUTHORIZED_CHATS` only):
//!
//!   /updatemediainfo <channel>|reply [-f] [-rescan]
//!   /indexfiles <channel>|reply [-rescan]
//!   /findencoders <channel>|reply
//!   /status, /cancel [id], /settings, /log, /stats, /help

pub mod admin;
pub mod app;
pub mod caption;
pub mod config;
pub mod dispatcher;
pub mod download;
pub mod encoders;
pub mod environment;
pub mod format;
pub mod history;
pub mod indexing;
pub mod logging;
pub mod mediainfo_update;
pub mod output;
pub mod parser;
pub mod probe;
pub mod settings;
pub mod status;
pub mod store;
pub mod targets;
pub mod tasks;
pub mod tvmaze;
