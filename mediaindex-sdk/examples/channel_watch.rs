//! Channel watch example: prints every media post the bot can see.
//!
//! Usage:
//!   BOT_TOKEN=123:abc cargo run -p mediaindex-sdk --example channel_watch
//!
//! Add the bot as an administrator of a channel and post a video; each
//! post is printed with its file name, size and caption.

use mediaindex_sdk::client::{self, Bot, PollConfig};
use mediaindex_sdk::Event;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let Ok(token) = std::env::var("BOT_TOKEN") else {
        eprintln!("BOT_TOKEN is not set");
        std::process::exit(2);
    };

    let mut events = client::connect(Bot::new(token), PollConfig::default());
    while let Some(event) = events.recv().await {
        match event {
            Event::Connected { username } => println!("connected as @{username}"),
            Event::ChannelPost(post) | Event::EditedChannelPost(post) => {
                let Some((kind, media)) = post.media() else { continue };
                println!(
                    "[{}] #{} {kind}: {} ({} bytes) caption={:?}",
                    post.chat.display_name(),
                    post.message_id,
                    media.file_name.as_deref().unwrap_or("<unnamed>"),
                    media.file_size.unwrap_or(0),
                    post.caption.as_deref().unwrap_or(""),
                );
            }
            Event::Disconnected { reason } => eprintln!("disconnected: {reason}"),
            _ => {}
        }
    }
}
