//! Notification channel.
//!
//! A named-event dispatcher with `on`, `once` and `emit`:
//! - Topics are strings, regexes, or nested lists of those
//! - A topic string may list alternatives separated by `|` or `,`
//! - Error payloads are announced at most once per error instance
//!
//! # Example
//!
//! ```ignore
//! let channel: Channel<Event> = Channel::new();
//!
//! let unsubscribe = channel.on("auth_changed|error", |event| {
//!     println!("got {:?}", event);
//! });
//!
//! channel.emit("auth_changed", Event::Session(None));
//! unsubscribe.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::Channel;
pub use types::{split_alternatives, Event, Payload, Topic, Topics};
