//! User-facing message channel and notification advisor
//!
//! The controller reports every failed attempt here. Sending never blocks and
//! never fails: if nobody drains the channel any more, the message is lost.

use colored::*;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Create the unbounded message channel
pub fn message_channel() -> (MessageSender, MessageReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessageSender { tx }, MessageReceiver { rx })
}

/// Producer side, cheap to clone
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<String>,
}

impl MessageSender {
    pub fn show(&self, msg: impl Into<String>) {
        let msg = msg.into();
        debug!("User message: {}", msg);
        let _ = self.tx.send(msg);
    }
}

/// Consumer side, drained by the presentation layer
pub struct MessageReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl MessageReceiver {
    /// Wait for the next message; `None` once every sender is gone
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a message if one is queued
    pub fn try_next(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Take every queued message
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = self.try_next() {
            out.push(msg);
        }
        out
    }
}

/// Surfaces advisory notifications to the user
pub trait NotificationAdvisor: Send + Sync {
    fn advise(&self, title: &str, body: &str);
}

/// Prints advisories on the terminal
pub struct ConsoleAdvisor;

impl NotificationAdvisor for ConsoleAdvisor {
    fn advise(&self, title: &str, body: &str) {
        info!("Advisory: {} - {}", title, body);
        println!("{} {}", format!("[{}]", title).bold().cyan(), body);
    }
}

/// Render a channel message for the terminal
pub fn format_message(msg: &str) -> String {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    if msg.starts_with("ERROR") {
        format!("[{}] {}", stamp, msg.red().bold())
    } else {
        format!("[{}] {}", stamp, msg.green())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_are_delivered_in_order() {
        let (tx, mut rx) = message_channel();
        tx.show("first");
        tx.clone().show(String::from("second"));

        assert_eq!(rx.next().await.as_deref(), Some("first"));
        assert_eq!(rx.drain(), vec!["second".to_string()]);
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn test_show_after_receiver_dropped() {
        let (tx, rx) = message_channel();
        drop(rx);
        tx.show("nobody listens");
    }

    #[test]
    fn test_format_message_keeps_text() {
        colored::control::set_override(false);
        let line = format_message("ERROR: Could not connect to 'x'.");
        assert!(line.ends_with("ERROR: Could not connect to 'x'."));
    }
}
