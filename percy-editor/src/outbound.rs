//! Queue between the session (any thread) and the adapter thread that owns
//! the content channel.
//!
//! The session never calls into the browser directly; it enqueues here and
//! the adapter drains the queue on whatever thread its embedding requires.

use crossbeam_channel::{Receiver, Sender};

use crate::protocol::BridgeMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(BridgeMessage),
    Theme { dark: bool },
}

#[derive(Clone)]
pub struct OutboundSender {
    tx: Sender<Outbound>,
}

pub struct OutboundReceiver {
    rx: Receiver<Outbound>,
}

pub fn channel() -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (OutboundSender { tx }, OutboundReceiver { rx })
}

impl OutboundSender {
    pub fn send_message(&self, message: BridgeMessage) {
        self.send(Outbound::Message(message));
    }

    pub fn send_theme(&self, dark: bool) {
        self.send(Outbound::Theme { dark });
    }

    fn send(&self, item: Outbound) {
        if self.tx.send(item).is_err() {
            log::debug!("Outbound queue closed, dropping item");
        }
    }
}

impl OutboundReceiver {
    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<Outbound> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order() {
        let (tx, rx) = channel();
        tx.send_message(BridgeMessage::Init);
        tx.send_theme(true);
        tx.send_message(BridgeMessage::SaveCancelled);

        assert_eq!(
            rx.drain(),
            vec![
                Outbound::Message(BridgeMessage::Init),
                Outbound::Theme { dark: true },
                Outbound::Message(BridgeMessage::SaveCancelled),
            ]
        );
        assert!(rx.is_empty());
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (tx, rx) = channel();
        drop(rx);
        tx.send_message(BridgeMessage::Init);
    }
}
