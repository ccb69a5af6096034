//! Generic event publisher, replacing the source's Qt signal/slot wiring
//! (spec §9: "model as explicit publisher objects... or typed channels
//! feeding the event loop"). A component that wants to notify observers
//! owns a `Publisher<T>` field and calls `publish`; an observer calls
//! `subscribe` once at wiring time and receives every subsequent event on
//! its own channel. There is no global dispatcher.

use tokio::sync::mpsc;

pub struct Publisher<T: Clone> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Default for Publisher<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Publisher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends `event` to every live subscriber; subscribers that have been
    /// dropped are pruned on the next publish.
    pub fn publish(&mut self, event: T) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let mut pub_: Publisher<u32> = Publisher::new();
        let mut rx = pub_.subscribe();
        pub_.publish(42);
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let mut pub_: Publisher<&'static str> = Publisher::new();
        let mut rx1 = pub_.subscribe();
        let mut rx2 = pub_.subscribe();
        pub_.publish("station updated");
        assert_eq!(rx1.recv().await, Some("station updated"));
        assert_eq!(rx2.recv().await, Some("station updated"));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_next_publish() {
        let mut pub_: Publisher<u32> = Publisher::new();
        let rx = pub_.subscribe();
        drop(rx);
        pub_.publish(1);
        assert_eq!(pub_.subscriber_count(), 0);
    }
}
