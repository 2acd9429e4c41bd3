// src/session/publisher.rs

//! Push-based fan-out of a session's events to streaming subscribers.
//!
//! Overflow policy: the producer blocks. Each subscriber owns a bounded
//! channel and every send is awaited, so no event is ever dropped for a
//! live subscriber. A slow subscriber therefore slows down reading of the
//! worker's output; cancellation and the session deadline still fire while
//! the producer is blocked. An event whose fan-out was interrupted that way
//! is still handed to the remaining subscribers before the terminal
//! notification. Subscribers that drop their receiver are removed.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::outcome::Outcome;
use crate::protocol::OutputEvent;
use crate::session::SessionId;

/// One item on a subscription: zero or more events, then exactly one
/// `Finished`, then the channel closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum StreamItem {
    Event { event: OutputEvent },
    Finished { outcome: Outcome },
}

/// Receiving side of a session subscription.
#[derive(Debug)]
pub struct Subscription {
    session: SessionId,
    rx: mpsc::Receiver<StreamItem>,
}

impl Subscription {
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Next item, or `None` once the terminal notification has been
    /// consumed (or the session never started).
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Drain the remaining events and return the terminal outcome.
    pub async fn outcome(mut self) -> Option<Outcome> {
        while let Some(item) = self.rx.recv().await {
            if let StreamItem::Finished { outcome } = item {
                return Some(outcome);
            }
        }
        None
    }
}

#[derive(Debug, Default)]
struct PublisherInner {
    subscribers: Vec<mpsc::Sender<StreamItem>>,
    finished: Option<Outcome>,
}

#[derive(Debug)]
pub(crate) struct Publisher {
    session: SessionId,
    capacity: usize,
    inner: Mutex<PublisherInner>,
}

impl Publisher {
    pub(crate) fn new(session: SessionId, capacity: usize) -> Self {
        Self {
            session,
            capacity: capacity.max(1),
            inner: Mutex::new(PublisherInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PublisherInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Events published after this call are delivered to the new
    /// subscriber. After the session finished, only the terminal
    /// notification is delivered.
    pub(crate) fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = self.lock();

        match &inner.finished {
            Some(outcome) => {
                // Fresh channel with capacity >= 1: cannot be full.
                let _ = tx.try_send(StreamItem::Finished {
                    outcome: outcome.clone(),
                });
            }
            None => inner.subscribers.push(tx),
        }

        Subscription {
            session: self.session,
            rx,
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Start delivering `event` to every live subscriber.
    pub(crate) fn delivery(&self, event: &OutputEvent) -> Delivery<'_> {
        Delivery {
            publisher: self,
            item: StreamItem::Event {
                event: event.clone(),
            },
            targets: self.lock().subscribers.clone(),
            next: 0,
            any_closed: false,
        }
    }

    /// Deliver `event` to every live subscriber, waiting for room in each
    /// channel.
    #[cfg(test)]
    pub(crate) async fn publish(&self, event: &OutputEvent) {
        self.delivery(event).run().await;
    }

    fn prune_closed(&self) {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        trace!(
            session = %self.session,
            remaining = inner.subscribers.len(),
            "dropped closed subscribers"
        );
    }

    /// Record the outcome, send the terminal notification to every
    /// subscriber and close their channels.
    pub(crate) async fn finish(&self, outcome: &Outcome) {
        let targets = {
            let mut inner = self.lock();
            if inner.finished.is_some() {
                return;
            }
            inner.finished = Some(outcome.clone());
            std::mem::take(&mut inner.subscribers)
        };

        for tx in targets {
            let _ = tx
                .send(StreamItem::Finished {
                    outcome: outcome.clone(),
                })
                .await;
        }
    }
}

/// One event on its way to a snapshot of the subscribers.
///
/// [`run`](Delivery::run) may be interrupted (for instance by cancellation)
/// and resumed later: subscribers that already received the event are not
/// sent it again, and the others still get it.
pub(crate) struct Delivery<'a> {
    publisher: &'a Publisher,
    item: StreamItem,
    targets: Vec<mpsc::Sender<StreamItem>>,
    next: usize,
    any_closed: bool,
}

impl Delivery<'_> {
    pub(crate) fn is_done(&self) -> bool {
        self.next >= self.targets.len()
    }

    /// Send to the remaining subscribers, waiting for room in each channel.
    /// Cancel safe.
    pub(crate) async fn run(&mut self) {
        while let Some(tx) = self.targets.get(self.next) {
            if tx.send(self.item.clone()).await.is_err() {
                self.any_closed = true;
            }
            self.next += 1;
        }
        if self.any_closed {
            self.any_closed = false;
            self.publisher.prune_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{FailureKind, Payload};
    use crate::protocol::Progress;

    fn progress(n: u8) -> OutputEvent {
        OutputEvent::Progress(Progress::Percent(n))
    }

    #[tokio::test]
    async fn events_then_finished_then_close() {
        let publisher = Publisher::new(SessionId::next(), 8);
        let mut sub = publisher.subscribe();

        publisher.publish(&progress(50)).await;
        publisher.publish(&progress(90)).await;
        let outcome = Outcome::success(Payload::Url("http://host/img.png".into()));
        publisher.finish(&outcome).await;

        assert_eq!(sub.next().await, Some(StreamItem::Event { event: progress(50) }));
        assert_eq!(sub.next().await, Some(StreamItem::Event { event: progress(90) }));
        assert_eq!(
            sub.next().await,
            Some(StreamItem::Finished {
                outcome: outcome.clone()
            })
        );
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_outcome() {
        let publisher = Publisher::new(SessionId::next(), 1);
        publisher.publish(&progress(10)).await;
        let outcome = Outcome::failure(FailureKind::NoResult, "nothing");
        publisher.finish(&outcome).await;

        let late = publisher.subscribe();
        assert_eq!(late.outcome().await, Some(outcome));
    }

    #[tokio::test]
    async fn full_buffer_blocks_producer_instead_of_dropping() {
        let publisher = std::sync::Arc::new(Publisher::new(SessionId::next(), 1));
        let mut sub = publisher.subscribe();

        let producer = {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                for n in 0..20u8 {
                    publisher.publish(&progress(n)).await;
                }
                publisher
                    .finish(&Outcome::success(Payload::Text("done".into())))
                    .await;
            })
        };

        // With capacity 1 the producer cannot be done before we read.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        let mut seen = Vec::new();
        while let Some(item) = sub.next().await {
            seen.push(item);
        }
        producer.await.expect("producer task");

        assert_eq!(seen.len(), 21);
        for (n, item) in seen.iter().take(20).enumerate() {
            assert_eq!(item, &StreamItem::Event { event: progress(n as u8) });
        }
        assert!(matches!(seen[20], StreamItem::Finished { .. }));
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let publisher = Publisher::new(SessionId::next(), 4);
        let keep = publisher.subscribe();
        drop(publisher.subscribe());
        assert_eq!(publisher.subscriber_count(), 2);

        publisher.publish(&progress(1)).await;
        assert_eq!(publisher.subscriber_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn interrupted_delivery_resumes_without_duplicates() {
        let publisher = Publisher::new(SessionId::next(), 1);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        // Both channels are now full.
        publisher.publish(&progress(1)).await;

        let mut delivery = publisher.delivery(&progress(2));
        let interrupted = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            delivery.run(),
        )
        .await;
        assert!(interrupted.is_err());
        assert!(!delivery.is_done());

        assert_eq!(first.next().await, Some(StreamItem::Event { event: progress(1) }));
        assert_eq!(second.next().await, Some(StreamItem::Event { event: progress(1) }));

        delivery.run().await;
        assert!(delivery.is_done());
        for sub in [&mut first, &mut second] {
            assert_eq!(sub.next().await, Some(StreamItem::Event { event: progress(2) }));
        }

        let outcome = Outcome::failure(FailureKind::Cancelled, "stopped");
        publisher.finish(&outcome).await;

        for sub in [&mut first, &mut second] {
            assert_eq!(
                sub.next().await,
                Some(StreamItem::Finished {
                    outcome: outcome.clone()
                })
            );
            assert_eq!(sub.next().await, None);
        }
    }
}
