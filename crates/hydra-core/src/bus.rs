//! The in-process event bus.
//!
//! A bus is a bounded sink, a dispatcher task, and a logically unbounded
//! source. The dispatcher drains the sink, runs each event through the
//! ordered filter chain, and forwards survivors to the source; when the
//! source buffer is full, events queue in an internal FIFO so the sink
//! producer only ever blocks at the sink's own capacity. Closing the sink
//! drains everything to the source, then closes it.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::types::Event;

/// Per-filter execution budget. A filter that overruns it drops the event
/// and short-circuits the rest of the chain.
pub const FILTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default sink/source buffer size.
pub const DEFAULT_CAPACITY: usize = 1024;

pub type EventSink = mpsc::Sender<Event>;
pub type EventSource = mpsc::Receiver<Event>;

/// An event transformer in the bus pipeline. Returning `None` vetoes the
/// event; mutations are visible to subsequent filters.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, event: Event) -> Option<Event>;
}

/// Create a bus and spawn its dispatcher. The returned sink blocks
/// producers only when `capacity` events are already waiting to be
/// filtered.
pub fn channel(capacity: usize, filters: Vec<Arc<dyn Filter>>) -> (EventSink, EventSource) {
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    tokio::spawn(dispatch(in_rx, out_tx, filters));
    (in_tx, out_rx)
}

async fn dispatch(
    mut in_rx: mpsc::Receiver<Event>,
    out_tx: mpsc::Sender<Event>,
    filters: Vec<Arc<dyn Filter>>,
) {
    let mut queue: VecDeque<Event> = VecDeque::new();

    'main: while let Some(event) = in_rx.recv().await {
        let Some(event) = run_filters(&filters, event).await else {
            continue;
        };

        match out_tx.try_send(event) {
            Ok(()) => continue,
            Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(event)) => queue.push_back(event),
        }

        // Source is full: keep accepting sink traffic while releasing the
        // queue head as soon as the source accepts writes.
        while !queue.is_empty() {
            tokio::select! {
                next = in_rx.recv() => match next {
                    Some(event) => {
                        if let Some(event) = run_filters(&filters, event).await {
                            queue.push_back(event);
                        }
                    }
                    None => break 'main,
                },
                permit = out_tx.reserve() => match permit {
                    Ok(permit) => {
                        if let Some(event) = queue.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => return,
                },
            }
        }
    }

    // Sink closed: flush the remainder before the source closes.
    while let Some(event) = queue.pop_front() {
        if out_tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn run_filters(filters: &[Arc<dyn Filter>], mut event: Event) -> Option<Event> {
    for filter in filters {
        let applied = tokio::time::timeout(
            FILTER_TIMEOUT,
            AssertUnwindSafe(filter.apply(event)).catch_unwind(),
        )
        .await;
        match applied {
            Ok(Ok(Some(next))) => event = next,
            Ok(Ok(None)) => return None,
            Ok(Err(_)) => {
                warn!(filter = filter.name(), "filter panicked, dropping event");
                return None;
            }
            Err(_) => {
                warn!(filter = filter.name(), "filter timed out, dropping event");
                return None;
            }
        }
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    struct Tag(&'static str);

    #[async_trait]
    impl Filter for Tag {
        fn name(&self) -> &'static str {
            "tag"
        }

        async fn apply(&self, mut event: Event) -> Option<Event> {
            event.content.push_str(self.0);
            Some(event)
        }
    }

    struct DropSticker;

    #[async_trait]
    impl Filter for DropSticker {
        fn name(&self) -> &'static str {
            "drop_sticker"
        }

        async fn apply(&self, event: Event) -> Option<Event> {
            (event.kind != EventKind::Sticker).then_some(event)
        }
    }

    struct Stall;

    #[async_trait]
    impl Filter for Stall {
        fn name(&self) -> &'static str {
            "stall"
        }

        async fn apply(&self, event: Event) -> Option<Event> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some(event)
        }
    }

    fn text_event(content: &str) -> Event {
        let mut event = Event::default();
        event.content = content.to_string();
        event
    }

    #[tokio::test]
    async fn empty_chain_preserves_order() {
        let (tx, mut rx) = channel(4, Vec::new());
        for i in 0..20 {
            tx.send(text_event(&i.to_string())).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.content);
        }
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn overflow_queue_drains_in_order() {
        // Tiny source buffer forces the internal FIFO into play.
        let (tx, mut rx) = channel(1, Vec::new());
        for i in 0..50 {
            tx.send(text_event(&i.to_string())).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.content);
        }
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn filters_mutate_in_sequence() {
        let (tx, mut rx) = channel(4, vec![Arc::new(Tag("a")) as _, Arc::new(Tag("b")) as _]);
        tx.send(text_event("x")).await.unwrap();
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.content, "xab");
    }

    #[tokio::test]
    async fn vetoed_event_never_reaches_source() {
        let (tx, mut rx) = channel(4, vec![Arc::new(DropSticker) as _, Arc::new(Tag("!")) as _]);

        let mut sticker = text_event("sticker");
        sticker.kind = EventKind::Sticker;
        tx.send(sticker).await.unwrap();
        tx.send(text_event("text")).await.unwrap();
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.content, "text!");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_filter_drops_event_and_bus_continues() {
        struct StallOnce;

        #[async_trait]
        impl Filter for StallOnce {
            fn name(&self) -> &'static str {
                "stall_once"
            }

            async fn apply(&self, event: Event) -> Option<Event> {
                if event.content == "slow" {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Some(event)
            }
        }

        let (tx, mut rx) = channel(4, vec![Arc::new(StallOnce) as _]);
        tx.send(text_event("slow")).await.unwrap();
        tx.send(text_event("fast")).await.unwrap();
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.content, "fast");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_chain_short_circuits() {
        let (tx, mut rx) = channel(4, vec![Arc::new(Stall) as _, Arc::new(Tag("x")) as _]);
        tx.send(text_event("a")).await.unwrap();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
