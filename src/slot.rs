//! Single-slot, overwrite-on-write handoff between a producer and a consumer.
//!
//! `LatestValueSlot` is the only mutable state shared between the camera
//! callback, the host's mask poll and the compositing tick. Each side runs at
//! its own cadence, so the slot never queues:
//! - `publish` replaces whatever is there (unread values are discarded)
//! - `try_consume` takes the newest value, or nothing
//!
//! Both operations are a single atomic pointer swap. Neither side can stall
//! the other, and a reader can never observe a half-written value.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct LatestValueSlot<T> {
    value: ArcSwapOption<T>,
    published: AtomicU64,
    consumed: AtomicU64,
    overwritten: AtomicU64,
}

impl<T> LatestValueSlot<T> {
    pub fn new() -> Self {
        Self {
            value: ArcSwapOption::empty(),
            published: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Publish a value, replacing any unread one.
    ///
    /// Returns the displaced value when it was never consumed. Producers use
    /// it to reclaim buffers (`Arc::try_unwrap` succeeds when nobody else
    /// holds the value).
    pub fn publish(&self, value: T) -> Option<Arc<T>> {
        let previous = self.value.swap(Some(Arc::new(value)));
        self.published.fetch_add(1, Ordering::SeqCst);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    /// Take the newest value. Empty when nothing was published since the last consume.
    pub fn try_consume(&self) -> Option<Arc<T>> {
        let value = self.value.swap(None);
        if value.is_some() {
            self.consumed.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Read the newest value without consuming it.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    /// True when a value is waiting to be consumed.
    pub fn is_ready(&self) -> bool {
        self.value.load().is_some()
    }

    /// Total number of publishes since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Values that were replaced before anyone consumed them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl<T> Default for LatestValueSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_slot_yields_nothing() {
        let slot: LatestValueSlot<u32> = LatestValueSlot::new();
        assert!(!slot.is_ready());
        assert!(slot.try_consume().is_none());
        assert!(slot.peek().is_none());
    }

    #[test]
    fn latest_publish_wins() {
        let slot = LatestValueSlot::new();
        assert!(slot.publish(1u32).is_none());
        let displaced = slot.publish(2u32).expect("first value displaced");
        assert_eq!(*displaced, 1);

        assert_eq!(slot.try_consume().as_deref(), Some(&2));
        assert!(slot.try_consume().is_none());
        assert_eq!(slot.published(), 2);
        assert_eq!(slot.consumed(), 1);
        assert_eq!(slot.overwritten(), 1);
    }

    #[test]
    fn peek_does_not_consume() {
        let slot = LatestValueSlot::new();
        slot.publish("frame");
        assert_eq!(slot.peek().as_deref(), Some(&"frame"));
        assert!(slot.is_ready());
        assert_eq!(slot.try_consume().as_deref(), Some(&"frame"));
        assert!(!slot.is_ready());
    }

    #[test]
    fn displaced_value_can_be_reclaimed() {
        let slot = LatestValueSlot::new();
        slot.publish(vec![0u8; 16]);
        let displaced = slot.publish(vec![1u8; 16]).expect("displaced");
        let reclaimed = Arc::try_unwrap(displaced).expect("sole owner");
        assert_eq!(reclaimed.len(), 16);
    }

    #[test]
    fn concurrent_producer_and_consumer_never_tear() {
        let slot = Arc::new(LatestValueSlot::new());
        let producer_slot = slot.clone();
        let producer = thread::spawn(move || {
            for i in 0..10_000u64 {
                producer_slot.publish([i; 8]);
            }
        });

        let mut last = 0u64;
        let mut seen = 0u64;
        while !producer.is_finished() || slot.is_ready() {
            if let Some(value) = slot.try_consume() {
                assert!(value.iter().all(|v| *v == value[0]));
                assert!(value[0] >= last);
                last = value[0];
                seen += 1;
            }
        }
        producer.join().unwrap();
        assert!(seen >= 1);
        assert_eq!(slot.published(), 10_000);
    }
}
