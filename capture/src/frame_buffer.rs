use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tg_core::types::Slot;

/// Single-slot latest-value cell between one stream worker and the render loop.
///
/// Writes replace the stored slot and never wait: if the reader happens to
/// hold the lock the write is dropped, the next cycle publishes again.
/// The lock only ever guards an `Arc` clone, never a pixel copy.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Option<Slot>>,
    published: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the write was dropped.
    pub fn publish(&self, slot: Slot) -> bool {
        let previous = match self.slot.try_lock() {
            Some(mut guard) => guard.replace(slot),
            None => return false,
        };
        self.published.fetch_add(1, Ordering::Release);
        // Free the old frame outside the lock.
        drop(previous);
        true
    }

    /// Blocks only for as long as a writer's `replace`; the critical section
    /// on both sides is an `Arc` clone or swap.
    pub fn latest(&self, default: Slot) -> Slot {
        let current = self.slot.lock().clone();
        current.unwrap_or(default)
    }

    pub fn publish_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tg_core::types::{Frame, FrameSize};

    const SIZE: FrameSize = FrameSize::new(8, 8, 3);

    #[test]
    fn empty_buffer_returns_default() {
        let buffer = FrameBuffer::new();
        assert!(buffer.is_empty());
        assert!(!buffer.latest(Slot::Placeholder).is_live());

        let fallback = Slot::live(Frame::filled(SIZE, 7));
        let got = buffer.latest(fallback);
        assert_eq!(got.frame().unwrap().data()[0], 7);
    }

    #[test]
    fn latest_returns_last_publish_until_replaced() {
        let buffer = FrameBuffer::new();
        assert!(buffer.publish(Slot::live(Frame::filled(SIZE, 1))));

        for _ in 0..3 {
            let got = buffer.latest(Slot::Placeholder);
            assert_eq!(got.frame().unwrap().data()[0], 1);
        }

        assert!(buffer.publish(Slot::live(Frame::filled(SIZE, 2))));
        assert_eq!(buffer.latest(Slot::Placeholder).frame().unwrap().data()[0], 2);
        assert_eq!(buffer.publish_count(), 2);
    }

    #[test]
    fn placeholder_publish_overrides_live_frame() {
        let buffer = FrameBuffer::new();
        buffer.publish(Slot::live(Frame::filled(SIZE, 9)));
        buffer.publish(Slot::Placeholder);
        let got = buffer.latest(Slot::live(Frame::filled(SIZE, 5)));
        assert!(!got.is_live());
        assert!(got.to_frame(SIZE).is_blank());
    }

    #[test]
    fn concurrent_publish_and_read_never_tear() {
        let buffer = Arc::new(FrameBuffer::new());
        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..2_000u32 {
                    buffer.publish(Slot::live(Frame::filled(SIZE, (i % 255) as u8)));
                }
            })
        };

        for _ in 0..2_000 {
            if let Slot::Live(frame) = buffer.latest(Slot::Placeholder) {
                let first = frame.data()[0];
                assert!(frame.data().iter().all(|v| *v == first));
                assert_eq!(frame.size(), SIZE);
            }
        }
        writer.join().unwrap();
        assert!(buffer.publish_count() > 0);
    }
}
