//! Bounded FIFO of file-change notifications shared between the watch thread
//! and the render thread.
//!
//! The watch thread pushes, the render thread pops once per frame without
//! blocking. The queue never grows: if the producer gets a full ring ahead of
//! the consumer the process aborts, because silently dropping a change would
//! leave a shader stale with no indication why.

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use parking_lot::Mutex;

pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeKind(u8);

impl ChangeKind {
    pub const NONE: Self = Self(0);
    pub const IS_DIRECTORY: Self = Self(1 << 0);
    pub const MODIFIED: Self = Self(1 << 1);
    pub const CREATED: Self = Self(1 << 2);
    pub const DELETED: Self = Self(1 << 3);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChangeKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeKind {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// File name relative to the watched directory.
    pub path_name: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// The only kind of event that triggers a shader recompile.
    pub fn is_file_modification(&self) -> bool {
        self.kind.contains(ChangeKind::MODIFIED) && !self.kind.contains(ChangeKind::IS_DIRECTORY)
    }
}

struct Ring {
    slots: Vec<Option<ChangeEvent>>,
    head: usize,
    len: usize,
}

/// Cloneable handle to one shared ring.
#[derive(Clone)]
pub struct ChangeQueue {
    ring: Arc<Mutex<Ring>>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "change queue capacity must be positive");
        Self {
            ring: Arc::new(Mutex::new(Ring {
                slots: vec![None; capacity],
                head: 0,
                len: 0,
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().slots.len()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an event, handing it back when the ring is full.
    pub fn try_push(&self, event: ChangeEvent) -> Result<(), ChangeEvent> {
        let mut ring = self.ring.lock();
        let capacity = ring.slots.len();
        if ring.len == capacity {
            return Err(event);
        }
        let tail = (ring.head + ring.len) % capacity;
        ring.slots[tail] = Some(event);
        ring.len += 1;
        Ok(())
    }

    /// Appends an event. Aborts the process when the ring is full.
    ///
    /// A panic would only unwind the pushing thread, which is usually the
    /// watch thread, and the render thread would carry on with stale shaders.
    pub fn push(&self, event: ChangeEvent) {
        if let Err(event) = self.try_push(event) {
            log::error!(
                "Change queue was overrun (capacity {}) by {event:?}",
                self.capacity()
            );
            std::process::abort();
        }
    }

    /// Removes the oldest event, or returns `None` immediately when empty.
    pub fn pop(&self) -> Option<ChangeEvent> {
        let mut ring = self.ring.lock();
        if ring.len == 0 {
            return None;
        }
        let head = ring.head;
        let event = ring.slots[head].take();
        ring.head = (head + 1) % ring.slots.len();
        ring.len -= 1;
        event
    }

    /// Pops everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.pop()).collect()
    }
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}
