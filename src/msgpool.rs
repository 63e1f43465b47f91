//! Reusable message buffers.
//!
//! Buffers come in fixed size classes; a request for more than the largest
//! class gets a one-off allocation that is never pooled. Dropping a
//! `Message` hands its buffer back to the pool it came from.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;

/// Buffer sizes of the pooled classes, smallest first.
pub const SIZE_CLASSES: [usize; 5] = [64, 512, 4096, 32768, 262144];

/// Idle buffers kept per class.
const MAX_IDLE_PER_CLASS: usize = 32;

/// Pool of message buffers shared by all connections.
#[derive(Debug)]
pub struct MessagePool {
    idle: [Mutex<Vec<BytesMut>>; SIZE_CLASSES.len()],
}

impl MessagePool {
    pub fn new() -> Arc<Self> {
        Arc::new(MessagePool { idle: std::array::from_fn(|_| Mutex::new(Vec::new())) })
    }

    fn class_for(length: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&size| length <= size)
    }

    /// A zero-filled message of exactly `length` bytes.
    pub fn get(self: &Arc<Self>, length: usize) -> Message {
        let class = match Self::class_for(length) {
            Some(class) => class,
            None => return Message { buf: BytesMut::zeroed(length), origin: None },
        };
        let recycled = self.idle[class].lock().ok().and_then(|mut idle| idle.pop());
        let mut buf = recycled.unwrap_or_else(|| BytesMut::with_capacity(SIZE_CLASSES[class]));
        buf.clear();
        buf.resize(length, 0);
        Message { buf, origin: Some((Arc::clone(self), class)) }
    }

    fn put(&self, class: usize, buf: BytesMut) {
        // A poisoned lock only costs the reuse of this buffer
        if let Ok(mut idle) = self.idle[class].lock() {
            if idle.len() < MAX_IDLE_PER_CLASS {
                idle.push(buf);
            }
        }
    }

    #[cfg(test)]
    fn idle_count(&self, class: usize) -> usize {
        self.idle[class].lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// A message buffer on loan from a `MessagePool`.
#[derive(Debug)]
pub struct Message {
    buf: BytesMut,
    origin: Option<(Arc<MessagePool>, usize)>,
}

impl Message {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Deref for Message {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsMut<[u8]> for Message {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        if let Some((pool, class)) = self.origin.take() {
            pool.put(class, std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(MessagePool::class_for(0), Some(0));
        assert_eq!(MessagePool::class_for(64), Some(0));
        assert_eq!(MessagePool::class_for(65), Some(1));
        assert_eq!(MessagePool::class_for(4096), Some(2));
        assert_eq!(MessagePool::class_for(262144), Some(4));
        assert_eq!(MessagePool::class_for(262145), None);
    }

    #[test]
    fn test_get_is_zeroed_after_reuse() {
        let pool = MessagePool::new();
        {
            let mut msg = pool.get(100);
            assert_eq!(msg.len(), 100);
            msg.fill(0xAB);
        }
        assert_eq!(pool.idle_count(1), 1);
        let msg = pool.get(200);
        assert_eq!(pool.idle_count(1), 0);
        assert_eq!(msg.len(), 200);
        assert!(msg.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_dynamic_not_pooled() {
        let pool = MessagePool::new();
        let msg = pool.get(300_000);
        assert_eq!(msg.len(), 300_000);
        drop(msg);
        for class in 0..SIZE_CLASSES.len() {
            assert_eq!(pool.idle_count(class), 0);
        }
    }

    #[test]
    fn test_idle_bound() {
        let pool = MessagePool::new();
        let msgs: Vec<_> = (0..MAX_IDLE_PER_CLASS + 5).map(|_| pool.get(10)).collect();
        drop(msgs);
        assert_eq!(pool.idle_count(0), MAX_IDLE_PER_CLASS);
    }
}
