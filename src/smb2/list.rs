//! Fixed-stride lists of 16-bit members (dialects, ciphers, algorithms).
//!
//! A list is a view over `count * 2` bytes inside a request or response.
//! Lists are short in practice, so membership is a linear scan.

use std::fmt;
use std::marker::PhantomData;

use bytes::BufMut;

use super::wire::get_u16;

/// A value stored in a 16-bit list slot.
pub trait ListMember: Copy + PartialEq {
    fn from_u16(v: u16) -> Self;
    fn as_u16(&self) -> u16;
}

/// Read-only view of a 16-bit member list.
#[derive(Clone, Copy)]
pub struct U16List<'a, T> {
    bytes: &'a [u8],
    _member: PhantomData<T>,
}

impl<'a, T: ListMember> U16List<'a, T> {
    /// Interpret `bytes` as a list. A trailing odd byte is not a member.
    pub fn new(bytes: &'a [u8]) -> Self {
        U16List { bytes, _member: PhantomData }
    }

    /// View the first `count` members of `bytes`, or None if they don't fit.
    pub fn with_count(bytes: &'a [u8], count: usize) -> Option<Self> {
        let end = count.checked_mul(2)?;
        bytes.get(..end).map(Self::new)
    }

    pub fn count(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Member at position `i`. Panics if `i >= count()`.
    pub fn member(&self, i: usize) -> T {
        T::from_u16(get_u16(self.bytes, i * 2))
    }

    pub fn contains(&self, value: T) -> bool {
        self.iter().any(|m| m == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        self.bytes
            .chunks_exact(2)
            .map(|c| T::from_u16(u16::from_le_bytes([c[0], c[1]])))
    }

    /// Number of bytes needed to store `count` members.
    pub fn size_of(count: usize) -> usize {
        count * 2
    }

    /// Write `members` at the start of `buf`.
    pub fn write(buf: &mut [u8], members: &[T]) {
        for (i, m) in members.iter().enumerate() {
            (&mut buf[i * 2..]).put_u16_le(m.as_u16());
        }
    }
}

impl<T: ListMember + fmt::Debug> fmt::Debug for U16List<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
