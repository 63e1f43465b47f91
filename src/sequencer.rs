//! Credit sequencer: tracks which message sequence numbers a connection
//! may still use.
//! MS-SMB2 Section 3.3.1.1 (Algorithm for the Granting of Credits)
//!
//! Granted numbers form a window `[first, next)`. Each open number has a
//! bit in a fixed-size ring; consuming a number clears its bit and the
//! window floor moves past every cleared bit at the front. Numbers may be
//! consumed in any order, so the window can contain cleared gaps that stay
//! pinned behind an older open number.

use std::fmt;

/// Highest sequence number plus one. 0xFFFFFFFFFFFFFFFF is reserved for
/// unsolicited oplock breaks and is never granted.
const SEQUENCE_END: u64 = u64::MAX;

/// Reasons the sequencer refuses an operation. Nothing is modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditError {
    /// Granting would run past the last usable sequence number.
    SequenceWrap,
    /// Granting would exceed the credit limit.
    LimitExceeded,
    /// The window cannot grow while old numbers pin the ring.
    CapacityExceeded,
    /// Sequence number outside the granted window.
    OutOfWindow(u64),
    /// Sequence number already consumed.
    AlreadyConsumed(u64),
}

impl CreditError {
    /// Refused grants can be retried later; bad sequence numbers are a
    /// protocol violation by the peer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SequenceWrap | Self::LimitExceeded | Self::CapacityExceeded)
    }
}

impl fmt::Display for CreditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SequenceWrap => write!(f, "sequence numbers exhausted"),
            Self::LimitExceeded => write!(f, "credit limit exceeded"),
            Self::CapacityExceeded => write!(f, "sequence window full"),
            Self::OutOfWindow(n) => write!(f, "sequence number {} outside granted window", n),
            Self::AlreadyConsumed(n) => write!(f, "sequence number {} already consumed", n),
        }
    }
}

impl std::error::Error for CreditError {}

/// Fixed-capacity ring of bits addressed by logical position, where
/// position 0 is the front of the ring.
#[derive(Debug, Clone)]
struct BitRing {
    bits: Vec<u8>,
    head: usize,
    len: usize,
}

impl BitRing {
    fn with_capacity(bits: usize) -> Self {
        BitRing { bits: vec![0; (bits + 7) / 8], head: 0, len: 0 }
    }

    fn capacity(&self) -> usize {
        self.bits.len() * 8
    }

    fn len(&self) -> usize {
        self.len
    }

    fn physical(&self, i: usize) -> (usize, u8) {
        let mut pos = self.head + i;
        if pos >= self.capacity() {
            pos -= self.capacity();
        }
        (pos / 8, 1 << (pos % 8))
    }

    fn test(&self, i: usize) -> bool {
        let (byte, mask) = self.physical(i);
        self.bits[byte] & mask != 0
    }

    fn set(&mut self, i: usize) {
        let (byte, mask) = self.physical(i);
        self.bits[byte] |= mask;
    }

    fn clear(&mut self, i: usize) {
        let (byte, mask) = self.physical(i);
        self.bits[byte] &= !mask;
    }

    /// Append a set bit. The caller checks capacity.
    fn push_set(&mut self) {
        self.len += 1;
        self.set(self.len - 1);
    }

    /// Drop the front bit, which must be clear.
    fn pop_front(&mut self) {
        self.len -= 1;
        self.head += 1;
        if self.head == self.capacity() {
            self.head = 0;
        }
    }
}

/// Per-connection credit window.
#[derive(Debug, Clone)]
pub struct Sequencer {
    limit: usize,
    credits: usize,
    /// Sequence number at ring position 0.
    first: u64,
    /// Next sequence number to grant.
    next: u64,
    ring: BitRing,
}

impl Sequencer {
    /// A sequencer with no credits that never grants more than `limit`
    /// at once. A zero limit is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Sequencer { limit, credits: 0, first: 0, next: 0, ring: BitRing::with_capacity(limit) }
    }

    /// Granted and not yet consumed sequence numbers.
    pub fn credits(&self) -> usize {
        self.credits
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Credits that could still be granted under the limit.
    pub fn available(&self) -> usize {
        self.limit - self.credits
    }

    /// Oldest sequence number still inside the window.
    pub fn first(&self) -> u64 {
        self.first
    }

    /// Next sequence number to be granted.
    pub fn next_grant(&self) -> u64 {
        self.next
    }

    /// Grant `n` more sequence numbers.
    pub fn expand(&mut self, n: usize) -> Result<(), CreditError> {
        if SEQUENCE_END - (n as u64) < self.next {
            return Err(CreditError::SequenceWrap);
        }
        if self.credits + n > self.limit {
            return Err(CreditError::LimitExceeded);
        }
        if self.ring.len() + n > self.ring.capacity() {
            return Err(CreditError::CapacityExceeded);
        }
        for _ in 0..n {
            self.ring.push_set();
        }
        self.credits += n;
        self.next += n as u64;
        Ok(())
    }

    fn position(&self, seq: u64) -> Result<usize, CreditError> {
        if seq < self.first || seq >= self.next {
            return Err(CreditError::OutOfWindow(seq));
        }
        let pos = (seq - self.first) as usize;
        if !self.ring.test(pos) {
            return Err(CreditError::AlreadyConsumed(seq));
        }
        Ok(pos)
    }

    /// Consume sequence number `seq`.
    pub fn consume(&mut self, seq: u64) -> Result<(), CreditError> {
        let pos = self.position(seq)?;
        self.ring.clear(pos);
        self.credits -= 1;
        self.reclaim();
        Ok(())
    }

    /// Consume `count` consecutive sequence numbers starting at `first`,
    /// as charged by a multi-credit request. Either all of them are
    /// consumed or none.
    pub fn consume_range(&mut self, first: u64, count: usize) -> Result<(), CreditError> {
        for i in 0..count as u64 {
            let seq = first.checked_add(i).ok_or(CreditError::OutOfWindow(first))?;
            self.position(seq)?;
        }
        for i in 0..count as u64 {
            let pos = (first + i - self.first) as usize;
            self.ring.clear(pos);
        }
        self.credits -= count;
        self.reclaim();
        Ok(())
    }

    fn reclaim(&mut self) {
        while self.ring.len() > 0 && !self.ring.test(0) {
            self.ring.pop_front();
            self.first += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Credits(usize),
        Expand(usize),
        ExpandFail(usize),
        Consume(u64),
        ConsumeFail(u64),
    }
    use Op::*;

    fn run(ops: &[Op]) {
        let mut s = Sequencer::new(128);
        for (i, op) in ops.iter().enumerate() {
            match *op {
                Credits(n) => assert_eq!(s.credits(), n, "op {} {:?} in {:?}", i, op, ops),
                Expand(n) => assert!(s.expand(n).is_ok(), "op {} {:?} in {:?}", i, op, ops),
                ExpandFail(n) => assert!(s.expand(n).is_err(), "op {} {:?} in {:?}", i, op, ops),
                Consume(n) => assert!(s.consume(n).is_ok(), "op {} {:?} in {:?}", i, op, ops),
                ConsumeFail(n) => assert!(s.consume(n).is_err(), "op {} {:?} in {:?}", i, op, ops),
            }
        }
    }

    #[test]
    fn test_action_sequences() {
        let cases: Vec<Vec<Op>> = vec![
            vec![Credits(0)],
            vec![ConsumeFail(0), Credits(0)],
            vec![Expand(0), ConsumeFail(1), Credits(0)],
            vec![Expand(1), Consume(0), ConsumeFail(0), Credits(0)],
            vec![Expand(1), Credits(1), Consume(0), Credits(0)],
            vec![Expand(2), Consume(1), Credits(1)],
            vec![Expand(3), Consume(1), Credits(2)],
            vec![Expand(3), Consume(2), Consume(0), Credits(1)],
            vec![Expand(3), Consume(1), Consume(0), Consume(2), Credits(0)],
            vec![Expand(3), Consume(0), Credits(2)],
            vec![
                Expand(3), Credits(3), Consume(0), Credits(2), Consume(1), Credits(1),
                Consume(2), Credits(0),
            ],
            vec![Expand(4), Consume(0), Credits(3)],
            vec![
                Expand(1), Consume(0), Expand(4), ConsumeFail(0), Consume(1), Consume(4),
                Credits(2), ConsumeFail(4), Consume(3), Expand(1), Credits(2), Consume(5),
                Consume(2), Credits(0),
            ],
            vec![Expand(128), ExpandFail(1), Consume(0), Expand(1), Credits(128)],
        ];
        for case in &cases {
            run(case);
        }
    }

    #[test]
    fn test_sequential() {
        let mut s = Sequencer::new(16);
        for i in 0..32u64 {
            s.expand(1).unwrap();
            assert_eq!(s.credits(), 1);
            s.consume(i).unwrap();
            assert_eq!(s.credits(), 0);
        }
    }

    #[test]
    fn test_expand_all() {
        for n in 1..1024usize {
            let mut s = Sequencer::new(n);
            s.expand(n).unwrap();
            for i in 0..n as u64 {
                s.consume(i).unwrap();
            }
            assert_eq!(s.credits(), 0);
            assert_eq!(s.first(), n as u64);
        }
    }

    #[test]
    fn test_expand_overflow() {
        for n in 1..512usize {
            let mut s = Sequencer::new(n);
            s.expand(n).unwrap();
            assert_eq!(s.expand(1), Err(CreditError::LimitExceeded));
            assert_eq!(s.credits(), n);
        }
    }

    #[test]
    fn test_half_full() {
        for limit in 2..512usize {
            let mut s = Sequencer::new(limit);
            s.expand(limit / 2).unwrap();
            for i in 0..(limit * 2) as u64 {
                s.expand(1).unwrap();
                s.consume(i).unwrap();
            }
        }
    }

    #[test]
    fn test_near_full() {
        let limit = 128;
        let mut s = Sequencer::new(limit);
        s.expand(limit).unwrap();
        let mut n = 0u64;
        for chunk in 1..=limit {
            let mut i = 0;
            while i < limit * 10 {
                for c in (0..chunk as u64).rev() {
                    s.consume(n + c).unwrap();
                }
                s.expand(chunk).unwrap();
                n += chunk as u64;
                i += chunk;
            }
        }
        assert_eq!(s.credits(), limit);
    }

    #[test]
    fn test_out_of_order_reclamation() {
        let mut s = Sequencer::new(4);
        s.expand(4).unwrap();
        s.consume(1).unwrap();
        assert_eq!(s.credits(), 3);
        assert_eq!(s.first(), 0);
        s.consume(0).unwrap();
        assert_eq!(s.credits(), 2);
        assert_eq!(s.first(), 2);
        s.consume(3).unwrap();
        assert_eq!(s.first(), 2);
        s.consume(2).unwrap();
        assert_eq!(s.credits(), 0);
        assert_eq!(s.first(), 4);
    }

    #[test]
    fn test_double_consume() {
        let mut s = Sequencer::new(8);
        s.expand(3).unwrap();
        s.consume(1).unwrap();
        assert_eq!(s.consume(1), Err(CreditError::AlreadyConsumed(1)));
        assert_eq!(s.credits(), 2);
        s.consume(0).unwrap();
        // Reclaimed numbers fall below the window
        assert_eq!(s.consume(0), Err(CreditError::OutOfWindow(0)));
        assert_eq!(s.consume(3), Err(CreditError::OutOfWindow(3)));
        assert_eq!(s.credits(), 1);
    }

    #[test]
    fn test_full_ring_does_not_alias() {
        let mut s = Sequencer::new(8);
        s.expand(8).unwrap();
        // Position 8 would wrap onto the bit of sequence number 0
        assert_eq!(s.consume(8), Err(CreditError::OutOfWindow(8)));
        assert_eq!(s.credits(), 8);
    }

    #[test]
    fn test_pinned_window_capacity() {
        // Limit 10 rounds the ring up to 16 bits
        let mut s = Sequencer::new(10);
        s.expand(10).unwrap();
        for seq in 1..10 {
            s.consume(seq).unwrap();
        }
        assert_eq!(s.credits(), 1);
        s.expand(6).unwrap();
        // Sequence number 0 still pins the ring
        assert_eq!(s.expand(1), Err(CreditError::CapacityExceeded));
        assert_eq!(s.credits(), 7);
        s.consume(0).unwrap();
        s.expand(1).unwrap();
    }

    #[test]
    fn test_sequence_wrap() {
        let mut s = Sequencer::new(8);
        s.first = SEQUENCE_END - 2;
        s.next = SEQUENCE_END - 2;
        s.expand(2).unwrap();
        assert_eq!(s.expand(1), Err(CreditError::SequenceWrap));
        assert_eq!(s.credits(), 2);
        s.consume(SEQUENCE_END - 1).unwrap();
        s.consume(SEQUENCE_END - 2).unwrap();
        assert_eq!(s.consume(SEQUENCE_END), Err(CreditError::OutOfWindow(SEQUENCE_END)));
    }

    #[test]
    fn test_consume_range_atomic() {
        let mut s = Sequencer::new(16);
        s.expand(8).unwrap();
        s.consume(3).unwrap();
        // 2..5 includes the consumed 3
        assert_eq!(s.consume_range(2, 3), Err(CreditError::AlreadyConsumed(3)));
        assert_eq!(s.credits(), 7);
        // 6..10 runs past the window
        assert_eq!(s.consume_range(6, 4), Err(CreditError::OutOfWindow(8)));
        assert_eq!(s.credits(), 7);
        s.consume_range(0, 3).unwrap();
        assert_eq!(s.credits(), 4);
        assert_eq!(s.first(), 4);
        s.consume_range(4, 0).unwrap();
        assert_eq!(s.credits(), 4);
    }

    #[test]
    fn test_random_operations() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for limit in [1usize, 7, 8, 9, 64, 128] {
            let capacity = ((limit - 1) / 8 + 1) * 8;
            let mut s = Sequencer::new(limit);
            let mut open = BTreeSet::new();
            let mut next = 0u64;
            for _ in 0..20_000 {
                if rng.gen_bool(0.5) {
                    let n = rng.gen_range(0..=limit);
                    let first = open.iter().next().copied().unwrap_or(next);
                    let fits = open.len() + n <= limit && (next - first) as usize + n <= capacity;
                    let before = s.credits();
                    assert_eq!(s.expand(n).is_ok(), fits);
                    if fits {
                        open.extend(next..next + n as u64);
                        next += n as u64;
                    } else {
                        assert_eq!(s.credits(), before);
                    }
                } else {
                    let lo = next.saturating_sub(limit as u64 + 2);
                    let seq = rng.gen_range(lo..=next);
                    assert_eq!(s.consume(seq).is_ok(), open.remove(&seq));
                }
                assert_eq!(s.credits(), open.len());
                assert!(s.credits() <= s.limit());
            }
        }
    }
}
