//! Dialect revisions and the per-connection dialect negotiation state.
//! MS-SMB2 Sections 2.2.3 and 3.3.1.7 (Connection.NegotiateDialect)

use std::fmt;

use super::list::{ListMember, U16List};

/// An SMB2 dialect revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    Smb202,
    Smb21,
    Smb30,
    Smb302,
    Smb311,
    /// "SMB 2.???", only meaningful during multi-protocol negotiation.
    Wildcard,
    Other(u16),
}

impl Revision {
    /// Concrete revisions from lowest to highest.
    pub const CONCRETE: [Revision; 5] = [
        Revision::Smb202,
        Revision::Smb21,
        Revision::Smb30,
        Revision::Smb302,
        Revision::Smb311,
    ];

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Smb202 => 0x0202,
            Self::Smb21 => 0x0210,
            Self::Smb30 => 0x0300,
            Self::Smb302 => 0x0302,
            Self::Smb311 => 0x0311,
            Self::Wildcard => 0x02FF,
            Self::Other(v) => *v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0202 => Self::Smb202,
            0x0210 => Self::Smb21,
            0x0300 => Self::Smb30,
            0x0302 => Self::Smb302,
            0x0311 => Self::Smb311,
            0x02FF => Self::Wildcard,
            v => Self::Other(v),
        }
    }

    pub fn major(&self) -> u8 {
        (self.as_u16() >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        ((self.as_u16() & 0x00F0) >> 4) as u8
    }

    pub fn patch(&self) -> u8 {
        (self.as_u16() & 0x000F) as u8
    }

    /// True for the five revisions a connection can settle on.
    pub fn is_concrete(&self) -> bool {
        Self::CONCRETE.contains(self)
    }

    /// True for the SMB 3.x family.
    pub fn is_smb3(&self) -> bool {
        matches!(self, Self::Smb30 | Self::Smb302 | Self::Smb311)
    }
}

impl ListMember for Revision {
    fn from_u16(v: u16) -> Self {
        Revision::from_u16(v)
    }

    fn as_u16(&self) -> u16 {
        Revision::as_u16(self)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smb202 => write!(f, "SMB 2.0.2"),
            Self::Smb21 => write!(f, "SMB 2.1"),
            Self::Smb30 => write!(f, "SMB 3.0"),
            Self::Smb302 => write!(f, "SMB 3.0.2"),
            Self::Smb311 => write!(f, "SMB 3.1.1"),
            Self::Wildcard => write!(f, "SMB 2.???"),
            Self::Other(_) => write!(f, "SMB {}.{}.{}", self.major(), self.minor(), self.patch()),
        }
    }
}

/// Dialect list inside a negotiate request or a multi-protocol preamble.
pub type DialectList<'a> = U16List<'a, Revision>;

/// Dialect negotiation state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectState {
    Uninitialized,
    /// Multi-protocol negotiation done, waiting for an SMB2 NEGOTIATE.
    Wildcard,
    /// Negotiation complete. Always holds a concrete revision.
    Ready(Revision),
}

/// Rejected dialect state transition. The state is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: DialectState,
    pub to: DialectState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal dialect transition {} -> {}", self.from, self.to)
    }
}

impl DialectState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(r) if r.is_concrete())
    }

    /// Negotiated revision once ready.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Self::Ready(r) => Some(*r),
            _ => None,
        }
    }

    pub fn can_transition(&self, next: DialectState) -> bool {
        let next_ready = next.is_ready();
        match self {
            Self::Uninitialized => next_ready || next == Self::Wildcard,
            Self::Wildcard => next_ready,
            Self::Ready(_) => false,
        }
    }

    /// Move to `next` if the transition is legal.
    pub fn transition(&mut self, next: DialectState) -> Result<(), IllegalTransition> {
        if !self.can_transition(next) {
            return Err(IllegalTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for DialectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Wildcard => write!(f, "{}", Revision::Wildcard),
            Self::Ready(r) => write!(f, "{}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(r: Revision) -> DialectState {
        DialectState::Ready(r)
    }

    #[test]
    fn test_revision_names() {
        assert_eq!(Revision::Smb311.to_string(), "SMB 3.1.1");
        assert_eq!(Revision::Wildcard.to_string(), "SMB 2.???");
        assert_eq!(Revision::from_u16(0x0422).to_string(), "SMB 4.2.2");
        assert_eq!(Revision::from_u16(0x0311), Revision::Smb311);
    }

    #[test]
    fn test_dialect_list_contains() {
        let members = [Revision::Smb202, Revision::Smb302, Revision::Other(0x0123)];
        let mut buf = [0u8; 6];
        DialectList::write(&mut buf, &members);
        let list = DialectList::new(&buf);
        assert_eq!(list.count(), 3);
        for v in [0x0202u16, 0x0210, 0x0300, 0x0302, 0x0311, 0x02FF, 0x0123, 0x0000] {
            let r = Revision::from_u16(v);
            assert_eq!(list.contains(r), members.contains(&r), "{}", r);
        }
    }

    #[test]
    fn test_bootstrap_path() {
        let mut state = DialectState::Uninitialized;
        assert!(state.transition(DialectState::Wildcard).is_ok());
        assert!(!state.is_ready());
        assert!(state.transition(ready(Revision::Smb202)).is_ok());
        assert!(state.is_ready());
        assert_eq!(state.revision(), Some(Revision::Smb202));
    }

    #[test]
    fn test_direct_negotiation() {
        let mut state = DialectState::Uninitialized;
        assert!(state.transition(ready(Revision::Smb311)).is_ok());
        assert_eq!(state, ready(Revision::Smb311));
    }

    #[test]
    fn test_ready_is_terminal() {
        for r in Revision::CONCRETE {
            let mut state = ready(r);
            for next in Revision::CONCRETE {
                let err = state.transition(ready(next)).unwrap_err();
                assert_eq!(err.from, ready(r));
            }
            assert!(state.transition(DialectState::Wildcard).is_err());
            assert!(state.transition(DialectState::Uninitialized).is_err());
            assert_eq!(state, ready(r));
        }
    }

    #[test]
    fn test_wildcard_cannot_regress() {
        let mut state = DialectState::Wildcard;
        assert!(state.transition(DialectState::Wildcard).is_err());
        assert!(state.transition(DialectState::Uninitialized).is_err());
        assert_eq!(state, DialectState::Wildcard);
    }

    #[test]
    fn test_non_concrete_ready_rejected() {
        let mut state = DialectState::Uninitialized;
        assert!(state.transition(ready(Revision::Other(0x0400))).is_err());
        assert!(state.transition(ready(Revision::Wildcard)).is_err());
        assert!(state.transition(DialectState::Uninitialized).is_err());
        assert_eq!(state, DialectState::Uninitialized);
    }
}
