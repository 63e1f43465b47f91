//! Flag sets: header processing flags, global capabilities, security mode.
//! MS-SMB2 Sections 2.2.1, 2.2.3 and 2.2.4

use bitflags::bitflags;

bitflags! {
    /// SMB2 header Flags field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u32 {
        /// SMB2_FLAGS_SERVER_TO_REDIR: the packet is a response.
        const SERVER_TO_REDIR = 0x0000_0001;
        /// SMB2_FLAGS_ASYNC_COMMAND: bytes 32..40 hold an AsyncId.
        const ASYNC_COMMAND = 0x0000_0002;
        const RELATED_OPERATIONS = 0x0000_0004;
        const SIGNED = 0x0000_0008;
        /// I/O priority bits, 3.1.1 only.
        const PRIORITY_MASK = 0x0000_0070;
        const DFS_OPERATIONS = 0x1000_0000;
        const REPLAY_OPERATION = 0x2000_0000;
    }
}

bitflags! {
    /// Global capabilities advertised during negotiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const DFS = 0x0000_0001;
        const LEASING = 0x0000_0002;
        /// Multi-credit operations.
        const LARGE_MTU = 0x0000_0004;
        const MULTI_CHANNEL = 0x0000_0008;
        const PERSISTENT_HANDLES = 0x0000_0010;
        const DIRECTORY_LEASING = 0x0000_0020;
        const ENCRYPTION = 0x0000_0040;
    }
}

bitflags! {
    /// Security mode of a negotiate request or response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SecurityMode: u16 {
        const SIGNING_ENABLED = 0x0001;
        const SIGNING_REQUIRED = 0x0002;
    }
}

impl SecurityMode {
    /// A request security mode is recognised only if it is exactly one of
    /// the two defined flags.
    pub fn is_recognized(raw: u16) -> bool {
        raw == Self::SIGNING_ENABLED.bits() || raw == Self::SIGNING_REQUIRED.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_mode_recognized() {
        assert!(SecurityMode::is_recognized(1));
        assert!(SecurityMode::is_recognized(2));
        assert!(!SecurityMode::is_recognized(0));
        assert!(!SecurityMode::is_recognized(3));
    }

    #[test]
    fn test_unknown_bits_dropped() {
        let caps = Capabilities::from_bits_truncate(0xFFFF_FF84);
        assert_eq!(caps, Capabilities::LARGE_MTU);
    }
}
