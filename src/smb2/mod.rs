//! SMB2 protocol types: headers, negotiation, and status codes.
//!
//! Every wire structure is a view over a byte buffer; nothing here owns or
//! copies message bytes except the response builders.
//! Reference: [MS-SMB2] — Server Message Block Protocol Versions 2 and 3

pub mod capabilities;
pub mod context;
pub mod dialect;
pub mod filetime;
pub mod flags;
pub mod guid;
pub mod header;
pub mod list;
pub mod multiproto;
pub mod negotiate;
pub mod status;
pub mod wire;

use std::fmt;

/// SMB2 command codes.
/// MS-SMB2 Section 2.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Smb2Command {
    Negotiate = 0,
    SessionSetup = 1,
    Logoff = 2,
    TreeConnect = 3,
    TreeDisconnect = 4,
    Create = 5,
    Close = 6,
    Flush = 7,
    Read = 8,
    Write = 9,
    Lock = 10,
    Ioctl = 11,
    Cancel = 12,
    Echo = 13,
    QueryDirectory = 14,
    ChangeNotify = 15,
    QueryInfo = 16,
    SetInfo = 17,
    OplockBreak = 18,
}

impl Smb2Command {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::Negotiate),
            1 => Some(Self::SessionSetup),
            2 => Some(Self::Logoff),
            3 => Some(Self::TreeConnect),
            4 => Some(Self::TreeDisconnect),
            5 => Some(Self::Create),
            6 => Some(Self::Close),
            7 => Some(Self::Flush),
            8 => Some(Self::Read),
            9 => Some(Self::Write),
            10 => Some(Self::Lock),
            11 => Some(Self::Ioctl),
            12 => Some(Self::Cancel),
            13 => Some(Self::Echo),
            14 => Some(Self::QueryDirectory),
            15 => Some(Self::ChangeNotify),
            16 => Some(Self::QueryInfo),
            17 => Some(Self::SetInfo),
            18 => Some(Self::OplockBreak),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Negotiate => "NEGOTIATE",
            Self::SessionSetup => "SESSION_SETUP",
            Self::Logoff => "LOGOFF",
            Self::TreeConnect => "TREE_CONNECT",
            Self::TreeDisconnect => "TREE_DISCONNECT",
            Self::Create => "CREATE",
            Self::Close => "CLOSE",
            Self::Flush => "FLUSH",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Lock => "LOCK",
            Self::Ioctl => "IOCTL",
            Self::Cancel => "CANCEL",
            Self::Echo => "ECHO",
            Self::QueryDirectory => "QUERY_DIRECTORY",
            Self::ChangeNotify => "CHANGE_NOTIFY",
            Self::QueryInfo => "QUERY_INFO",
            Self::SetInfo => "SET_INFO",
            Self::OplockBreak => "OPLOCK_BREAK",
        }
    }
}

impl fmt::Display for Smb2Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
