/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use serde::{Deserialize, Serialize};

/// Dictionary identifiers are assigned by the server, unique within a session
pub type DictId = u32;

/// Read or write request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWriteRecord {
    pub dict_id: DictId,
    pub timestamp: i64,
    /// File offset of the request
    pub offset: i64,
    /// Positive for reads, negative for writes
    pub length: i32,
}

impl ReadWriteRecord {
    pub fn is_write(&self) -> bool {
        self.length < 0
    }

    pub fn bytes(&self) -> u64 {
        u64::from(self.length.unsigned_abs())
    }
}

/// File open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub dict_id: DictId,
    pub timestamp: i64,
    pub flags: u8,
    pub file_size: u64,
}

impl OpenRecord {
    pub const FLAG_READ_WRITE: u8 = 0x01;

    pub fn is_read_write(&self) -> bool {
        self.flags & Self::FLAG_READ_WRITE != 0
    }
}

/// File close with the totals transferred while it was open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRecord {
    pub dict_id: DictId,
    pub timestamp: i64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Client session end. `dict_id` refers to the user dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRecord {
    pub dict_id: DictId,
    pub timestamp: i64,
    pub flags: u8,
    pub duration_secs: i32,
}

impl DisconnectRecord {
    pub const FLAG_FORCED: u8 = 0x01;

    pub fn is_forced(&self) -> bool {
        self.flags & Self::FLAG_FORCED != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    ReadWrite,
    Open,
    Close,
    Disconnect,
}

impl TraceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceKind::ReadWrite => "read_write",
            TraceKind::Open => "open",
            TraceKind::Close => "close",
            TraceKind::Disconnect => "disconnect",
        }
    }
}

/// One decoded trace sub-record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceRecord {
    ReadWrite(ReadWriteRecord),
    Open(OpenRecord),
    Close(CloseRecord),
    Disconnect(DisconnectRecord),
}

impl TraceRecord {
    pub fn dict_id(&self) -> DictId {
        match self {
            TraceRecord::ReadWrite(r) => r.dict_id,
            TraceRecord::Open(r) => r.dict_id,
            TraceRecord::Close(r) => r.dict_id,
            TraceRecord::Disconnect(r) => r.dict_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            TraceRecord::ReadWrite(r) => r.timestamp,
            TraceRecord::Open(r) => r.timestamp,
            TraceRecord::Close(r) => r.timestamp,
            TraceRecord::Disconnect(r) => r.timestamp,
        }
    }

    pub fn kind(&self) -> TraceKind {
        match self {
            TraceRecord::ReadWrite(_) => TraceKind::ReadWrite,
            TraceRecord::Open(_) => TraceKind::Open,
            TraceRecord::Close(_) => TraceKind::Close,
            TraceRecord::Disconnect(_) => TraceKind::Disconnect,
        }
    }
}

/// Client identity as servers print it: `[protocol/]user.pid:session@host`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserIdentity {
    pub protocol: Option<String>,
    pub user: String,
    pub pid: Option<u32>,
    pub session: Option<u32>,
    pub host: String,
}

impl UserIdentity {
    /// Parse an identity string. Text without a host part is kept verbatim
    /// in `user`.
    pub fn parse(text: &str) -> Self {
        let Some((left, host)) = text.rsplit_once('@') else {
            return Self {
                user: text.to_string(),
                ..Default::default()
            };
        };

        let (protocol, left) = match left.split_once('/') {
            Some((protocol, rest)) => (Some(protocol.to_string()), rest),
            None => (None, left),
        };

        let (left, session) = match left.rsplit_once(':') {
            Some((rest, session)) => (rest, session.parse().ok()),
            None => (left, None),
        };

        let (user, pid) = match left.rsplit_once('.') {
            Some((user, pid)) => match pid.parse() {
                Ok(pid) => (user, Some(pid)),
                Err(_) => (left, None),
            },
            None => (left, None),
        };

        Self {
            protocol,
            user: user.to_string(),
            pid,
            session,
            host: host.to_string(),
        }
    }
}

/// Mapping from a dictionary id to the file path a client opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub dict_id: DictId,
    /// Client that opened the path, when the server sent one
    pub identity: Option<UserIdentity>,
    pub path: String,
}

impl DictEntry {
    /// Build an entry from the packet text `identity\npath`
    pub fn from_text(dict_id: DictId, text: &str) -> Self {
        match text.split_once('\n') {
            Some((identity, path)) => Self {
                dict_id,
                identity: Some(UserIdentity::parse(identity)),
                path: path.to_string(),
            },
            None => Self {
                dict_id,
                identity: None,
                path: text.to_string(),
            },
        }
    }
}

/// Session-level user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub dict_id: DictId,
    pub identity: UserIdentity,
    pub auth_info: Option<String>,
}

impl UserEntry {
    /// Build an entry from the packet text `identity[\nauth-info]`
    pub fn from_text(dict_id: DictId, text: &str) -> Self {
        let (identity, auth_info) = match text.split_once('\n') {
            Some((identity, auth)) if !auth.is_empty() => (identity, Some(auth.to_string())),
            Some((identity, _)) => (identity, None),
            None => (text, None),
        };
        Self {
            dict_id,
            identity: UserIdentity::parse(identity),
            auth_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_identity() {
        let id = UserIdentity::parse("xrootd/alice.4021:17@node12.example.org");
        assert_eq!(id.protocol.as_deref(), Some("xrootd"));
        assert_eq!(id.user, "alice");
        assert_eq!(id.pid, Some(4021));
        assert_eq!(id.session, Some(17));
        assert_eq!(id.host, "node12.example.org");
    }

    #[test]
    fn test_parse_identity_without_protocol() {
        let id = UserIdentity::parse("bob.12:3@host");
        assert_eq!(id.protocol, None);
        assert_eq!(id.user, "bob");
        assert_eq!(id.pid, Some(12));
        assert_eq!(id.session, Some(3));
    }

    #[test]
    fn test_parse_identity_with_dotted_user() {
        let id = UserIdentity::parse("first.last:9@host");
        assert_eq!(id.user, "first.last");
        assert_eq!(id.pid, None);
        assert_eq!(id.session, Some(9));
    }

    #[test]
    fn test_unparseable_identity_kept_verbatim() {
        let id = UserIdentity::parse("not an identity");
        assert_eq!(id.user, "not an identity");
        assert!(id.host.is_empty());
    }

    #[test]
    fn test_dict_entry_splits_identity_and_path() {
        let entry = DictEntry::from_text(7, "alice.1:2@h\n/store/data/file.root");
        assert_eq!(entry.path, "/store/data/file.root");
        assert_eq!(entry.identity.unwrap().user, "alice");

        let bare = DictEntry::from_text(8, "/store/other");
        assert_eq!(bare.identity, None);
        assert_eq!(bare.path, "/store/other");
    }

    #[test]
    fn test_user_entry_auth_info() {
        let entry = UserEntry::from_text(3, "carol.5:6@h\n&p=gsi&n=carol");
        assert_eq!(entry.auth_info.as_deref(), Some("&p=gsi&n=carol"));
        assert_eq!(UserEntry::from_text(3, "carol.5:6@h\n").auth_info, None);
    }

    #[test]
    fn test_read_write_direction() {
        let write = ReadWriteRecord {
            dict_id: 1,
            timestamp: 0,
            offset: 0,
            length: -4096,
        };
        assert!(write.is_write());
        assert_eq!(write.bytes(), 4096);
    }

    #[test]
    fn test_trace_record_serializes_with_kind_tag() {
        let record = TraceRecord::Open(OpenRecord {
            dict_id: 5,
            timestamp: 1000,
            flags: OpenRecord::FLAG_READ_WRITE,
            file_size: 42,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "open");
        assert_eq!(json["dict_id"], 5);
        assert_eq!(record.kind().as_str(), "open");
    }
}
