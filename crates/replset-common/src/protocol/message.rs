//! Wire-message header view.
//!
//! The routing layer forwards raw messages without decoding them, but it has
//! to look at two header fields to route correctly: the operation code (is
//! this a query?) and, for queries, the options bitfield (did the caller opt
//! into secondary reads?). The payload stays opaque bytes; encoding and
//! decoding belong to the wire codec, not this crate.

/// Query-option bit allowing the operation to run on a secondary.
pub const SECONDARY_OK: u32 = 1 << 2;

/// Operation codes carried in a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
}

/// A raw wire message: decoded header, opaque body.
#[derive(Debug, Clone)]
pub struct Message {
    op: OpCode,
    /// Query options bitfield; only meaningful when `op` is `Query`.
    flags: u32,
    payload: Vec<u8>,
}

impl Message {
    /// A query message with the given options bitfield.
    pub fn query(flags: u32, payload: Vec<u8>) -> Self {
        Self {
            op: OpCode::Query,
            flags,
            payload,
        }
    }

    /// A non-query message. The options bitfield is zero.
    pub fn new(op: OpCode, payload: Vec<u8>) -> Self {
        Self {
            op,
            flags: 0,
            payload,
        }
    }

    pub fn op(&self) -> OpCode {
        self.op
    }

    /// The query options bitfield, present only on query messages.
    pub fn query_flags(&self) -> Option<u32> {
        match self.op {
            OpCode::Query => Some(self.flags),
            _ => None,
        }
    }

    /// Whether this is a query that permits secondary routing.
    pub fn is_secondary_ok_query(&self) -> bool {
        self.query_flags()
            .map(|flags| flags & SECONDARY_OK != 0)
            .unwrap_or(false)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
