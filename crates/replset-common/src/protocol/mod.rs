//! Protocol-facing types.
//!
//! The wire codec and document encoding live outside this workspace; what
//! lives here is the narrow slice the monitor and router actually read:
//! typed views over the two status documents, and a message header view for
//! raw-call routing.

pub mod message;
pub mod reply;

pub use message::{Message, OpCode, SECONDARY_OK};
pub use reply::{
    IsMasterReply, MemberStatus, ReplSetStatus, MEMBER_STATE_PRIMARY, MEMBER_STATE_SECONDARY,
};
