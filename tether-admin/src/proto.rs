//! Protobuf messages exchanged on the admin socket.
//!
//! Every frame is a big-endian `u32` byte length followed by one encoded
//! message: an [`AdminRequest`] from the client, an [`AdminReply`] back.

use prost::{Enumeration, Message, Oneof};

/// One admin command.
#[derive(Clone, PartialEq, Message)]
pub struct AdminRequest {
    /// The command to run
    #[prost(oneof = "admin_request::Command", tags = "1, 2, 3")]
    pub command: Option<admin_request::Command>,
}

/// Nested types for [`AdminRequest`].
pub mod admin_request {
    use super::Oneof;

    /// The commands the control plane understands.
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Command {
        /// Summarize the live router
        #[prost(message, tag = "1")]
        Status(super::StatusRequest),
        /// Dump one table in slot order
        #[prost(message, tag = "2")]
        Dump(super::DumpRequest),
        /// Dry-run a routing decision
        #[prost(message, tag = "3")]
        Route(super::RouteRequest),
    }
}

/// Asks for a summary of the live router.
#[derive(Clone, PartialEq, Message)]
pub struct StatusRequest {}

/// Summary of the live router.
#[derive(Clone, PartialEq, Message)]
pub struct StatusReply {
    /// `versioned` or `simple`
    #[prost(string, tag = "1")]
    pub mode: String,
    /// Current generation; unset in simple mode or before the first install
    #[prost(uint64, optional, tag = "2")]
    pub generation: Option<u64>,
    /// Retained generations, oldest first
    #[prost(uint64, repeated, tag = "3")]
    pub retained: Vec<u64>,
    /// History bound; zero in simple mode
    #[prost(uint64, tag = "4")]
    pub max_history: u64,
    /// Members of the current table in builder order
    #[prost(string, repeated, tag = "5")]
    pub backends: Vec<String>,
}

/// Asks for the slot-order dump of a table.
#[derive(Clone, PartialEq, Message)]
pub struct DumpRequest {
    /// Generation to dump; the current table when unset
    #[prost(uint64, optional, tag = "1")]
    pub generation: Option<u64>,
}

/// Slot owners of one table.
#[derive(Clone, PartialEq, Message)]
pub struct DumpReply {
    /// Generation dumped; unset in simple mode
    #[prost(uint64, optional, tag = "1")]
    pub generation: Option<u64>,
    /// Owning backend identifier of every slot, in slot order
    #[prost(string, repeated, tag = "2")]
    pub slots: Vec<String>,
}

/// Asks how a key would be routed.
#[derive(Clone, PartialEq, Message)]
pub struct RouteRequest {
    /// Routing key
    #[prost(string, tag = "1")]
    pub key: String,
    /// Generation token the client would present
    #[prost(string, optional, tag = "2")]
    pub token: Option<String>,
}

/// Relation of a decision to the client's previous assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RouteStateKind {
    /// Not reported
    Unspecified = 0,
    /// No usable client generation
    Fresh = 1,
    /// Primary unchanged since the client's generation
    Stable = 2,
    /// Primary moved since the client's generation
    Migrating = 3,
    /// Simple mode; generations are not tracked
    Direct = 4,
}

/// A dry-run routing decision.
#[derive(Clone, PartialEq, Message)]
pub struct RouteReply {
    /// How the decision relates to the supplied token
    #[prost(enumeration = "RouteStateKind", tag = "1")]
    pub state: i32,
    /// Chosen primary backend
    #[prost(string, tag = "2")]
    pub primary: String,
    /// Current replication peers
    #[prost(string, repeated, tag = "3")]
    pub peers: Vec<String>,
    /// Current generation; unset in simple mode
    #[prost(uint64, optional, tag = "4")]
    pub generation: Option<u64>,
    /// Primary under the token's generation, set only on a hand-off
    #[prost(string, optional, tag = "5")]
    pub previous_primary: Option<String>,
    /// Peers under the token's generation, set only on a hand-off
    #[prost(string, repeated, tag = "6")]
    pub previous_peers: Vec<String>,
}

/// A command that could not be served.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorReply {
    /// Human-readable reason
    #[prost(string, tag = "1")]
    pub message: String,
}

/// The answer to one [`AdminRequest`].
#[derive(Clone, PartialEq, Message)]
pub struct AdminReply {
    /// Command outcome
    #[prost(oneof = "admin_reply::Reply", tags = "1, 2, 3, 4")]
    pub reply: Option<admin_reply::Reply>,
}

/// Nested types for [`AdminReply`].
pub mod admin_reply {
    use super::Oneof;

    /// Outcome of one command.
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Reply {
        /// Answer to a status command
        #[prost(message, tag = "1")]
        Status(super::StatusReply),
        /// Answer to a dump command
        #[prost(message, tag = "2")]
        Dump(super::DumpReply),
        /// Answer to a route command
        #[prost(message, tag = "3")]
        Route(super::RouteReply),
        /// The command failed
        #[prost(message, tag = "4")]
        Error(super::ErrorReply),
    }
}

impl AdminRequest {
    /// A status command.
    pub fn status() -> Self {
        Self {
            command: Some(admin_request::Command::Status(StatusRequest {})),
        }
    }

    /// A dump of `generation`, or of the current table.
    pub fn dump(generation: Option<u64>) -> Self {
        Self {
            command: Some(admin_request::Command::Dump(DumpRequest { generation })),
        }
    }

    /// A dry-run route of `key` under an optional client token.
    pub fn route(key: impl Into<String>, token: Option<String>) -> Self {
        Self {
            command: Some(admin_request::Command::Route(RouteRequest {
                key: key.into(),
                token,
            })),
        }
    }
}

impl AdminReply {
    fn of(reply: admin_reply::Reply) -> Self {
        Self { reply: Some(reply) }
    }

    pub(crate) fn status(reply: StatusReply) -> Self {
        Self::of(admin_reply::Reply::Status(reply))
    }

    pub(crate) fn dump(reply: DumpReply) -> Self {
        Self::of(admin_reply::Reply::Dump(reply))
    }

    pub(crate) fn route(reply: RouteReply) -> Self {
        Self::of(admin_reply::Reply::Route(reply))
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::of(admin_reply::Reply::Error(ErrorReply {
            message: message.into(),
        }))
    }
}
