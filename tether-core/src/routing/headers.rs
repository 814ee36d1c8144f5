//! Hand-off signaling headers attached to forwarded requests.
//!
//! The forwarding layer copies these onto the upstream request so the
//! chosen backend can tell whether it inherited a session from a peer.
//! Absence of the `previous` headers means no hand-off occurred.

use crate::domain::join_ids;
use crate::routing::versioned::RouteResult;

/// Current generation as a decimal integer.
pub const HEADER_GENERATION: &str = "x-maglev-generation";
/// Comma-joined identifiers of the current replication peers.
pub const HEADER_REPLICATION_PEERS: &str = "x-maglev-replication-peers";
/// Comma-joined identifiers of the peers under the client's generation.
pub const HEADER_PREVIOUS_PEERS: &str = "x-maglev-previous-peers";
/// Identifier of the primary under the client's generation.
pub const HEADER_PREVIOUS_PRIMARY: &str = "x-maglev-previous-primary";

impl RouteResult {
    /// Header name/value pairs describing this decision.
    pub fn handoff_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_GENERATION, self.generation.to_string()),
            (HEADER_REPLICATION_PEERS, join_ids(&self.peers)),
        ];

        if self.requires_recovery {
            if let Some(previous) = &self.previous_primary {
                headers.push((HEADER_PREVIOUS_PRIMARY, previous.id.clone()));
                headers.push((HEADER_PREVIOUS_PEERS, join_ids(&self.previous_peers)));
            }
        }

        headers
    }
}
