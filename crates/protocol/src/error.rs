//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding a client message (spec §7: both
/// a malformed frame and an unrecognized `type`/action tag land here,
/// since `serde`'s tagged-enum decoding rejects either the same way —
/// there is no separate parse step that could tell them apart).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
