//! Revert reasons reported by the destination contracts.

use std::fmt;

/// A decoded revert reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevertReason {
    /// The source transaction hash was credited before.
    AlreadyProcessed,
    /// Caller is not the designated relayer / owner.
    Unauthorized,
    /// No Merkle root is stored for the proof's voting round.
    RootNotSynced,
    /// The deposit was not sent to the accounting address.
    WrongReceiver,
    ZeroValue,
    /// Merkle verification against the stored root failed.
    InvalidProof,
    Other(String),
}

impl RevertReason {
    /// Map a revert string onto a known reason.
    ///
    /// Matching is case-insensitive and tolerant of the node wrapping the contract's
    /// message (`"execution reverted: Already processed"`).
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("already processed") || lower.contains("already credited") {
            RevertReason::AlreadyProcessed
        } else if lower.contains("unauthorized") || lower.contains("not relayer") {
            RevertReason::Unauthorized
        } else if lower.contains("root not synced") || lower.contains("root not set") {
            RevertReason::RootNotSynced
        } else if lower.contains("wrong receiver") {
            RevertReason::WrongReceiver
        } else if lower.contains("zero value") {
            RevertReason::ZeroValue
        } else if lower.contains("invalid proof") || lower.contains("invalid merkle proof") {
            RevertReason::InvalidProof
        } else {
            let trimmed = message
                .trim()
                .trim_start_matches("execution reverted:")
                .trim();
            RevertReason::Other(trimmed.to_string())
        }
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::AlreadyProcessed => f.write_str("Already processed"),
            RevertReason::Unauthorized => f.write_str("Unauthorized"),
            RevertReason::RootNotSynced => f.write_str("Root not synced"),
            RevertReason::WrongReceiver => f.write_str("Wrong receiver"),
            RevertReason::ZeroValue => f.write_str("Zero value"),
            RevertReason::InvalidProof => f.write_str("Invalid proof"),
            RevertReason::Other(message) => f.write_str(message),
        }
    }
}
