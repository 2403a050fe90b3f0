//! Voting round arithmetic for the Flare systems manager.

/// Voting round ids are `uint32` on-chain; anything above this points at a
/// misconfigured endpoint rather than a real round.
pub const MAX_VOTING_ROUND_ID: u64 = u32::MAX as u64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoundIdError {
    #[error("voting epoch duration is zero")]
    ZeroDuration,
    #[error("block timestamp {block_timestamp} precedes the first voting round start {first_round_start_ts}")]
    BeforeFirstRound {
        block_timestamp: u64,
        first_round_start_ts: u64,
    },
    #[error("voting round id {round_id} exceeds the protocol maximum {MAX_VOTING_ROUND_ID}")]
    OutOfRange { round_id: u64 },
}

/// The two systems-manager constants that map a timestamp to a voting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingEpoch {
    pub first_round_start_ts: u64,
    pub duration_secs: u64,
}

impl VotingEpoch {
    pub fn new(first_round_start_ts: u64, duration_secs: u64) -> Self {
        Self {
            first_round_start_ts,
            duration_secs,
        }
    }

    /// `floor((block_timestamp - first_round_start_ts) / duration_secs)`.
    ///
    /// Values that cannot come from a healthy chain are rejected instead of
    /// being clamped.
    pub fn round_id_at(&self, block_timestamp: u64) -> Result<u64, RoundIdError> {
        if self.duration_secs == 0 {
            return Err(RoundIdError::ZeroDuration);
        }

        let elapsed = block_timestamp
            .checked_sub(self.first_round_start_ts)
            .ok_or(RoundIdError::BeforeFirstRound {
                block_timestamp,
                first_round_start_ts: self.first_round_start_ts,
            })?;

        let round_id = elapsed / self.duration_secs;
        if round_id > MAX_VOTING_ROUND_ID {
            return Err(RoundIdError::OutOfRange { round_id });
        }
        Ok(round_id)
    }
}
