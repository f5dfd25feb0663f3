//! Voting round clock.
//!
//! The proof-availability service indexes attestations by voting round, so the round
//! computed here from a block timestamp must agree with the attestation chain's own
//! computation. Both use floor division over whole seconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Attestation voting round (epoch index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotingRound(pub u64);

impl VotingRound {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VotingRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VotingRound {
    fn from(value: u64) -> Self {
        VotingRound(value)
    }
}

/// `floor((observed - epoch_start) / epoch_duration)`.
///
/// Fails only when `epoch_duration <= 0`. Timestamps before `epoch_start` yield negative
/// rounds.
pub fn round_id(observed: i64, epoch_start: i64, epoch_duration: i64) -> RelayResult<i64> {
    if epoch_duration <= 0 {
        return Err(RelayError::InvalidInput(format!(
            "epoch duration must be positive, got {}",
            epoch_duration
        )));
    }
    let offset = i128::from(observed) - i128::from(epoch_start);
    let round = offset.div_euclid(i128::from(epoch_duration));
    // |offset| < 2^64 and duration >= 1, so the quotient fits back into i64 unless the
    // duration is 1 and the offset spans the whole range.
    i64::try_from(round)
        .map_err(|_| RelayError::InvalidInput(format!("round id {} out of range", round)))
}

/// Round clock bound to a chain's epoch parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundClock {
    epoch_start: i64,
    epoch_duration: i64,
}

impl RoundClock {
    pub fn new(epoch_start: i64, epoch_duration: i64) -> RelayResult<Self> {
        if epoch_duration <= 0 {
            return Err(RelayError::InvalidInput(format!(
                "epoch duration must be positive, got {}",
                epoch_duration
            )));
        }
        Ok(Self {
            epoch_start,
            epoch_duration,
        })
    }

    pub fn epoch_start(&self) -> i64 {
        self.epoch_start
    }

    pub fn epoch_duration(&self) -> i64 {
        self.epoch_duration
    }

    /// Round containing `timestamp` (Unix seconds).
    ///
    /// Timestamps before the first round are rejected since no attestation can exist there.
    pub fn round_for(&self, timestamp: u64) -> RelayResult<VotingRound> {
        let observed = i64::try_from(timestamp).map_err(|_| {
            RelayError::InvalidInput(format!("timestamp {} out of range", timestamp))
        })?;
        let round = round_id(observed, self.epoch_start, self.epoch_duration)?;
        u64::try_from(round).map(VotingRound).map_err(|_| {
            RelayError::InvalidInput(format!(
                "timestamp {} precedes the first voting round at {}",
                timestamp, self.epoch_start
            ))
        })
    }

    /// First second of `round`, saturating at `i64::MAX`.
    pub fn round_start(&self, round: VotingRound) -> i64 {
        let index = i64::try_from(round.0).unwrap_or(i64::MAX);
        self.epoch_start
            .saturating_add(index.saturating_mul(self.epoch_duration))
    }

    /// First second after `round` closes.
    pub fn round_end(&self, round: VotingRound) -> i64 {
        self.round_start(round).saturating_add(self.epoch_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const COSTON2_START: i64 = 1_658_430_000;

    #[test]
    fn test_coston2_submission_block() {
        assert_eq!(round_id(1_658_430_270, COSTON2_START, 90).unwrap(), 3);

        let clock = RoundClock::new(COSTON2_START, 90).unwrap();
        assert_eq!(clock.round_for(1_658_430_270).unwrap(), VotingRound(3));
    }

    #[test]
    fn test_epoch_start_is_round_zero() {
        assert_eq!(round_id(COSTON2_START, COSTON2_START, 90).unwrap(), 0);
        assert_eq!(round_id(COSTON2_START + 89, COSTON2_START, 90).unwrap(), 0);
        assert_eq!(round_id(COSTON2_START + 90, COSTON2_START, 90).unwrap(), 1);
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        assert!(matches!(
            round_id(100, 0, 0),
            Err(RelayError::InvalidInput(_))
        ));
        assert!(round_id(100, 0, -90).is_err());
        assert!(RoundClock::new(0, 0).is_err());
    }

    #[test]
    fn test_pre_epoch_timestamp() {
        assert_eq!(round_id(COSTON2_START - 1, COSTON2_START, 90).unwrap(), -1);

        let clock = RoundClock::new(COSTON2_START, 90).unwrap();
        assert!(matches!(
            clock.round_for((COSTON2_START - 1) as u64),
            Err(RelayError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_round_bounds() {
        let clock = RoundClock::new(COSTON2_START, 90).unwrap();
        assert_eq!(clock.round_start(VotingRound(3)), 1_658_430_270);
        assert_eq!(clock.round_end(VotingRound(3)), 1_658_430_360);
    }

    #[test]
    fn test_round_bounds_saturate_for_huge_rounds() {
        let clock = RoundClock::new(COSTON2_START, 90).unwrap();
        for round in [u64::MAX, 1 << 63, i64::MAX as u64] {
            assert_eq!(clock.round_start(VotingRound(round)), i64::MAX);
            assert_eq!(clock.round_end(VotingRound(round)), i64::MAX);
        }
        assert!(clock.round_start(VotingRound(u64::MAX)) > clock.round_start(VotingRound(3)));
    }

    proptest! {
        #[test]
        fn prop_round_is_non_decreasing(
            t in 0i64..4_000_000_000,
            step in 0i64..1_000_000,
            start in 0i64..2_000_000_000,
            duration in 1i64..100_000,
        ) {
            let earlier = round_id(t, start, duration).unwrap();
            let later = round_id(t + step, start, duration).unwrap();
            prop_assert!(later >= earlier);
        }

        #[test]
        fn prop_round_zero_at_epoch_start(
            start in -1_000_000_000i64..4_000_000_000,
            duration in 1i64..100_000,
        ) {
            prop_assert_eq!(round_id(start, start, duration).unwrap(), 0);
        }
    }
}
