//! Proof polling with bounded exponential backoff.
//!
//! Proof unavailability is the normal state until the voting round is finalised, so every
//! non-ready answer and every transport error before the deadline is treated the same way:
//! log it, back off, ask again. Only the deadline is fatal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};

use crate::error::{RelayError, RelayResult};
use crate::events::{EventSink, PollOutcome, StageEvent};
use crate::round::VotingRound;
use crate::types::EncodedRequest;

/// Proof payload exactly as the proof-availability service returned it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProofPayload {
    #[serde(default)]
    pub proof: Option<Vec<String>>,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl RawProofPayload {
    /// A payload is ready once it carries a non-empty proof and a response body.
    pub fn is_ready(&self) -> bool {
        let has_proof = self.proof.as_ref().map_or(false, |nodes| !nodes.is_empty());
        let has_response = matches!(self.response, Some(ref value) if !value.is_null());
        has_proof && has_response
    }
}

/// Remote service serving proofs by voting round and encoded request.
#[async_trait]
pub trait ProofSource: Send + Sync {
    /// `Ok(None)` when the service answered with a non-success status.
    async fn fetch_proof(
        &self,
        round: VotingRound,
        request: &EncodedRequest,
    ) -> RelayResult<Option<RawProofPayload>>;
}

/// Timing of the proof wait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Wait before the first poll.
    pub initial_delay: Duration,
    /// Delay after the first not-ready answer.
    pub first_retry: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Cap on a single delay.
    pub max_delay: Duration,
    /// Total time allowed, counted from the start of the initial wait.
    pub deadline: Duration,
    /// Upper bound for a single request.
    pub request_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(95),
            first_retry: Duration::from_secs(10),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            deadline: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// `min(previous * multiplier, max_delay)`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        Duration::try_from_secs_f64(previous.as_secs_f64() * self.multiplier)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay slept after the `index`-th (zero-based) not-ready answer.
    pub fn retry_delay(&self, index: u32) -> Duration {
        let mut delay = self.first_retry.min(self.max_delay);
        for _ in 0..index {
            delay = self.next_delay(delay);
        }
        delay
    }

    /// Offset from the start of the wait at which poll `n` (one-based) is issued, assuming
    /// instant answers and no deadline.
    pub fn poll_offset(&self, n: u32) -> Duration {
        (0..n.saturating_sub(1)).fold(self.initial_delay, |acc, i| acc + self.retry_delay(i))
    }
}

/// Poller states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    WaitingForRoundClose,
    Polling,
    Done,
    Failed,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::WaitingForRoundClose => "waiting-for-round-close",
            PollState::Polling => "polling",
            PollState::Done => "done",
            PollState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Waits for a proof to become available.
pub struct ProofPoller {
    source: Arc<dyn ProofSource>,
    policy: BackoffPolicy,
}

impl ProofPoller {
    pub fn new(source: Arc<dyn ProofSource>, policy: BackoffPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Poll with the policy's own deadline.
    pub async fn poll(
        &self,
        round: VotingRound,
        request: &EncodedRequest,
        events: &dyn EventSink,
    ) -> RelayResult<RawProofPayload> {
        self.poll_until(round, request, self.policy.deadline, events)
            .await
    }

    /// Poll until a ready payload arrives or `deadline` has elapsed.
    ///
    /// Each request is bounded by the time left and every sleep is clamped to it, so the
    /// deadline is overrun by at most one in-flight request.
    pub async fn poll_until(
        &self,
        round: VotingRound,
        request: &EncodedRequest,
        deadline: Duration,
        events: &dyn EventSink,
    ) -> RelayResult<RawProofPayload> {
        let started = Instant::now();

        let initial = self.policy.initial_delay.min(deadline);
        set_state(events, PollState::WaitingForRoundClose);
        events.emit(StageEvent::WaitingForRoundClose {
            voting_round: round,
            delay: initial,
        });
        sleep(initial).await;

        set_state(events, PollState::Polling);
        let mut delay = self.policy.first_retry.min(self.policy.max_delay);
        let mut attempts = 0u32;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                set_state(events, PollState::Failed);
                return Err(RelayError::TimeoutExceeded {
                    round,
                    elapsed,
                    attempts,
                });
            }

            attempts += 1;
            let budget = (deadline - elapsed).min(self.policy.request_timeout);
            let outcome = match timeout(budget, self.source.fetch_proof(round, request)).await {
                Ok(Ok(Some(payload))) if payload.is_ready() => {
                    events.emit(StageEvent::PollAttempt {
                        attempt: attempts,
                        elapsed: started.elapsed(),
                        outcome: PollOutcome::Ready,
                        next_delay: None,
                    });
                    set_state(events, PollState::Done);
                    return Ok(payload);
                }
                Ok(Ok(_)) => PollOutcome::NotReady,
                Ok(Err(e)) => PollOutcome::TransientError(e.to_string()),
                Err(_) => PollOutcome::TransientError(format!(
                    "request timed out after {:.1}s",
                    budget.as_secs_f64()
                )),
            };

            let pause = delay.min(deadline.saturating_sub(started.elapsed()));
            events.emit(StageEvent::PollAttempt {
                attempt: attempts,
                elapsed: started.elapsed(),
                outcome,
                next_delay: Some(pause),
            });
            sleep(pause).await;
            delay = self.policy.next_delay(delay);
        }
    }
}

fn set_state(events: &dyn EventSink, state: PollState) {
    events.emit(StageEvent::PollStateChanged { state });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use std::sync::Mutex;

    /// Answers not-ready until `ready_on` polls have been made.
    struct ScriptedSource {
        ready_on: Option<u32>,
        fail_every_other: bool,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(ready_on: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                ready_on,
                fail_every_other: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn flaky(ready_on: u32) -> Arc<Self> {
            Arc::new(Self {
                ready_on: Some(ready_on),
                fail_every_other: true,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_offsets(&self, start: Instant) -> Vec<Duration> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|at| at.duration_since(start))
                .collect()
        }
    }

    #[async_trait]
    impl ProofSource for ScriptedSource {
        async fn fetch_proof(
            &self,
            _round: VotingRound,
            _request: &EncodedRequest,
        ) -> RelayResult<Option<RawProofPayload>> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() as u32
            };
            if Some(n) == self.ready_on {
                return Ok(Some(ready_payload()));
            }
            if self.fail_every_other && n % 2 == 1 {
                return Err(RelayError::Http("connection reset".into()));
            }
            Ok(Some(RawProofPayload::default()))
        }
    }

    /// Never answers.
    struct HangingSource;

    #[async_trait]
    impl ProofSource for HangingSource {
        async fn fetch_proof(
            &self,
            _round: VotingRound,
            _request: &EncodedRequest,
        ) -> RelayResult<Option<RawProofPayload>> {
            std::future::pending().await
        }
    }

    /// Paused-clock timers resolve to whole milliseconds.
    fn assert_close(actual: Duration, expected_ms: u128) {
        let actual_ms = actual.as_millis();
        assert!(
            actual_ms.abs_diff(expected_ms) <= 10,
            "poll at {}ms, expected {}ms",
            actual_ms,
            expected_ms
        );
    }

    fn ready_payload() -> RawProofPayload {
        RawProofPayload {
            proof: Some(vec![format!("0x{}", "11".repeat(32))]),
            response: Some(serde_json::json!({ "votingRound": "3" })),
        }
    }

    fn request() -> EncodedRequest {
        EncodedRequest::new(vec![0x45, 0x56, 0x4d])
    }

    #[test]
    fn test_readiness_requires_proof_and_response() {
        assert!(ready_payload().is_ready());
        assert!(!RawProofPayload::default().is_ready());
        assert!(!RawProofPayload {
            proof: Some(Vec::new()),
            response: Some(serde_json::json!({})),
        }
        .is_ready());
        assert!(!RawProofPayload {
            proof: Some(vec!["0x00".into()]),
            response: None,
        }
        .is_ready());
    }

    #[test]
    fn test_retry_delays_are_capped() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..6).map(|i| policy.retry_delay(i).as_millis() as u64).collect();
        assert_eq!(delays, vec![10_000, 15_000, 22_500, 30_000, 30_000, 30_000]);
    }

    #[test]
    fn test_next_delay_saturates_instead_of_overflowing() {
        let policy = BackoffPolicy {
            multiplier: f64::MAX,
            max_delay: Duration::MAX,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.next_delay(Duration::from_secs(10)), Duration::MAX);

        let huge = BackoffPolicy {
            multiplier: 1e300,
            ..BackoffPolicy::default()
        };
        assert_eq!(huge.next_delay(Duration::from_secs(10)), huge.max_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_follow_backoff() {
        let source = ScriptedSource::new(Some(6));
        let poller = ProofPoller::new(source.clone(), BackoffPolicy::default());
        let start = Instant::now();

        let payload = poller
            .poll(VotingRound(3), &request(), &RecordingSink::new())
            .await
            .unwrap();
        assert!(payload.is_ready());

        let offsets = source.call_offsets(start);
        let expected = [95_000u128, 105_000, 120_000, 142_500, 172_500, 202_500];
        assert_eq!(offsets.len(), expected.len());

        let policy = BackoffPolicy::default();
        for (n, (offset, want)) in offsets.iter().zip(expected).enumerate() {
            assert_close(*offset, want);
            assert_eq!(policy.poll_offset(n as u32 + 1).as_millis(), want);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_swallowed() {
        let source = ScriptedSource::flaky(4);
        let poller = ProofPoller::new(source.clone(), BackoffPolicy::default());
        let sink = RecordingSink::new();

        poller.poll(VotingRound(7), &request(), &sink).await.unwrap();

        let outcomes: Vec<PollOutcome> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                StageEvent::PollAttempt { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[0], PollOutcome::TransientError(_)));
        assert_eq!(outcomes[1], PollOutcome::NotReady);
        assert!(matches!(outcomes[2], PollOutcome::TransientError(_)));
        assert_eq!(outcomes[3], PollOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_fatal() {
        let source = ScriptedSource::new(None);
        let poller = ProofPoller::new(source.clone(), BackoffPolicy::default());
        let sink = RecordingSink::new();
        let start = Instant::now();

        let err = poller
            .poll(VotingRound(3), &request(), &sink)
            .await
            .unwrap_err();

        match err {
            RelayError::TimeoutExceeded {
                round,
                elapsed,
                attempts,
            } => {
                assert_eq!(round, VotingRound(3));
                assert_eq!(elapsed.as_secs(), 600);
                assert_eq!(attempts, 19);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(start.elapsed() <= Duration::from_secs(601));
        assert_eq!(source.calls.lock().unwrap().len(), 19);

        let states: Vec<PollState> = sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                StageEvent::PollStateChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PollState::WaitingForRoundClose,
                PollState::Polling,
                PollState::Failed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_request_bounded_by_deadline() {
        let policy = BackoffPolicy {
            deadline: Duration::from_secs(120),
            ..BackoffPolicy::default()
        };
        let poller = ProofPoller::new(Arc::new(HangingSource), policy);
        let start = Instant::now();

        let err = poller
            .poll(VotingRound(1), &request(), &RecordingSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::TimeoutExceeded { .. }));
        // 95s wait, then a 25s request capped by the deadline.
        assert_eq!(start.elapsed().as_secs(), 120);
    }
}
