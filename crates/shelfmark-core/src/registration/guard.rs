use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::identifiers::Isbn;

/// One user-facing interaction surface, e.g. a scan session or a result row.
/// Single-flight is enforced per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionId(Uuid);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Presentation state of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationState {
    Idle,
    Submitting,
    Success,
    Conflict,
    RecentlyProcessed,
    Rejected,
    Failure,
}

#[derive(Default)]
struct GuardState {
    in_flight: HashSet<InteractionId>,
    recent: HashMap<Isbn, Instant>,
}

/// Local protection against double registration: one submission in flight
/// per context, and a cooldown per ISBN after each completed submission.
pub struct RegistrationGuard {
    cooldown: Duration,
    state: Mutex<GuardState>,
}

#[derive(Debug)]
pub enum Admission<'a> {
    Admitted(SubmissionTicket<'a>),
    /// Another submission from the same context is still running.
    Dropped,
    RecentlyProcessed { retry_after: Duration },
}

impl RegistrationGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(GuardState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn admit(&self, context: InteractionId, isbn: &Isbn) -> Admission<'_> {
        let now = Instant::now();
        let mut state = self.lock();

        if state.in_flight.contains(&context) {
            debug!(%context, isbn = %isbn, "dropped submission while another is in flight");
            return Admission::Dropped;
        }

        let cooldown = self.cooldown;
        state
            .recent
            .retain(|_, completed| now.duration_since(*completed) < cooldown);
        if let Some(completed) = state.recent.get(isbn) {
            let retry_after = cooldown.saturating_sub(now.duration_since(*completed));
            debug!(isbn = %isbn, ?retry_after, "rejected repeat submission during cooldown");
            return Admission::RecentlyProcessed { retry_after };
        }

        state.in_flight.insert(context);
        Admission::Admitted(SubmissionTicket {
            guard: self,
            context,
            isbn: isbn.clone(),
        })
    }
}

/// Held while a submission runs. Dropping it frees the context; only
/// [`SubmissionTicket::complete`] starts the cooldown.
#[derive(Debug)]
pub struct SubmissionTicket<'a> {
    guard: &'a RegistrationGuard,
    context: InteractionId,
    isbn: Isbn,
}

impl SubmissionTicket<'_> {
    pub fn complete(self) {
        if !self.guard.cooldown.is_zero() {
            self.guard
                .lock()
                .recent
                .insert(self.isbn.clone(), Instant::now());
        }
    }
}

impl Drop for SubmissionTicket<'_> {
    fn drop(&mut self) {
        self.guard.lock().in_flight.remove(&self.context);
    }
}

impl fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isbn(raw: &str) -> Isbn {
        Isbn::parse(raw).unwrap()
    }

    fn admitted(admission: Admission<'_>) -> SubmissionTicket<'_> {
        match admission {
            Admission::Admitted(ticket) => ticket,
            other => panic!("expected admission, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_submission_in_same_context_is_dropped() {
        let guard = RegistrationGuard::new(Duration::from_secs(10));
        let context = InteractionId::new();

        let ticket = admitted(guard.admit(context, &isbn("9784000000002")));
        assert!(matches!(
            guard.admit(context, &isbn("9784000000005")),
            Admission::Dropped
        ));
        // other contexts are independent
        let other = admitted(guard.admit(InteractionId::new(), &isbn("9784000000005")));

        drop(other);
        ticket.complete();
        // the context is free again once its submission finished
        admitted(guard.admit(context, &isbn("9784000000005")));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_rejects_until_window_elapses() {
        let guard = RegistrationGuard::new(Duration::from_secs(10));
        let target = isbn("9784000000002");

        admitted(guard.admit(InteractionId::new(), &target)).complete();

        tokio::time::advance(Duration::from_secs(9)).await;
        match guard.admit(InteractionId::new(), &target) {
            Admission::RecentlyProcessed { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(1));
            }
            other => panic!("expected cooldown rejection, got {other:?}"),
        }

        // a different identifier is unaffected
        admitted(guard.admit(InteractionId::new(), &isbn("9784000000005")));

        tokio::time::advance(Duration::from_secs(2)).await;
        admitted(guard.admit(InteractionId::new(), &target));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_ticket_does_not_start_cooldown() {
        let guard = RegistrationGuard::new(Duration::from_secs(10));
        let context = InteractionId::new();
        let target = isbn("9784000000002");

        drop(admitted(guard.admit(context, &target)));
        admitted(guard.admit(context, &target));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cooldown_never_rejects() {
        let guard = RegistrationGuard::new(Duration::ZERO);
        let target = isbn("9784000000002");
        admitted(guard.admit(InteractionId::new(), &target)).complete();
        admitted(guard.admit(InteractionId::new(), &target));
    }

    #[test]
    fn state_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&RegistrationState::RecentlyProcessed).unwrap(),
            "\"recentlyProcessed\""
        );
    }
}
