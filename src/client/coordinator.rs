//! Shares a single token refresh between every request that finds its access
//! token expired while that refresh is in flight.
//!
//! The coordinator is either idle or refreshing. The first request to join an
//! idle coordinator becomes the leader and performs the refresh; requests that
//! join while it is refreshing become followers and wait on a one-shot channel
//! for the outcome. When the leader settles the flight, every follower receives
//! the same outcome and the coordinator is idle again.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::client::error::RefreshError;

/// The new access token, or why it could not be obtained.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing(Vec<oneshot::Sender<RefreshOutcome>>),
}

/// The refresh state machine and its queue of waiting requests.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// A request's role in a refresh.
#[derive(Debug)]
pub enum Ticket<'a> {
    /// No refresh was in flight; the holder must perform it and settle the flight.
    Leader(RefreshFlight<'a>),
    /// A refresh is in flight; the receiver resolves once it is settled.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshCoordinator {
    /// Create an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether no refresh is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(*self.state(), RefreshState::Idle)
    }

    /// How many requests are waiting on the refresh in flight.
    pub fn waiting(&self) -> usize {
        match &*self.state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing(waiters) => waiters.len(),
        }
    }

    /// Lead a new refresh if the coordinator is idle, otherwise wait for the current one.
    pub fn join(&self) -> Ticket<'_> {
        let mut state = self.state();

        match &mut *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing(Vec::new());
                Ticket::Leader(RefreshFlight {
                    coordinator: self,
                    settled: false,
                })
            }
            RefreshState::Refreshing(waiters) => {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                Ticket::Follower(receiver)
            }
        }
    }

    fn finish(&self, outcome: RefreshOutcome) -> usize {
        let waiters = match std::mem::take(&mut *self.state()) {
            RefreshState::Refreshing(waiters) => waiters,
            RefreshState::Idle => Vec::new(),
        };

        let waiter_count = waiters.len();

        for waiter in waiters {
            // The receiver is gone if the waiting request was cancelled.
            let _ = waiter.send(outcome.clone());
        }

        waiter_count
    }
}

/// The right, and duty, to settle the refresh in flight.
///
/// Dropping an unsettled flight settles it with [RefreshError::Abandoned] so
/// waiting requests never hang.
#[derive(Debug)]
pub struct RefreshFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshFlight<'_> {
    /// Hand `outcome` to every waiting request and return the coordinator to idle.
    ///
    /// Returns the number of requests that were waiting.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.finish(outcome)
    }
}

impl Drop for RefreshFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("token refresh abandoned before it finished");
            self.coordinator.finish(Err(RefreshError::Abandoned));
        }
    }
}
