//! Producer façade
//!
//! The only surface request-issuing code needs. Every call claims a slot,
//! fills it, publishes it and returns; the request runs later on the
//! consumer thread, which then invokes exactly one of the two callbacks.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │   AccountOperations (Clone, Send)    │   many producer threads
//! │   submit_create / info / transfer    │
//! └──────────────────┬───────────────────┘
//!                    │ claim → populate → publish
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │       RingBuffer<AccountEvent>       │   fixed slots, no queue growth
//! └──────────────────┬───────────────────┘
//!                    │ contiguous published run
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  BatchEventProcessor (one thread)    │
//! │  AccountEventHandler → Ledger        │
//! └──────────────────────────────────────┘
//! ```
//!
//! Calls block while the ring is full. From async code that stall lands on
//! the calling runtime worker, which is the intended backpressure.
//!
//! Callbacks run on the consumer thread. A callback must not submit a new
//! request synchronously: with the ring full, the claim would wait for the
//! one thread that frees slots, and the engine would never make progress.
//! Hand follow-up work to another thread or task instead.

use crate::error::{Error, Result};
use crate::ring::RingBuffer;
use crate::types::{AccountEvent, AccountId, Completion, EventType, Reply};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Cloneable handle for submitting requests to the engine.
///
/// Do not call any `submit_*` method from inside a callback; see the
/// module docs.
#[derive(Clone)]
pub struct AccountOperations {
    ring: Arc<RingBuffer<AccountEvent>>,
}

impl AccountOperations {
    pub(crate) fn new(ring: Arc<RingBuffer<AccountEvent>>) -> Self {
        Self { ring }
    }

    /// Claim, populate and publish one slot; returns its sequence.
    ///
    /// Fails with [`Error::Shutdown`] once the engine is stopping, in which
    /// case `completion` is dropped without being called. `completion` runs
    /// on the consumer thread and must not submit synchronously.
    pub fn submit(
        &self,
        event_type: EventType,
        amount: i64,
        account_from: Option<AccountId>,
        account_to: Option<AccountId>,
        completion: Completion,
    ) -> Result<i64> {
        self.ring.publish_event(move |event, sequence| {
            event.sequence = sequence;
            event.populate(event_type, amount, account_from, account_to, completion);
        })
    }

    /// Open an account with `amount`; `on_success` receives its identifier
    ///
    /// Callbacks run on the consumer thread; they must not submit again.
    pub fn submit_create<S, E>(&self, amount: i64, on_success: S, on_error: E) -> Result<()>
    where
        S: FnOnce(AccountId) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let completion = split(Reply::into_created, on_success, on_error);
        self.submit(EventType::Create, amount, None, None, completion)
            .map(|_| ())
    }

    /// Read the balance of `account`
    ///
    /// Callbacks run on the consumer thread; they must not submit again.
    pub fn submit_info<S, E>(&self, account: AccountId, on_success: S, on_error: E) -> Result<()>
    where
        S: FnOnce(i64) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let completion = split(Reply::into_balance, on_success, on_error);
        self.submit(EventType::Info, 0, Some(account), None, completion)
            .map(|_| ())
    }

    /// Move `amount` from `from` to `to`
    ///
    /// Callbacks run on the consumer thread; they must not submit again.
    pub fn submit_transfer<S, E>(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
        on_success: S,
        on_error: E,
    ) -> Result<()>
    where
        S: FnOnce() + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let completion = split(Reply::into_transferred, move |()| on_success(), on_error);
        self.submit(EventType::Transfer, amount, Some(from), Some(to), completion)
            .map(|_| ())
    }

    /// Open an account and wait for its identifier
    pub async fn create(&self, amount: i64) -> Result<AccountId> {
        let reply = self.request(EventType::Create, amount, None, None)?;
        reply.await?.into_created()
    }

    /// Read a balance
    pub async fn info(&self, account: AccountId) -> Result<i64> {
        let reply = self.request(EventType::Info, 0, Some(account), None)?;
        reply.await?.into_balance()
    }

    /// Transfer and wait for the outcome
    pub async fn transfer(&self, from: AccountId, to: AccountId, amount: i64) -> Result<()> {
        let reply = self.request(EventType::Transfer, amount, Some(from), Some(to))?;
        reply.await?.into_transferred()
    }

    /// Whether the engine still accepts requests
    pub fn is_accepting(&self) -> bool {
        !self.ring.sequencer().is_closed()
    }

    /// Number of ring slots
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    fn request(
        &self,
        event_type: EventType,
        amount: i64,
        account_from: Option<AccountId>,
        account_to: Option<AccountId>,
    ) -> Result<impl std::future::Future<Output = Result<Reply>>> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            event_type,
            amount,
            account_from,
            account_to,
            Box::new(move |outcome: Result<Reply>| {
                let _ = tx.send(outcome);
            }),
        )?;

        Ok(async move {
            rx.await
                .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
        })
    }
}

impl std::fmt::Debug for AccountOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountOperations")
            .field("ring", &self.ring)
            .finish()
    }
}

/// Build one completion out of a typed success callback and an error callback
fn split<T, X, S, E>(extract: X, on_success: S, on_error: E) -> Completion
where
    X: FnOnce(Reply) -> Result<T> + Send + 'static,
    S: FnOnce(T) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
{
    Box::new(move |outcome: Result<Reply>| match outcome.and_then(extract) {
        Ok(value) => on_success(value),
        Err(e) => on_error(e),
    })
}
