//! Business logic applied on the consumer thread
//!
//! | Operation | Checks, in order                                   | Effect              |
//! |-----------|----------------------------------------------------|---------------------|
//! | Create    | amount >= 0                                        | open fresh account  |
//! | Info      | account exists                                     | none                |
//! | Transfer  | from exists, to exists, amount >= 0, funds cover it | debit from, credit to |
//!
//! Each request runs to completion before the next one starts, and its
//! outcome is delivered through the completion stored in its slot.

use crate::error::{Error, Rejection, Result};
use crate::ledger::Ledger;
use crate::metrics::Metrics;
use crate::types::{AccountEvent, AccountId, EventType, Reply};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Consumer-side callback invoked for every published slot, in sequence order.
pub trait EventHandler<T>: Send {
    /// Process one slot. `end_of_batch` is set on the last slot of a
    /// contiguous run of published sequences.
    fn on_event(&mut self, event: &mut T, sequence: i64, end_of_batch: bool);

    /// Called on the consumer thread before the first event
    fn on_start(&mut self) {}

    /// Called on the consumer thread after the last event
    fn on_shutdown(&mut self) {}
}

/// Applies create/info/transfer requests to the ledger it owns.
#[derive(Debug)]
pub struct AccountEventHandler {
    ledger: Ledger,
    metrics: Option<Metrics>,
}

impl AccountEventHandler {
    /// Handler over an empty ledger
    pub fn new() -> Self {
        Self::with_ledger(Ledger::new())
    }

    /// Handler over an existing ledger
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger,
            metrics: None,
        }
    }

    /// Record request outcomes into `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ledger state
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Give up the ledger
    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    /// Open an account holding `amount`
    pub fn create(&mut self, amount: i64) -> Result<AccountId> {
        if amount < 0 {
            return Err(Rejection::NegativeAmount(amount).into());
        }

        let mut account = AccountId::generate();
        while !self.ledger.open(account, amount) {
            account = AccountId::generate();
        }

        tracing::debug!(%account, amount, "account created");
        Ok(account)
    }

    /// Current balance of `account`
    pub fn info(&self, account: &AccountId) -> Result<i64> {
        let amount = self
            .ledger
            .balance(account)
            .ok_or(Rejection::AccountNotFound(*account))?;

        tracing::debug!(%account, amount, "balance read");
        Ok(amount)
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// Nothing is mutated unless every check passes.
    pub fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: i64) -> Result<()> {
        let from_balance = self
            .ledger
            .balance(from)
            .ok_or(Rejection::FromAccountNotFound(*from))?;
        let to_balance = self
            .ledger
            .balance(to)
            .ok_or(Rejection::ToAccountNotFound(*to))?;

        if amount < 0 {
            return Err(Rejection::NegativeAmount(amount).into());
        }
        if from_balance < amount {
            return Err(Rejection::InsufficientFunds {
                balance: from_balance,
                requested: amount,
            }
            .into());
        }

        if from == to {
            tracing::debug!(account = %from, amount, "self transfer, balance unchanged");
            return Ok(());
        }

        let credited = to_balance.checked_add(amount).ok_or_else(|| {
            Error::Internal(format!(
                "balance overflow crediting {} to account {}",
                amount, to
            ))
        })?;

        self.ledger.set_balance(from, from_balance - amount);
        self.ledger.set_balance(to, credited);

        tracing::debug!(%from, %to, amount, "transfer applied");
        Ok(())
    }

    /// Run the operation described by `event`
    pub fn dispatch(&mut self, event: &AccountEvent) -> Result<Reply> {
        match event.event_type {
            EventType::Create => self.create(event.amount).map(Reply::Created),
            EventType::Info => {
                let account = event
                    .account_from
                    .ok_or(Rejection::MissingAccount("info"))?;
                self.info(&account).map(Reply::Balance)
            }
            EventType::Transfer => {
                let from = event
                    .account_from
                    .ok_or(Rejection::MissingAccount("from"))?;
                let to = event.account_to.ok_or(Rejection::MissingAccount("to"))?;
                self.transfer(&from, &to, event.amount)
                    .map(|_| Reply::Transferred)
            }
            EventType::Unset => Err(Rejection::UnsupportedOperation.into()),
        }
    }

    fn record(&self, event_type: EventType, outcome: &Result<Reply>) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_request(event_type.as_str());
        match outcome {
            Err(e) if e.is_invalid_argument() => metrics.record_rejection(event_type.as_str()),
            Err(_) => metrics.record_internal_error(),
            Ok(_) => {}
        }
    }
}

impl Default for AccountEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler<AccountEvent> for AccountEventHandler {
    fn on_event(&mut self, event: &mut AccountEvent, sequence: i64, _end_of_batch: bool) {
        let event_type = event.event_type;
        let completion = event.completion.take();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(event))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(Error::Internal(panic_message(payload.as_ref()))),
        };

        if let Err(e) = &outcome {
            if e.is_invalid_argument() {
                tracing::debug!(sequence, %event_type, error = %e, "request rejected");
            } else {
                tracing::error!(sequence, %event_type, error = %e, "problems during event processing");
            }
        }
        self.record(event_type, &outcome);

        match completion {
            Some(done) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || done(outcome))) {
                    tracing::error!(
                        sequence,
                        message = %panic_message(payload.as_ref()),
                        "completion callback panicked"
                    );
                }
            }
            None => tracing::warn!(sequence, %event_type, "slot published without completion"),
        }

        event.clear();
    }

    fn on_start(&mut self) {
        tracing::info!(accounts = self.ledger.len(), "account handler started");
    }

    fn on_shutdown(&mut self) {
        tracing::info!(accounts = self.ledger.len(), "account handler stopped");
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
