//! Core types for the engine
//!
//! The ring is pre-filled with [`AccountEvent`] records that are overwritten
//! on every reuse, so nothing here is allocated per request except the
//! boxed [`Completion`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account identifier (random 128-bit UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of request carried by a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Slot never populated (dispatched as unsupported)
    #[default]
    Unset,
    /// Open a new account with a starting balance
    Create,
    /// Read an account balance
    Info,
    /// Move funds between two accounts
    Transfer,
}

impl EventType {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Unset => "unset",
            EventType::Create => "create",
            EventType::Info => "info",
            EventType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success payload of a processed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Identifier of the newly created account
    Created(AccountId),
    /// Current balance of the queried account
    Balance(i64),
    /// Transfer applied
    Transferred,
}

impl Reply {
    /// Expect a [`Reply::Created`]
    pub fn into_created(self) -> Result<AccountId> {
        match self {
            Reply::Created(account) => Ok(account),
            other => Err(unexpected("created", other)),
        }
    }

    /// Expect a [`Reply::Balance`]
    pub fn into_balance(self) -> Result<i64> {
        match self {
            Reply::Balance(amount) => Ok(amount),
            other => Err(unexpected("balance", other)),
        }
    }

    /// Expect a [`Reply::Transferred`]
    pub fn into_transferred(self) -> Result<()> {
        match self {
            Reply::Transferred => Ok(()),
            other => Err(unexpected("transferred", other)),
        }
    }
}

fn unexpected(expected: &str, got: Reply) -> Error {
    Error::Internal(format!("expected {} reply, got {:?}", expected, got))
}

/// Completion for one request.
///
/// The success and error callbacks travel together as a single `FnOnce`
/// over the outcome, so exactly one of them runs, at most once.
pub type Completion = Box<dyn FnOnce(Result<Reply>) + Send + 'static>;

/// Reusable request record stored in the ring.
#[derive(Default)]
pub struct AccountEvent {
    /// Sequence that last claimed this slot
    pub sequence: i64,

    /// Operation kind
    pub event_type: EventType,

    /// Amount for create and transfer
    pub amount: i64,

    /// Source account for transfer, target account for info
    pub account_from: Option<AccountId>,

    /// Destination account for transfer
    pub account_to: Option<AccountId>,

    /// Callback pair, taken by the consumer when the slot is processed
    pub completion: Option<Completion>,
}

impl AccountEvent {
    /// Overwrite every field for a new request
    pub fn populate(
        &mut self,
        event_type: EventType,
        amount: i64,
        account_from: Option<AccountId>,
        account_to: Option<AccountId>,
        completion: Completion,
    ) {
        self.event_type = event_type;
        self.amount = amount;
        self.account_from = account_from;
        self.account_to = account_to;
        self.completion = Some(completion);
    }

    /// Reset the slot once its request has been answered
    pub fn clear(&mut self) {
        self.event_type = EventType::Unset;
        self.amount = 0;
        self.account_from = None;
        self.account_to = None;
        self.completion = None;
    }
}

impl fmt::Debug for AccountEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountEvent")
            .field("sequence", &self.sequence)
            .field("event_type", &self.event_type)
            .field("amount", &self.amount)
            .field("account_from", &self.account_from)
            .field("account_to", &self.account_to)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse_roundtrip() {
        let id = AccountId::generate();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_reply_accessors() {
        let id = AccountId::generate();
        assert_eq!(Reply::Created(id).into_created().unwrap(), id);
        assert_eq!(Reply::Balance(42).into_balance().unwrap(), 42);
        assert!(Reply::Transferred.into_transferred().is_ok());

        let err = Reply::Transferred.into_balance().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_event_clear_drops_completion() {
        let mut event = AccountEvent::default();
        event.populate(EventType::Create, 10, None, None, Box::new(|_| {}));
        assert!(event.completion.is_some());

        event.clear();
        assert_eq!(event.event_type, EventType::Unset);
        assert_eq!(event.amount, 0);
        assert!(event.completion.is_none());
    }
}
