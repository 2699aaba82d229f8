//! Transfer Core
//!
//! In-memory account ledger behind a lock-free ring buffer.
//!
//! # Architecture
//!
//! - **Multi-producer ring**: any thread claims a slot with a CAS, fills it
//!   and publishes it; a full ring blocks the producer
//! - **Single consumer**: one thread applies every request to the ledger in
//!   sequence order, so the ledger itself needs no locking
//! - **Callbacks**: each request carries one completion, run on the consumer
//!   thread with either the reply or the error
//!
//! # Invariants
//!
//! - Money conservation: transfers never change the sum of balances
//! - No negative balances
//! - Every published request gets exactly one callback invocation
//! - Requests are applied in claim order

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod metrics;
pub mod operations;
#[allow(unsafe_code)]
pub mod processor;
#[allow(unsafe_code)]
pub mod ring;
pub mod sequence;
pub mod types;
pub mod wait;

// Re-exports
pub use config::{Config, EngineConfig, ServerConfig};
pub use engine::TransferEngine;
pub use error::{Error, Rejection, Result};
pub use handler::{AccountEventHandler, EventHandler};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use operations::AccountOperations;
pub use processor::BatchEventProcessor;
pub use ring::{RingBuffer, Sequencer};
pub use types::{AccountEvent, AccountId, Completion, EventType, Reply};
pub use wait::{WaitStrategy, WaitStrategyKind};
