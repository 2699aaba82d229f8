//! Engine lifecycle
//!
//! Owns the ring and the consumer thread. `start` wires ring, handler and
//! processor together; `stop` refuses new claims, lets the consumer drain
//! everything already claimed and joins it.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::handler::{panic_message, AccountEventHandler};
use crate::ledger::Ledger;
use crate::metrics::Metrics;
use crate::operations::AccountOperations;
use crate::processor::{halt, BatchEventProcessor};
use crate::ring::RingBuffer;
use crate::types::AccountEvent;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Running transfer engine
pub struct TransferEngine {
    ring: Arc<RingBuffer<AccountEvent>>,
    alerted: Arc<AtomicBool>,
    processor: Option<JoinHandle<AccountEventHandler>>,
    metrics: Metrics,
    final_ledger: Option<Ledger>,
}

impl TransferEngine {
    /// Start with an empty ledger
    pub fn start(config: &EngineConfig) -> Result<Self> {
        Self::start_with_ledger(config, Ledger::new())
    }

    /// Start on top of existing balances
    pub fn start_with_ledger(config: &EngineConfig, ledger: Ledger) -> Result<Self> {
        let ring = Arc::new(RingBuffer::new(
            config.ring_capacity,
            config.wait_strategy.build(),
        )?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Internal(format!("Failed to register metrics: {}", e)))?;

        let handler = AccountEventHandler::with_ledger(ledger).with_metrics(metrics.clone());
        let processor =
            BatchEventProcessor::new(ring.clone(), handler).with_metrics(metrics.clone());
        let alerted = processor.alert_flag();
        let handle = processor.spawn(&config.processor_thread_name)?;

        tracing::info!(
            capacity = config.ring_capacity,
            wait_strategy = %config.wait_strategy,
            thread = %config.processor_thread_name,
            "Transfer engine started"
        );

        Ok(Self {
            ring,
            alerted,
            processor: Some(handle),
            metrics,
            final_ledger: None,
        })
    }

    /// Producer handle; clone freely across threads
    pub fn operations(&self) -> AccountOperations {
        AccountOperations::new(self.ring.clone())
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Whether the consumer thread is still owned by this engine
    pub fn is_running(&self) -> bool {
        self.processor.is_some()
    }

    /// Stop accepting requests, drain, and join the consumer.
    ///
    /// Every request claimed before this call still gets its callback.
    /// Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.processor.take() else {
            return Ok(());
        };

        tracing::info!(cursor = self.ring.sequencer().cursor(), "Stopping transfer engine");
        halt(&self.ring, &self.alerted);

        let handler = handle.join().map_err(|payload| {
            Error::Internal(format!(
                "Processor thread panicked: {}",
                panic_message(payload.as_ref())
            ))
        })?;

        let ledger = handler.into_ledger();
        tracing::info!(
            accounts = ledger.len(),
            processed = self.ring.sequencer().consumer_cursor() + 1,
            "Transfer engine stopped"
        );
        self.final_ledger = Some(ledger);
        Ok(())
    }

    /// Stop and hand back the final balances
    pub fn into_ledger(mut self) -> Result<Ledger> {
        self.stop()?;
        self.final_ledger
            .take()
            .ok_or_else(|| Error::Internal("Ledger already taken".to_string()))
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "Failed to stop transfer engine");
        }
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("ring", &self.ring)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;
    use crate::wait::WaitStrategyKind;

    fn config() -> EngineConfig {
        EngineConfig {
            ring_capacity: 16,
            wait_strategy: WaitStrategyKind::Yielding,
            processor_thread_name: "engine-test".to_string(),
        }
    }

    #[test]
    fn test_rejects_bad_capacity() {
        let mut config = config();
        config.ring_capacity = 12;
        assert!(matches!(TransferEngine::start(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = TransferEngine::start(&config()).unwrap();
        assert!(engine.is_running());
        engine.stop().unwrap();
        engine.stop().unwrap();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_into_ledger_after_stop() {
        let mut engine = TransferEngine::start(&config()).unwrap();
        engine.stop().unwrap();
        let ledger = engine.into_ledger().unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_start_with_existing_balances() {
        let id = AccountId::generate();
        let mut ledger = Ledger::new();
        ledger.open(id, 77);

        let engine = TransferEngine::start_with_ledger(&config(), ledger).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        engine
            .operations()
            .submit_info(id, move |b| tx.send(b).unwrap(), |e| panic!("{}", e))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), 77);
        assert_eq!(engine.into_ledger().unwrap().balance(&id), Some(77));
    }
}
