//! End-to-end tests through the producer façade
//!
//! Every test starts a real engine with its own consumer thread.

use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use transfer_core::{
    AccountId, AccountOperations, EngineConfig, Error, Rejection, TransferEngine,
    WaitStrategyKind,
};

fn engine(capacity: usize, wait_strategy: WaitStrategyKind) -> TransferEngine {
    TransferEngine::start(&EngineConfig {
        ring_capacity: capacity,
        wait_strategy,
        processor_thread_name: "engine-tests".to_string(),
    })
    .unwrap()
}

/// Blocking helpers over the callback API
fn create(ops: &AccountOperations, amount: i64) -> Result<AccountId, Error> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    ops.submit_create(
        amount,
        move |id| tx.send(Ok(id)).unwrap(),
        move |e| err_tx.send(Err(e)).unwrap(),
    )?;
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn info(ops: &AccountOperations, account: AccountId) -> Result<i64, Error> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    ops.submit_info(
        account,
        move |amount| tx.send(Ok(amount)).unwrap(),
        move |e| err_tx.send(Err(e)).unwrap(),
    )?;
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn transfer(ops: &AccountOperations, from: AccountId, to: AccountId, amount: i64) -> Result<(), Error> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    ops.submit_transfer(
        from,
        to,
        amount,
        move || tx.send(Ok(())).unwrap(),
        move |e| err_tx.send(Err(e)).unwrap(),
    )?;
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn test_transfer_between_two_accounts() {
    let engine = engine(256, WaitStrategyKind::BusySpin);
    let ops = engine.operations();

    let a = create(&ops, 1000).unwrap();
    let b = create(&ops, 1000).unwrap();
    transfer(&ops, a, b, 100).unwrap();

    assert_eq!(info(&ops, a).unwrap(), 900);
    assert_eq!(info(&ops, b).unwrap(), 1100);
}

#[test]
fn test_transfer_to_missing_account_leaves_source_untouched() {
    let engine = engine(256, WaitStrategyKind::BusySpin);
    let ops = engine.operations();

    let a = create(&ops, 1000).unwrap();
    let missing = AccountId::generate();
    let err = transfer(&ops, a, missing, 100_000).unwrap_err();

    assert!(err.is_invalid_argument());
    assert_eq!(err.rejection(), Some(&Rejection::ToAccountNotFound(missing)));
    assert_eq!(info(&ops, a).unwrap(), 1000);
}

#[test]
fn test_rejections() {
    let engine = engine(64, WaitStrategyKind::Yielding);
    let ops = engine.operations();

    assert_eq!(
        create(&ops, -1).unwrap_err().rejection(),
        Some(&Rejection::NegativeAmount(-1))
    );

    let a = create(&ops, 50).unwrap();
    let b = create(&ops, 0).unwrap();
    let ghost = AccountId::generate();

    assert_eq!(
        info(&ops, ghost).unwrap_err().rejection(),
        Some(&Rejection::AccountNotFound(ghost))
    );
    assert_eq!(
        transfer(&ops, ghost, a, 1).unwrap_err().rejection(),
        Some(&Rejection::FromAccountNotFound(ghost))
    );
    assert_eq!(
        transfer(&ops, a, b, -5).unwrap_err().rejection(),
        Some(&Rejection::NegativeAmount(-5))
    );
    assert_eq!(
        transfer(&ops, a, b, 51).unwrap_err().rejection(),
        Some(&Rejection::InsufficientFunds {
            balance: 50,
            requested: 51
        })
    );

    // Whole balance may move
    transfer(&ops, a, b, 50).unwrap();
    assert_eq!(info(&ops, a).unwrap(), 0);
    assert_eq!(info(&ops, b).unwrap(), 50);
}

#[test]
fn test_zero_and_self_transfers() {
    let engine = engine(16, WaitStrategyKind::Blocking);
    let ops = engine.operations();

    let a = create(&ops, 10).unwrap();
    let b = create(&ops, 10).unwrap();

    transfer(&ops, a, b, 0).unwrap();
    transfer(&ops, a, a, 7).unwrap();
    assert_eq!(info(&ops, a).unwrap(), 10);
    assert_eq!(info(&ops, b).unwrap(), 10);

    // Self transfer still needs the funds
    assert!(transfer(&ops, a, a, 11).is_err());
}

#[test]
fn test_overflowing_credit_is_internal_and_mutates_nothing() {
    let engine = engine(16, WaitStrategyKind::BusySpin);
    let ops = engine.operations();

    let rich = create(&ops, i64::MAX).unwrap();
    let other = create(&ops, 1).unwrap();

    let err = transfer(&ops, other, rich, 1).unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert_eq!(info(&ops, rich).unwrap(), i64::MAX);
    assert_eq!(info(&ops, other).unwrap(), 1);
}

#[test]
fn test_backpressure_does_not_lose_requests() {
    // Ring far smaller than the number of requests in flight
    let engine = engine(4, WaitStrategyKind::Yielding);
    let ops = engine.operations();
    let hub = create(&ops, 0).unwrap();

    let producers = 8;
    let per_producer = 200;
    let barrier = Arc::new(Barrier::new(producers));
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let ops = ops.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mine = create(&ops, per_producer as i64).unwrap();
                barrier.wait();
                let (tx, rx) = mpsc::channel();
                for _ in 0..per_producer {
                    let tx = tx.clone();
                    ops.submit_transfer(mine, hub, 1, move || tx.send(()).unwrap(), |e| {
                        panic!("transfer failed: {}", e)
                    })
                    .unwrap();
                }
                drop(tx);
                rx.iter().count()
            })
        })
        .collect();

    let acknowledged: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(acknowledged, producers * per_producer);
    assert_eq!(info(&ops, hub).unwrap(), (producers * per_producer) as i64);
}

#[test]
fn test_stop_drains_everything_submitted() {
    let mut engine = engine(8, WaitStrategyKind::BusySpin);
    let ops = engine.operations();
    let answered = Arc::new(Mutex::new(0usize));

    for amount in 0..100 {
        let ok = answered.clone();
        let err = answered.clone();
        ops.submit_create(
            amount,
            move |_| *ok.lock().unwrap() += 1,
            move |_| *err.lock().unwrap() += 1,
        )
        .unwrap();
    }

    engine.stop().unwrap();
    assert_eq!(*answered.lock().unwrap(), 100);

    let ledger = engine.into_ledger().unwrap();
    assert_eq!(ledger.len(), 100);
    assert_eq!(ledger.total(), (0..100).sum::<i64>() as i128);
}

#[test]
fn test_submit_after_stop_is_shutdown() {
    let mut engine = engine(8, WaitStrategyKind::BusySpin);
    let ops = engine.operations();
    engine.stop().unwrap();

    assert!(!ops.is_accepting());
    let result = ops.submit_create(1, |_| panic!("success"), |_| panic!("error"));
    assert!(matches!(result, Err(Error::Shutdown)));
}

#[test]
fn test_callbacks_run_on_processor_thread() {
    let engine = engine(8, WaitStrategyKind::BusySpin);
    let ops = engine.operations();
    let (tx, rx) = mpsc::channel();

    ops.submit_create(
        1,
        move |_| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        },
        |_| {},
    )
    .unwrap();

    assert_eq!(rx.recv().unwrap().as_deref(), Some("engine-tests"));
}

#[test]
fn test_follow_up_from_callback_goes_through_another_thread() {
    // Tiny ring so a synchronous resubmit from the consumer would wedge it
    let engine = engine(2, WaitStrategyKind::BusySpin);
    let ops = engine.operations();
    let (follow_tx, follow_rx) = mpsc::channel::<AccountId>();

    let worker = {
        let ops = ops.clone();
        thread::spawn(move || {
            follow_rx
                .iter()
                .map(|id| info(&ops, id).unwrap())
                .collect::<Vec<_>>()
        })
    };

    for amount in 0..10 {
        let follow_tx = follow_tx.clone();
        ops.submit_create(amount, move |id| follow_tx.send(id).unwrap(), |e| {
            panic!("create failed: {}", e)
        })
        .unwrap();
    }
    drop(follow_tx);

    assert_eq!(worker.join().unwrap(), (0..10).collect::<Vec<i64>>());
}

#[test]
fn test_panicking_callback_does_not_stall_engine() {
    let engine = engine(8, WaitStrategyKind::BusySpin);
    let ops = engine.operations();

    ops.submit_create(1, |_| panic!("callback blew up"), |_| {})
        .unwrap();
    let a = create(&ops, 5).unwrap();
    assert_eq!(info(&ops, a).unwrap(), 5);
}

#[test]
fn test_metrics_count_requests() {
    let mut engine = engine(16, WaitStrategyKind::BusySpin);
    let ops = engine.operations();

    let a = create(&ops, 5).unwrap();
    let _ = create(&ops, -5);
    let _ = info(&ops, a);
    engine.stop().unwrap();

    let metrics = engine.metrics();
    assert_eq!(metrics.requests_total.with_label_values(&["create"]).get(), 2);
    assert_eq!(metrics.rejections_total.with_label_values(&["create"]).get(), 1);
    assert_eq!(metrics.requests_total.with_label_values(&["info"]).get(), 1);
    assert_eq!(metrics.processed_sequence.get(), 2);
}

#[tokio::test]
async fn test_async_operations() {
    let engine = engine(64, WaitStrategyKind::Yielding);
    let ops = engine.operations();

    let a = ops.create(1000).await.unwrap();
    let b = ops.create(1000).await.unwrap();
    ops.transfer(a, b, 100).await.unwrap();

    assert_eq!(ops.info(a).await.unwrap(), 900);
    assert_eq!(ops.info(b).await.unwrap(), 1100);
    assert!(ops.transfer(a, b, 10_000).await.unwrap_err().is_invalid_argument());
}
