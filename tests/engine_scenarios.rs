// End-to-end engine scenarios: quotes in, order commands out, exec reports
// reconciled back into position state.

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use tick_taker::config::{Config, MarketMode};
use tick_taker::domain::{
    EngineEvent, ExecReport, ExecStatus, OrderCommand, Quote, Side,
};
use tick_taker::engine::Engine;
use tick_taker::gateway;
use tick_taker::order::OrderStatus;

fn test_config() -> Config {
    Config {
        symbol: "SNAP".into(),
        max_quantity: 500,
        lot: 100,
        upper_threshold: 0.8,
        lower_threshold: 0.2,
        tick_px: 1,
        feed_mode: MarketMode::Mock,
        venue_mode: MarketMode::Mock,
        data_ws_url: String::new(),
        trading_rest_url: String::new(),
        trading_ws_url: String::new(),
        metrics_port: 0,
        record_file: None,
        shutdown_grace_ms: 200,
    }
}

fn quote(bid_px: i64, bid_size: i64, ask_px: i64, ask_size: i64) -> Quote {
    Quote {
        bid_px,
        bid_size,
        ask_px,
        ask_size,
        ts_ns: 0,
    }
}

fn exec(client_id: &str, status: ExecStatus, filled: i64, remaining: i64) -> ExecReport {
    ExecReport {
        client_id: client_id.to_string(),
        broker_id: Some("B-1".into()),
        symbol: "SNAP".into(),
        status,
        filled_qty: filled,
        remaining_qty: remaining,
        ts_ns: 0,
    }
}

fn engine_with_cmds() -> (Engine, mpsc::Receiver<OrderCommand>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    (Engine::new(&test_config(), cmd_tx, None), cmd_rx)
}

#[tokio::test]
async fn wide_spread_stream_submits_nothing() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    for i in 0..50 {
        // Two ticks wide with heavy imbalance throughout, levels moving.
        engine.on_quote(quote(10_00 + i, 900, 10_02 + i, 10)).await;
    }
    assert!(cmd_rx.try_recv().is_err());
    assert_eq!(engine.position().pending(), 0);
}

#[tokio::test]
async fn heavy_bid_on_one_tick_spread_buys_at_the_bid() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;

    let cmd = cmd_rx.try_recv().expect("expected a place command");
    match cmd {
        OrderCommand::Place {
            side,
            qty,
            limit_px,
            symbol,
            ..
        } => {
            assert_eq!(side, Side::Buy);
            assert_eq!(qty, 100);
            assert_eq!(limit_px, 10_00);
            assert_eq!(symbol, "SNAP");
        }
        other => panic!("expected Place, got {other:?}"),
    }
    assert_eq!(engine.position().pending(), 100);
    assert_eq!(engine.order().unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn full_fill_moves_pending_into_held() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };

    engine.on_exec(exec(&client_id, ExecStatus::Ack, 0, 100)).await;
    assert_eq!(engine.order().unwrap().status, OrderStatus::Open);

    engine.on_exec(exec(&client_id, ExecStatus::Filled, 100, 0)).await;
    assert_eq!(engine.position().held(), 100);
    assert_eq!(engine.position().pending(), 0);
    assert!(engine.order().is_none());
}

#[tokio::test]
async fn cancel_confirmation_books_its_partial_fill() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };
    engine.on_exec(exec(&client_id, ExecStatus::Ack, 0, 100)).await;

    // No PartialFill arrived for this order; the cancel confirmation
    // itself carries the cumulative fill and that total is booked.
    engine
        .on_exec(exec(&client_id, ExecStatus::Cancelled, 40, 0))
        .await;
    assert_eq!(engine.position().held(), 40);
    assert_eq!(engine.position().pending(), 0);
    assert!(engine.order().is_none());
    // Only the remaining 460 of the 500 cap is open for new orders.
    assert_eq!(engine.position().remaining(Side::Buy), 460);
}

#[tokio::test]
async fn resting_order_is_cancelled_when_the_level_moves() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };
    engine.on_exec(exec(&client_id, ExecStatus::Ack, 0, 100)).await;

    // Best bid moved up past our resting 10.00.
    let moved = quote(10_01, 500, 10_02, 500);
    engine.on_quote(moved).await;
    assert!(matches!(
        cmd_rx.try_recv(),
        Ok(OrderCommand::Cancel { .. })
    ));
    // Further quotes do not repeat the cancel.
    engine.on_quote(moved).await;
    engine.on_quote(quote(10_02, 500, 10_03, 500)).await;
    assert!(cmd_rx.try_recv().is_err());

    engine.on_exec(exec(&client_id, ExecStatus::Cancelled, 0, 0)).await;
    assert_eq!(engine.position().pending(), 0);
    assert!(engine.order().is_none());
}

#[tokio::test]
async fn new_signals_are_ignored_while_an_order_is_outstanding() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    assert!(cmd_rx.try_recv().is_ok());

    // Another screaming signal at a new level; the order is still live, so
    // nothing but a stale-order cancel may come out.
    engine.on_quote(quote(10_02, 950, 10_03, 50)).await;
    while let Ok(cmd) = cmd_rx.try_recv() {
        assert!(
            !matches!(cmd, OrderCommand::Place { .. }),
            "second order submitted while one was outstanding"
        );
    }
    assert_eq!(engine.position().pending(), 100);
}

#[tokio::test]
async fn reject_rolls_back_and_trading_resumes() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };

    engine
        .on_exec(exec(&client_id, ExecStatus::Rejected("insufficient buying power".into()), 0, 0))
        .await;
    assert_eq!(engine.position().held(), 0);
    assert_eq!(engine.position().pending(), 0);
    assert!(engine.order().is_none());

    // Next level change can trade again.
    engine.on_quote(quote(10_01, 900, 10_02, 100)).await;
    assert!(matches!(cmd_rx.try_recv(), Ok(OrderCommand::Place { .. })));
}

#[tokio::test]
async fn position_cap_limits_submitted_quantity() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    // Fill 450 long via four level changes (100 + 100 + 100 + 100), then 50.
    let mut px = 10_00;
    for _ in 0..4 {
        engine.on_quote(quote(px, 900, px + 1, 100)).await;
        let OrderCommand::Place { client_id, qty, .. } = cmd_rx.try_recv().unwrap() else {
            panic!("expected Place");
        };
        assert_eq!(qty, 100);
        engine.on_exec(exec(&client_id, ExecStatus::Filled, qty, 0)).await;
        px += 2;
    }
    assert_eq!(engine.position().held(), 400);

    // Only 100 of room left; a full signal still only takes what fits.
    engine.on_quote(quote(px, 900, px + 1, 100)).await;
    let OrderCommand::Place { client_id, qty, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };
    assert_eq!(qty, 100);
    engine.on_exec(exec(&client_id, ExecStatus::Filled, qty, 0)).await;
    assert_eq!(engine.position().held(), 500);

    // Cap reached: further buy signals are skipped entirely.
    px += 2;
    engine.on_quote(quote(px, 900, px + 1, 100)).await;
    assert!(cmd_rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_quotes_are_dropped() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    // Crossed book with an otherwise perfect buy setup.
    engine.on_quote(quote(10_01, 900, 10_00, 100)).await;
    engine.on_quote(quote(10_00, 0, 10_01, 0)).await;
    assert!(cmd_rx.try_recv().is_err());
}

#[tokio::test]
async fn feed_reset_clears_level_memory() {
    let (mut engine, mut cmd_rx) = engine_with_cmds();
    let (evt_tx, evt_rx) = mpsc::channel(64);
    let q = quote(10_00, 900, 10_01, 100);

    evt_tx.send(EngineEvent::Quote(q)).await.unwrap();
    // Same level again would normally not re-fire...
    evt_tx.send(EngineEvent::FeedReset).await.unwrap();
    evt_tx.send(EngineEvent::Quote(q)).await.unwrap();
    evt_tx.send(EngineEvent::Shutdown).await.unwrap();
    drop(evt_tx);

    // First quote trades; the order is outstanding after that, so the
    // post-reset quote exercises only the memory reset path. Use a fill to
    // free the slot in between instead.
    engine.on_quote(q).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };
    engine.on_exec(exec(&client_id, ExecStatus::Filled, 100, 0)).await;

    // Without a reset the same level is quiet.
    engine.on_quote(q).await;
    assert!(cmd_rx.try_recv().is_err());

    // Drain the prepared event stream through run(): reset then same level
    // fires again (one more Place shows up on the command channel).
    engine.run(evt_rx).await;
    let mut places = 0;
    while let Ok(cmd) = cmd_rx.try_recv() {
        if matches!(cmd, OrderCommand::Place { .. }) {
            places += 1;
        }
    }
    assert_eq!(places, 1);
}

#[tokio::test]
async fn double_shutdown_cancels_once_and_exits_within_grace() {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    let (evt_tx, evt_rx) = mpsc::channel(64);
    let mut engine = Engine::new(&test_config(), cmd_tx, None);

    // Leave an acked order resting, then shut down twice in a row.
    engine.on_quote(quote(10_00, 900, 10_01, 100)).await;
    let OrderCommand::Place { client_id, .. } = cmd_rx.try_recv().unwrap() else {
        panic!("expected Place");
    };
    engine.on_exec(exec(&client_id, ExecStatus::Ack, 0, 100)).await;

    evt_tx.send(EngineEvent::Shutdown).await.unwrap();
    evt_tx.send(EngineEvent::Shutdown).await.unwrap();

    let done = tokio::spawn(engine.run(evt_rx));
    timeout(Duration::from_secs(1), done)
        .await
        .expect("engine did not stop within the grace period")
        .unwrap();

    let mut cancels = 0;
    while let Ok(cmd) = cmd_rx.try_recv() {
        if matches!(cmd, OrderCommand::Cancel { .. }) {
            cancels += 1;
        }
    }
    assert_eq!(cancels, 1);
}

#[tokio::test]
async fn shutdown_with_no_order_exits_immediately() {
    let (cmd_tx, _cmd_rx) = mpsc::channel(16);
    let (evt_tx, evt_rx) = mpsc::channel(16);
    let engine = Engine::new(&test_config(), cmd_tx, None);
    evt_tx.send(EngineEvent::Shutdown).await.unwrap();
    timeout(Duration::from_millis(100), engine.run(evt_rx))
        .await
        .expect("engine did not exit immediately");
}

#[tokio::test]
async fn no_submissions_after_shutdown_begins() {
    let (engine, mut cmd_rx) = engine_with_cmds();

    // A perfect buy setup is already queued behind the shutdown signal; the
    // engine must exit without acting on it.
    let (evt_tx, evt_rx) = mpsc::channel(16);
    evt_tx.send(EngineEvent::Shutdown).await.unwrap();
    evt_tx
        .send(EngineEvent::Quote(quote(10_00, 900, 10_01, 100)))
        .await
        .unwrap();
    drop(evt_tx);
    engine.run(evt_rx).await;
    assert!(cmd_rx.try_recv().is_err());
}

#[tokio::test]
async fn mock_gateway_acks_then_fills() {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (evt_tx, mut evt_rx) = mpsc::channel(16);
    tokio::spawn(gateway::run_mock(cmd_rx, evt_tx, 10));

    cmd_tx
        .send(OrderCommand::Place {
            client_id: "CL-1".into(),
            symbol: "SNAP".into(),
            side: Side::Buy,
            qty: 100,
            limit_px: 10_00,
        })
        .await
        .unwrap();

    let ack = timeout(Duration::from_millis(500), evt_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let EngineEvent::Exec(er) = ack else {
        panic!("expected exec event");
    };
    assert_eq!(er.status, ExecStatus::Ack);
    assert!(er.broker_id.is_some());

    let fill = timeout(Duration::from_millis(500), evt_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let EngineEvent::Exec(er) = fill else {
        panic!("expected exec event");
    };
    assert_eq!(er.status, ExecStatus::Filled);
    assert_eq!(er.filled_qty, 100);
}

#[tokio::test]
async fn mock_gateway_cancel_beats_the_fill() {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (evt_tx, mut evt_rx) = mpsc::channel(16);
    tokio::spawn(gateway::run_mock(cmd_rx, evt_tx, 5_000));

    cmd_tx
        .send(OrderCommand::Place {
            client_id: "CL-1".into(),
            symbol: "SNAP".into(),
            side: Side::Sell,
            qty: 100,
            limit_px: 10_01,
        })
        .await
        .unwrap();
    cmd_tx
        .send(OrderCommand::Cancel {
            client_id: "CL-1".into(),
            symbol: "SNAP".into(),
            broker_id: None,
        })
        .await
        .unwrap();

    let mut statuses = Vec::new();
    for _ in 0..2 {
        let ev = timeout(Duration::from_millis(500), evt_rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let EngineEvent::Exec(er) = ev {
            statuses.push(er.status);
        }
    }
    assert_eq!(statuses, vec![ExecStatus::Ack, ExecStatus::Cancelled]);
}

#[tokio::test]
async fn mock_gateway_reports_unknown_cancels_with_the_symbol() {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (evt_tx, mut evt_rx) = mpsc::channel(16);
    tokio::spawn(gateway::run_mock(cmd_rx, evt_tx, 10));

    // No order is resting; the venue still confirms the cancel, and the
    // report identifies which symbol it was for.
    cmd_tx
        .send(OrderCommand::Cancel {
            client_id: "CL-9".into(),
            symbol: "SNAP".into(),
            broker_id: None,
        })
        .await
        .unwrap();

    let ev = timeout(Duration::from_millis(500), evt_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let EngineEvent::Exec(er) = ev else {
        panic!("expected exec event");
    };
    assert_eq!(er.status, ExecStatus::Cancelled);
    assert_eq!(er.symbol, "SNAP");
}
