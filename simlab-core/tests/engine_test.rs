//! Integration tests for the run controller.
//!
//! Tests:
//! 1. Account arithmetic through a full run (commission, margin, round trips)
//! 2. Order lifecycle through the engine (OCO, brackets, idempotent cancel)
//! 3. Notification delivery timing
//! 4. Schedules: vectorized and incremental agree, retention does not change results
//! 5. Data errors, halted streams, stop requests and live feeds

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use simlab_core::clock::{ChannelFeed, HaltPolicy, StreamOptions, TieBreak, VecFeed};
use simlab_core::commission::{CommissionModel, CommissionProfile, ProfileBook};
use simlab_core::domain::{
    Bar, BracketRequest, NotificationKind, OrderId, OrderRequest, OrderSide, OrderStatus,
    StreamId, Timestamp,
};
use simlab_core::runtime::{
    Engine, EngineConfig, FundConfig, Indicator, Retention, RunMode, Schedule, Sma, Strategy,
    StrategyContext,
};
use simlab_core::EngineError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const S: StreamId = StreamId(0);

// ── Helpers ──────────────────────────────────────────────────────────

fn ts(day: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn bar(day: u32, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Bar {
    Bar::new(ts(day), o, h, l, c, dec!(1000))
}

fn flat(day: u32, price: Decimal) -> Bar {
    bar(day, price, price, price, price)
}

/// Deterministic zig-zag series with enough swings to cross moving averages.
fn zigzag(days: u32, seed: i64) -> Vec<Bar> {
    (0..days)
        .map(|i| {
            let c = Decimal::from(100 + ((i as i64 * 37 + seed) % 23) - 11);
            Bar::new(
                ts(1) + chrono::Duration::days(i as i64),
                c,
                c + dec!(2),
                c - dec!(2),
                c,
                dec!(1000),
            )
        })
        .collect()
}

struct Script<F>(F);

impl<F> Strategy for Script<F>
where
    F: FnMut(&mut StrategyContext<'_>) + Send,
{
    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) {
        (self.0)(ctx)
    }
}

fn script<F>(f: F) -> Script<F>
where
    F: FnMut(&mut StrategyContext<'_>) + Send,
{
    Script(f)
}

fn stock_engine(config: EngineConfig, rate: Decimal) -> Engine {
    let profiles = ProfileBook::new(CommissionModel::new(
        CommissionProfile::stock(rate),
        config.money,
    ));
    Engine::backtest(config, profiles)
}

fn single_stream(bars: Vec<Bar>, rate: Decimal) -> Engine {
    let mut engine = stock_engine(EngineConfig::new(dec!(10000)), rate);
    engine.add_stream(VecFeed::new(bars), StreamOptions::new("asset"));
    engine
}

// ── 1. Account arithmetic ────────────────────────────────────────────

#[test]
fn percentage_commission_buy_debits_notional_and_fee() {
    let bars = vec![flat(2, dec!(100)), flat(3, dec!(100)), flat(4, dec!(100))];
    let mut engine = single_stream(bars, dec!(0.001));
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(10)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();

    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].price, dec!(100));
    assert_eq!(report.fills[0].commission, dec!(1));
    // 10000 - 10 * 100 - 10 * 100 * 0.001
    assert_eq!(report.final_cash, dec!(8999.0));
    let position = report.position(S);
    assert_eq!(position.size, dec!(10));
    assert_eq!(position.price, dec!(100));
    assert_eq!(report.final_value, dec!(9999));
}

#[test]
fn margin_instrument_debits_margin_not_notional() {
    let config = EngineConfig::new(dec!(10000));
    let profiles = ProfileBook::new(CommissionModel::new(
        CommissionProfile::futures(Decimal::ZERO, dec!(50), Decimal::ONE),
        config.money,
    ));
    let mut engine = Engine::backtest(config, profiles);
    engine.add_stream(
        VecFeed::new(vec![flat(2, dec!(1000)), flat(3, dec!(1000))]),
        StreamOptions::new("future"),
    );
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(4)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();

    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.final_cash, dec!(9800));
    let position = report.position(S);
    assert_eq!(position.size, dec!(4));
    assert_eq!(position.margin_held, dec!(200));
}

#[test]
fn round_trip_at_same_price_costs_only_commission() {
    let bars = (2..=6).map(|d| flat(d, dec!(100))).collect();
    let mut engine = single_stream(bars, dec!(0.001));
    let mut strategy = script(|ctx| match ctx.tick() {
        0 => {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(10)));
        }
        2 => {
            let size = ctx.position(S).size;
            assert_eq!(size, dec!(10));
            ctx.submit_order(OrderRequest::market(S, OrderSide::Sell, size));
        }
        _ => {}
    });
    let report = engine.run(&mut strategy).unwrap();

    assert_eq!(report.fills.len(), 2);
    assert_eq!(report.final_cash, dec!(9998));
    assert_eq!(report.total_commission, dec!(2));
    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.gross_pnl, Decimal::ZERO);
    assert_eq!(trade.commission, dec!(2));
    assert_eq!(trade.net_pnl, dec!(-2));
    assert!(report.position(S).is_flat());
}

#[test]
fn equity_curve_has_one_point_per_tick() {
    let mut engine = single_stream(zigzag(20, 0), Decimal::ZERO);
    let report = engine.run(&mut script(|_| {})).unwrap();
    assert_eq!(report.ticks, 20);
    assert_eq!(report.equity.len(), 20);
    assert!(report.equity.iter().all(|p| p.value == dec!(10000)));
}

// ── 2. Order lifecycle ───────────────────────────────────────────────

#[test]
fn oco_sibling_canceled_on_the_fill_tick() {
    let bars = vec![
        flat(2, dec!(100)),
        bar(3, dec!(100), dec!(101), dec!(94), dec!(100)),
        flat(4, dec!(100)),
    ];
    let mut engine = single_stream(bars, Decimal::ZERO);
    let ids = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&ids);
    let mut strategy = script(move |ctx| {
        if ctx.tick() == 0 {
            let placed = ctx.submit_oco(vec![
                OrderRequest::limit(S, OrderSide::Buy, dec!(1), dec!(95)),
                OrderRequest::limit(S, OrderSide::Buy, dec!(1), dec!(50)),
            ]);
            captured.lock().unwrap().extend(placed);
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    let ids = ids.lock().unwrap().clone();

    let filled = report
        .notifications
        .iter()
        .find(|n| n.order_id == ids[0] && n.status == OrderStatus::Completed)
        .unwrap();
    assert_eq!(filled.fill().unwrap().price, dec!(95));
    let canceled = report
        .notifications
        .iter()
        .find(|n| n.order_id == ids[1] && n.status == OrderStatus::Canceled)
        .unwrap();
    assert!(canceled.timestamp <= ts(4));
    assert_eq!(canceled.timestamp, filled.timestamp);
}

#[test]
fn limit_buy_at_exact_low_fills() {
    let bars = vec![
        flat(2, dec!(100)),
        bar(3, dec!(100), dec!(101), dec!(95), dec!(100)),
    ];
    let mut engine = single_stream(bars, Decimal::ZERO);
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::limit(S, OrderSide::Buy, dec!(1), dec!(95)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].price, dec!(95));
}

#[test]
fn limit_buy_one_cent_below_low_does_not_fill() {
    let bars = vec![
        flat(2, dec!(100)),
        bar(3, dec!(100), dec!(101), dec!(95.01), dec!(100)),
    ];
    let mut engine = single_stream(bars, Decimal::ZERO);
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::limit(S, OrderSide::Buy, dec!(1), dec!(95)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    assert!(report.fills.is_empty());
}

#[test]
fn canceling_a_completed_order_is_a_no_op() {
    let bars = (2..=6).map(|d| flat(d, dec!(100))).collect();
    let mut engine = single_stream(bars, Decimal::ZERO);
    let placed = Arc::new(Mutex::new(None::<OrderId>));
    let slot = Arc::clone(&placed);
    let mut strategy = script(move |ctx| match ctx.tick() {
        0 => {
            let id = ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(1)));
            *slot.lock().unwrap() = Some(id);
        }
        2 | 3 => {
            if let Some(id) = *slot.lock().unwrap() {
                ctx.cancel_order(id);
                ctx.cancel_order(id);
            }
        }
        _ => {}
    });
    let report = engine.run(&mut strategy).unwrap();
    let id = placed.lock().unwrap().unwrap();

    let statuses: Vec<OrderStatus> = report
        .notifications
        .iter()
        .filter(|n| n.order_id == id)
        .map(|n| n.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Submitted,
            OrderStatus::Accepted,
            OrderStatus::Completed
        ]
    );
}

#[test]
fn bracket_target_fill_cancels_stop() {
    let bars = vec![
        flat(2, dec!(100)),
        flat(3, dec!(100)),
        flat(4, dec!(100)),
        bar(5, dec!(105), dec!(111), dec!(104), dec!(110)),
        flat(8, dec!(110)),
    ];
    let mut engine = single_stream(bars, Decimal::ZERO);
    let ids = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&ids);
    let mut strategy = script(move |ctx| {
        if ctx.tick() == 0 {
            let placed = ctx.submit_bracket(BracketRequest {
                entry: OrderRequest::market(S, OrderSide::Buy, dec!(5)),
                stop_price: dec!(90),
                target_price: Some(dec!(110)),
            });
            *slot.lock().unwrap() = Some(placed);
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    let ids = ids.lock().unwrap().clone().unwrap();

    assert_eq!(report.fills.len(), 2);
    assert_eq!(report.fills[0].order_id, ids.entry);
    assert_eq!(report.fills[1].order_id, ids.target.unwrap());
    assert_eq!(report.fills[1].price, dec!(110));
    assert!(report
        .notifications
        .iter()
        .any(|n| n.order_id == ids.stop && n.status == OrderStatus::Canceled));
    assert!(report.position(S).is_flat());
    assert_eq!(report.final_cash, dec!(10050));
}

// ── 3. Notification delivery ─────────────────────────────────────────

#[test]
fn notifications_arrive_on_the_next_callback() {
    let bars = (2..=5).map(|d| flat(d, dec!(100))).collect();
    let mut engine = single_stream(bars, Decimal::ZERO);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut strategy = script(move |ctx| {
        let kinds: Vec<OrderStatus> = ctx.notifications().iter().map(|n| n.status).collect();
        log.lock().unwrap().push(kinds);
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(1)));
        }
    });
    engine.run(&mut strategy).unwrap();
    let seen = seen.lock().unwrap();

    assert!(seen[0].is_empty());
    assert_eq!(seen[1], vec![OrderStatus::Submitted, OrderStatus::Accepted]);
    assert_eq!(seen[2], vec![OrderStatus::Completed]);
    assert!(seen[3].is_empty());
}

#[test]
fn fill_notification_carries_fill_details() {
    let bars = (2..=4).map(|d| flat(d, dec!(100))).collect();
    let mut engine = single_stream(bars, dec!(0.001));
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(3)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    let completed = report
        .notifications
        .iter()
        .find_map(|n| match &n.kind {
            NotificationKind::Completed { fill } => Some(fill.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed.size, dec!(3));
    assert_eq!(completed.commission, dec!(0.3));
}

// ── 4. Schedules ─────────────────────────────────────────────────────

struct Cross;

impl Strategy for Cross {
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Sma::new(3)), Box::new(Sma::new(5))]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) {
        for index in 0..ctx.stream_count() {
            let stream = StreamId(index);
            if !ctx.open_orders(stream).is_empty() {
                continue;
            }
            let (Some(fast), Some(slow)) =
                (ctx.indicator(stream, "sma_3"), ctx.indicator(stream, "sma_5"))
            else {
                continue;
            };
            let size = ctx.position(stream).size;
            if fast > slow && size.is_zero() {
                ctx.submit_order(OrderRequest::market(stream, OrderSide::Buy, dec!(10)));
            } else if fast < slow && size > Decimal::ZERO {
                ctx.submit_order(OrderRequest::market(stream, OrderSide::Sell, size));
            }
        }
    }
}

fn cross_run(schedule: Schedule, retention: Retention) -> simlab_core::RunReport {
    let config = EngineConfig {
        schedule,
        retention,
        tie_break: TieBreak::Name,
        ..EngineConfig::new(dec!(10000))
    };
    let mut engine = stock_engine(config, dec!(0.001));
    engine.add_stream(VecFeed::new(zigzag(80, 3)), StreamOptions::new("b"));
    let mut sparse = zigzag(80, 11);
    sparse.retain(|b| b.timestamp.ordinal() % 3 != 0);
    engine.add_stream(VecFeed::new(sparse), StreamOptions::new("a").required());
    engine.run(&mut Cross).unwrap()
}

#[test]
fn vectorized_and_incremental_runs_agree() {
    let vectorized = cross_run(Schedule::Vectorized, Retention::Full);
    let incremental = cross_run(Schedule::Incremental, Retention::Full);

    assert_eq!(vectorized.schedule, Schedule::Vectorized);
    assert_eq!(incremental.schedule, Schedule::Incremental);
    assert!(!vectorized.fills.is_empty());
    assert_eq!(vectorized.fingerprint, incremental.fingerprint);
    assert_eq!(vectorized.equity, incremental.equity);
    assert_eq!(vectorized.notifications, incremental.notifications);
}

#[test]
fn minimal_retention_does_not_change_results() {
    let full = cross_run(Schedule::Incremental, Retention::Full);
    let minimal = cross_run(Schedule::Incremental, Retention::Minimal);
    assert_eq!(full.fingerprint, minimal.fingerprint);
    assert!(full.full_history);
    assert!(!minimal.full_history);
}

#[test]
fn vectorized_request_falls_back_when_retention_is_bounded() {
    let report = cross_run(Schedule::Vectorized, Retention::Window(10));
    assert_eq!(report.schedule, Schedule::Incremental);
}

#[test]
fn identical_runs_are_identical() {
    let a = cross_run(Schedule::Auto, Retention::Full);
    let b = cross_run(Schedule::Auto, Retention::Full);
    assert_eq!(a.schedule, Schedule::Vectorized);
    assert_eq!(a, b);
}

#[test]
fn required_stream_is_forward_filled() {
    let mut engine = stock_engine(EngineConfig::new(dec!(10000)), Decimal::ZERO);
    engine.add_stream(
        VecFeed::new(vec![flat(2, dec!(10)), flat(3, dec!(11)), flat(4, dec!(12))]),
        StreamOptions::new("dense"),
    );
    engine.add_stream(
        VecFeed::new(vec![flat(2, dec!(50))]),
        StreamOptions::new("sparse").required(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut strategy = script(move |ctx| {
        let sparse = StreamId(1);
        let b = ctx.bar(sparse).cloned().unwrap();
        log.lock()
            .unwrap()
            .push((ctx.advanced(sparse), b.synthetic, b.close, ctx.bar_count(sparse)));
    });
    engine.run(&mut strategy).unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], (true, false, dec!(50), 1));
    assert_eq!(seen[2], (true, true, dec!(50), 3));
}

// ── 5. Errors, halts, stop, live ─────────────────────────────────────

fn counting() -> (Arc<AtomicUsize>, impl Strategy) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (
        count,
        script(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

fn out_of_order_engine(schedule: Schedule) -> Engine {
    let config = EngineConfig {
        schedule,
        ..EngineConfig::new(dec!(10000))
    };
    let mut engine = stock_engine(config, Decimal::ZERO);
    engine.add_stream(
        VecFeed::new(vec![flat(3, dec!(10)), flat(2, dec!(10))]),
        StreamOptions::new("asset").required(),
    );
    engine
}

#[test]
fn vectorized_data_error_aborts_before_any_callback() {
    let mut engine = out_of_order_engine(Schedule::Auto);
    let (count, mut strategy) = counting();
    let result = engine.run(&mut strategy);
    assert!(matches!(result, Err(EngineError::Data(_))));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn incremental_data_error_surfaces_mid_run() {
    let mut engine = out_of_order_engine(Schedule::Incremental);
    let (count, mut strategy) = counting();
    let result = engine.run(&mut strategy);
    assert!(matches!(result, Err(EngineError::Data(_))));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn optional_stream_error_halts_only_that_stream() {
    let config = EngineConfig {
        halt_policy: HaltPolicy::Continue,
        ..EngineConfig::new(dec!(10000))
    };
    let mut engine = stock_engine(config, Decimal::ZERO);
    engine.add_stream(
        VecFeed::new((2..=6).map(|d| flat(d, dec!(10))).collect()),
        StreamOptions::new("good"),
    );
    let mut broken = bar(4, dec!(10), dec!(9), dec!(11), dec!(10));
    broken.volume = dec!(5);
    engine.add_stream(
        VecFeed::new(vec![flat(2, dec!(20)), flat(3, dec!(20)), broken]),
        StreamOptions::new("bad"),
    );
    let report = engine.run(&mut script(|_| {})).unwrap();
    assert_eq!(report.ticks, 5);
    assert_eq!(report.halted_streams.len(), 1);
    assert_eq!(report.halted_streams[0].name, "bad");
}

#[test]
fn strategy_stop_finishes_current_tick() {
    let mut engine = single_stream(zigzag(30, 0), Decimal::ZERO);
    let mut strategy = script(|ctx| {
        if ctx.tick() == 2 {
            ctx.stop_run();
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    assert_eq!(report.ticks, 3);
    assert!(report.stopped_early);
}

#[test]
fn duplicate_indicator_names_are_rejected() {
    struct Twice;
    impl Strategy for Twice {
        fn indicators(&self) -> Vec<Box<dyn Indicator>> {
            vec![Box::new(Sma::new(3)), Box::new(Sma::new(3))]
        }
        fn on_tick(&mut self, _ctx: &mut StrategyContext<'_>) {}
    }
    let mut engine = single_stream(zigzag(5, 0), Decimal::ZERO);
    assert!(matches!(
        engine.run(&mut Twice),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn fund_value_is_unchanged_by_deposits() {
    let config = EngineConfig {
        fund: Some(FundConfig::default()),
        ..EngineConfig::new(dec!(10000))
    };
    let mut engine = stock_engine(config, Decimal::ZERO);
    engine.add_stream(
        VecFeed::new((2..=5).map(|d| flat(d, dec!(10))).collect()),
        StreamOptions::new("asset"),
    );
    let mut strategy = script(|ctx| {
        if ctx.tick() == 1 {
            ctx.deposit(dec!(5000));
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    assert_eq!(report.final_cash, dec!(15000));
    assert_eq!(report.final_fund_value, Some(dec!(100)));
}

fn live_config() -> EngineConfig {
    EngineConfig {
        mode: RunMode::Live,
        poll_interval: Duration::from_millis(5),
        ..EngineConfig::new(dec!(10000))
    }
}

#[test]
fn live_run_consumes_channel_until_disconnect() {
    let (tx, feed) = ChannelFeed::channel();
    let mut engine = stock_engine(live_config(), Decimal::ZERO);
    engine.add_stream(feed, StreamOptions::new("live"));
    let producer = std::thread::spawn(move || {
        for day in 2..=6 {
            tx.send(flat(day, dec!(100))).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
    });
    let mut strategy = script(|ctx| {
        if ctx.tick() == 0 {
            ctx.submit_order(OrderRequest::market(S, OrderSide::Buy, dec!(1)));
        }
    });
    let report = engine.run(&mut strategy).unwrap();
    producer.join().unwrap();

    assert_eq!(report.schedule, Schedule::Incremental);
    assert_eq!(report.ticks, 5);
    assert_eq!(report.fills.len(), 1);
}

#[test]
fn live_run_times_out_without_data() {
    let (_tx, feed) = ChannelFeed::channel();
    let config = EngineConfig {
        live_bar_timeout: Some(Duration::from_millis(30)),
        ..live_config()
    };
    let mut engine = stock_engine(config, Decimal::ZERO);
    engine.add_stream(feed, StreamOptions::new("live"));
    let result = engine.run(&mut script(|_| {}));
    assert!(matches!(result, Err(EngineError::Timeout(_))));
}

#[test]
fn stop_handle_ends_a_waiting_live_run() {
    let (_tx, feed) = ChannelFeed::channel();
    let mut engine = stock_engine(live_config(), Decimal::ZERO);
    engine.add_stream(feed, StreamOptions::new("live"));
    let stop = engine.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        stop.stop();
    });
    let report = engine.run(&mut script(|_| {})).unwrap();
    stopper.join().unwrap();
    assert!(report.stopped_early);
    assert_eq!(report.ticks, 0);
}
