//! Run-mode controller — drives the clock, the strategy and the venue.
//!
//! Per master tick, in order:
//! 1. append the tick's bars (and indicator values) to stream history
//! 2. strategy callback, with the notifications from the previous tick
//! 3. strategy cash flows
//! 4. venue: cancellations, submissions, matching, then submissions again
//!    for bracket children activated by this tick's fills
//! 5. settlement (mark-to-market, interest) for every stream that advanced
//! 6. equity snapshot, notification drain
//!
//! Vectorized runs collect every tick before the first callback and
//! precompute indicators over whole streams; they then replay the same tick
//! sequence through the same per-tick path, so results are identical to an
//! incremental run.

use super::config::{EngineConfig, RunMode, Schedule};
use super::indicator::{compute_warmup, precompute_indicators, Indicator};
use super::report::{fingerprint_fills, EquityPoint, HaltedStream, RunReport, StreamPosition};
use super::series::StreamHistory;
use super::stop::StopHandle;
use super::strategy::{CashFlow, Strategy, StrategyContext};
use crate::clock::{ClockEvent, ClockSynchronizer, DataFeed, MasterTick, StreamOptions};
use crate::commission::ProfileBook;
use crate::domain::{Bar, Fill, Notification, StreamId, Timestamp};
use crate::error::EngineError;
use crate::execution::{ExecutionContext, ExecutionVenue, MarketView, SimulatedVenue};
use crate::ledger::Ledger;
use crate::orders::OrderBook;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Engine<V: ExecutionVenue = SimulatedVenue> {
    config: EngineConfig,
    clock: ClockSynchronizer,
    venue: V,
    profiles: ProfileBook,
    stop: StopHandle,
}

impl Engine<SimulatedVenue> {
    /// Engine matching orders against bars with the configured execution
    /// settings.
    pub fn backtest(config: EngineConfig, profiles: ProfileBook) -> Self {
        let venue = SimulatedVenue::new(config.execution.clone());
        Self::with_venue(config, venue, profiles)
    }
}

/// Fixed for the whole run.
struct RunPlan {
    names: Vec<String>,
    indicators: Vec<Box<dyn Indicator>>,
    indicator_names: Vec<String>,
    vectorized: bool,
}

struct RunState {
    book: OrderBook,
    ledger: Ledger,
    histories: Vec<StreamHistory>,
    latest: Vec<Option<Bar>>,
    /// Notifications waiting for the next callback.
    inbox: Vec<Notification>,
    notifications: Vec<Notification>,
    fills: Vec<Fill>,
    equity: Vec<EquityPoint>,
    cash_flows: Vec<CashFlow>,
    ticks: u64,
    last_timestamp: Option<Timestamp>,
}

impl<V: ExecutionVenue> Engine<V> {
    pub fn with_venue(config: EngineConfig, venue: V, profiles: ProfileBook) -> Self {
        let clock = ClockSynchronizer::new(config.tie_break, config.halt_policy);
        Self {
            config,
            clock,
            venue,
            profiles,
            stop: StopHandle::new(),
        }
    }

    pub fn add_stream(&mut self, feed: impl DataFeed + 'static, options: StreamOptions) -> StreamId {
        self.clock.add_stream(Box::new(feed), options)
    }

    pub fn add_boxed_stream(&mut self, feed: Box<dyn DataFeed>, options: StreamOptions) -> StreamId {
        self.clock.add_stream(feed, options)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn into_venue(self) -> V {
        self.venue
    }

    /// Handle for stopping the run from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The schedule [`Engine::run`] will use.
    ///
    /// Vectorized runs need the whole history up front: every feed finite,
    /// no replay streams, full retention and a backtest.
    pub fn resolve_schedule(&self) -> Schedule {
        let eligible = self.config.mode == RunMode::Backtest
            && !self.clock.is_open_ended()
            && !self.clock.any_replay()
            && self.config.retention.is_full();
        match self.config.schedule {
            Schedule::Incremental => Schedule::Incremental,
            Schedule::Auto if eligible => Schedule::Vectorized,
            Schedule::Auto => Schedule::Incremental,
            Schedule::Vectorized if eligible => Schedule::Vectorized,
            Schedule::Vectorized => {
                warn!("vectorized schedule not possible for this setup, running incrementally");
                Schedule::Incremental
            }
        }
    }

    /// Run until every stream is exhausted or a stop is requested.
    pub fn run(&mut self, strategy: &mut dyn Strategy) -> Result<RunReport, EngineError> {
        self.config.validate().map_err(EngineError::Config)?;
        if self.clock.stream_count() == 0 {
            return Err(EngineError::Config("no data streams registered".into()));
        }

        let indicators = strategy.indicators();
        let indicator_names: Vec<String> =
            indicators.iter().map(|i| i.name().to_string()).collect();
        {
            let mut seen = BTreeSet::new();
            if let Some(dup) = indicator_names.iter().find(|n| !seen.insert(n.as_str())) {
                return Err(EngineError::Config(format!("duplicate indicator name '{dup}'")));
            }
        }

        let warmup = compute_warmup(&indicators).max(strategy.lookback());
        let schedule = self.resolve_schedule();
        let names = self.clock.stream_names();
        info!(?schedule, streams = names.len(), warmup, "run starting");

        let mut ledger = Ledger::new(self.config.initial_cash, self.config.money);
        if let Some(fund) = self.config.fund {
            ledger = ledger.with_fund(fund.start_value);
        }

        let (histories, collected) = match schedule {
            Schedule::Vectorized => {
                let ticks = self.collect_ticks()?;
                let mut per_stream: Vec<Vec<Bar>> = vec![Vec::new(); names.len()];
                for tick in &ticks {
                    for sb in &tick.bars {
                        per_stream[sb.stream.0].push(sb.bar.clone());
                    }
                }
                let values = precompute_indicators(&per_stream, &indicators);
                let histories = per_stream
                    .into_iter()
                    .zip(values)
                    .map(|(bars, values)| StreamHistory::preloaded(bars, values))
                    .collect();
                (histories, Some(ticks))
            }
            _ => {
                let cap = self.config.retention.capacity(warmup);
                let histories = (0..names.len())
                    .map(|_| StreamHistory::new(cap, indicators.len()))
                    .collect();
                (histories, None)
            }
        };

        let plan = RunPlan {
            vectorized: collected.is_some(),
            names,
            indicators,
            indicator_names,
        };
        let mut state = RunState {
            book: OrderBook::new(),
            ledger,
            histories,
            latest: vec![None; plan.names.len()],
            inbox: Vec::new(),
            notifications: Vec::new(),
            fills: Vec::new(),
            equity: Vec::new(),
            cash_flows: Vec::new(),
            ticks: 0,
            last_timestamp: None,
        };

        strategy.on_start(&plan.names);
        let stopped_early = match collected {
            Some(ticks) => {
                let mut stopped = false;
                for tick in ticks {
                    if self.stop.is_stopped() {
                        stopped = true;
                        break;
                    }
                    self.process_tick(&plan, &mut state, strategy, tick)?;
                }
                stopped
            }
            None => self.run_incremental(&plan, &mut state, strategy)?,
        };

        self.finish(plan, state, strategy, schedule, stopped_early)
    }

    /// Drain the clock completely. Any data error surfaces here, before the
    /// strategy sees a single bar.
    fn collect_ticks(&mut self) -> Result<Vec<MasterTick>, EngineError> {
        let mut ticks = Vec::new();
        loop {
            match self.clock.advance()? {
                ClockEvent::Tick(tick) => ticks.push(tick),
                ClockEvent::Pending => {
                    self.clock.wait_for_data(self.config.poll_interval);
                }
                ClockEvent::EndOfData => break,
            }
        }
        debug!(ticks = ticks.len(), "collected ticks for vectorized run");
        Ok(ticks)
    }

    /// Returns whether the run ended on a stop request.
    fn run_incremental(
        &mut self,
        plan: &RunPlan,
        state: &mut RunState,
        strategy: &mut dyn Strategy,
    ) -> Result<bool, EngineError> {
        let mut waited = Duration::ZERO;
        loop {
            if self.stop.is_stopped() {
                return Ok(true);
            }
            match self.clock.advance()? {
                ClockEvent::Tick(tick) => {
                    waited = Duration::ZERO;
                    self.process_tick(plan, state, strategy, tick)?;
                }
                ClockEvent::Pending => {
                    let mut wait = self.config.poll_interval;
                    if let Some(limit) = self.config.live_bar_timeout {
                        if waited >= limit {
                            warn!(?limit, "no live data within timeout");
                            return Err(EngineError::Timeout(limit));
                        }
                        wait = wait.min(limit - waited);
                    }
                    let started = Instant::now();
                    self.clock.wait_for_data(wait);
                    waited += started.elapsed();
                }
                ClockEvent::EndOfData => return Ok(false),
            }
        }
    }

    fn process_tick(
        &mut self,
        plan: &RunPlan,
        state: &mut RunState,
        strategy: &mut dyn Strategy,
        tick: MasterTick,
    ) -> Result<(), EngineError> {
        let index = state.ticks;
        let now = tick.timestamp;

        for history in &mut state.histories {
            history.fresh = false;
        }
        for sb in &tick.bars {
            let Some(history) = state.histories.get_mut(sb.stream.0) else {
                continue;
            };
            let StreamHistory {
                bars,
                indicators,
                fresh,
            } = history;
            if plan.vectorized {
                bars.reveal();
                for series in indicators.iter_mut() {
                    series.reveal();
                }
            } else {
                bars.push(sb.bar.clone());
                for (series, indicator) in indicators.iter_mut().zip(&plan.indicators) {
                    series.push(indicator.value(bars.window(indicator.lookback() + 1)));
                }
            }
            *fresh = true;
            state.latest[sb.stream.0] = Some(sb.bar.clone());
        }

        let inbox = std::mem::take(&mut state.inbox);
        {
            let mut ctx = StrategyContext {
                now,
                tick: index,
                names: &plan.names,
                indicator_names: &plan.indicator_names,
                histories: &state.histories,
                ledger: &state.ledger,
                profiles: &self.profiles,
                book: &mut state.book,
                notifications: &inbox,
                cash_flows: &mut state.cash_flows,
                stop: &self.stop,
            };
            strategy.on_tick(&mut ctx);
        }

        for CashFlow(amount) in state.cash_flows.drain(..) {
            match state.ledger.cash_flow(&self.profiles, amount) {
                Ok(()) => debug!(%amount, cash = %state.ledger.cash(), "cash flow"),
                Err(err) => warn!(%amount, available = %err.available, "cash flow refused"),
            }
        }

        let fills = {
            let mut exec = ExecutionContext {
                book: &mut state.book,
                ledger: &mut state.ledger,
                profiles: &self.profiles,
                market: MarketView {
                    bars: &tick.bars,
                    latest: &state.latest,
                },
                now,
                tick: index,
            };
            self.venue.process_cancellations(&mut exec)?;
            self.venue.process_submissions(&mut exec)?;
            let fills = self.venue.execute_tick(&mut exec)?;
            // bracket children released by this tick's fills
            self.venue.process_submissions(&mut exec)?;
            fills
        };

        for sb in &tick.bars {
            let model = self.profiles.for_stream(sb.stream);
            state.ledger.settle(model, sb.stream, sb.bar.close, now);
        }

        state.fills.extend(fills);
        state.equity.push(EquityPoint {
            timestamp: now,
            cash: state.ledger.cash(),
            value: state.ledger.value(&self.profiles),
            fund_value: state.ledger.fund_value(&self.profiles),
        });

        let produced = state.book.drain_notifications();
        state.notifications.extend(produced.iter().cloned());
        state.inbox = produced;
        state.ticks += 1;
        state.last_timestamp = Some(now);
        Ok(())
    }

    fn finish(
        &mut self,
        plan: RunPlan,
        mut state: RunState,
        strategy: &mut dyn Strategy,
        schedule: Schedule,
        stopped_early: bool,
    ) -> Result<RunReport, EngineError> {
        if let Some(now) = state.last_timestamp {
            let mut exec = ExecutionContext {
                book: &mut state.book,
                ledger: &mut state.ledger,
                profiles: &self.profiles,
                market: MarketView {
                    bars: &[],
                    latest: &state.latest,
                },
                now,
                tick: state.ticks,
            };
            self.venue.finish(&mut exec)?;
        }

        let trailing = state.book.drain_notifications();
        state.notifications.extend(trailing.iter().cloned());
        let mut last_inbox = std::mem::take(&mut state.inbox);
        last_inbox.extend(trailing);
        strategy.on_stop(&last_inbox);

        let halted_streams = self
            .clock
            .halted()
            .iter()
            .map(|(stream, err)| HaltedStream {
                stream: *stream,
                name: plan.names.get(stream.0).cloned().unwrap_or_default(),
                reason: err.to_string(),
            })
            .collect();

        let report = RunReport {
            schedule,
            ticks: state.ticks,
            fingerprint: fingerprint_fills(&state.fills),
            initial_cash: self.config.initial_cash,
            final_cash: state.ledger.cash(),
            final_value: state.ledger.value(&self.profiles),
            final_fund_value: state.ledger.fund_value(&self.profiles),
            total_commission: state.ledger.total_commission(),
            total_interest: state.ledger.total_interest(),
            trades: state.ledger.trades().to_vec(),
            positions: state
                .ledger
                .positions()
                .filter(|(_, p)| !p.is_flat())
                .map(|(stream, position)| StreamPosition {
                    stream,
                    position: position.clone(),
                })
                .collect(),
            fills: state.fills,
            notifications: state.notifications,
            equity: state.equity,
            halted_streams,
            stopped_early,
            full_history: self.config.retention.is_full(),
            streams: plan.names,
        };
        info!(
            ticks = report.ticks,
            fills = report.fills.len(),
            final_value = %report.final_value,
            stopped_early,
            "run finished"
        );
        Ok(report)
    }
}
