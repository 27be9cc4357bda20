//! Simulated market data feed.
//!
//! Random walk per subscribed symbol: every interval each price moves by a
//! uniformly drawn fraction of itself within `±step_fraction / 2`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DataFeed, FeedError, FeedEvent, FeedSink};
use crate::domain::market::Tick;

/// Simulated feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFeedConfig {
    /// Price every symbol starts from.
    pub start_price: Decimal,
    /// Time between ticks.
    pub interval: Duration,
    /// Full width of one step as a fraction of price (0.0005 = ±0.025 %).
    pub step_fraction: Decimal,
    /// Seed for reproducible walks.
    pub seed: Option<u64>,
}

impl Default for SimulatedFeedConfig {
    fn default() -> Self {
        Self {
            start_price: dec!(69000),
            interval: Duration::from_secs(1),
            step_fraction: dec!(0.0005),
            seed: None,
        }
    }
}

type GeneratorHandle = (CancellationToken, JoinHandle<()>);

#[derive(Debug, Default)]
struct FeedState {
    sink: Option<FeedSink>,
    symbols: Vec<String>,
    generator: Option<GeneratorHandle>,
}

/// Feed that generates ticks locally.
#[derive(Debug)]
pub struct SimulatedFeed {
    config: SimulatedFeedConfig,
    state: Mutex<FeedState>,
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
}

impl SimulatedFeed {
    /// Create a feed.
    #[must_use]
    pub fn new(config: SimulatedFeedConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FeedState::default()),
            prices: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Last generated price of a symbol.
    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.lock().get(symbol).copied()
    }

    /// Start a generator for the current symbols, once connected.
    fn start_generator(&self, state: &mut FeedState) {
        let Some(sink) = state.sink.clone() else {
            return;
        };
        if state.symbols.is_empty() {
            return;
        }

        let token = CancellationToken::new();
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let generator = Generator {
            symbols: state.symbols.clone(),
            config: self.config.clone(),
            prices: Arc::clone(&self.prices),
            rng,
        };
        let handle = tokio::spawn(generator.run(sink, token.clone()));
        state.generator = Some((token, handle));
    }
}

/// Cancel a generator and wait until it can no longer send.
async fn stop_generator(generator: Option<GeneratorHandle>) {
    if let Some((token, handle)) = generator {
        token.cancel();
        let _ = handle.await;
    }
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new(SimulatedFeedConfig::default())
    }
}

#[async_trait]
impl DataFeed for SimulatedFeed {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(&self, sink: FeedSink) -> Result<(), FeedError> {
        sink.send(FeedEvent::Connected).await;
        let previous = self.state.lock().generator.take();
        stop_generator(previous).await;

        let mut state = self.state.lock();
        state.sink = Some(sink);
        self.start_generator(&mut state);
        drop(state);
        tracing::info!("Simulated feed connected");
        Ok(())
    }

    async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        let previous = {
            let mut state = self.state.lock();
            state.symbols.clone_from(&symbols);
            state.generator.take()
        };
        stop_generator(previous).await;

        let sink = {
            let mut state = self.state.lock();
            self.start_generator(&mut state);
            state.sink.clone()
        };
        tracing::info!(symbols = ?symbols, "Simulated feed subscribed");
        if let Some(sink) = sink {
            sink.send(FeedEvent::Subscribed(symbols)).await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        let generator = {
            let mut state = self.state.lock();
            state.sink = None;
            state.generator.take()
        };
        stop_generator(generator).await;
        tracing::info!("Simulated feed disconnected");
    }
}

struct Generator {
    symbols: Vec<String>,
    config: SimulatedFeedConfig,
    prices: Arc<Mutex<HashMap<String, Decimal>>>,
    rng: StdRng,
}

impl Generator {
    async fn run(mut self, sink: FeedSink, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick of a tokio interval completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    for tick in self.step() {
                        let sent = tokio::select! {
                            sent = sink.send(FeedEvent::Tick(tick)) => sent,
                            () = token.cancelled() => return,
                        };
                        if !sent {
                            tracing::debug!("Simulated feed sink closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn step(&mut self) -> Vec<Tick> {
        let now = Utc::now();
        let mut prices = self.prices.lock();
        self.symbols
            .iter()
            .map(|symbol| {
                let price = prices
                    .entry(symbol.clone())
                    .or_insert(self.config.start_price);
                let draw = Decimal::try_from(self.rng.random_range(-0.5..0.5)).unwrap_or_default();
                *price = (*price + *price * self.config.step_fraction * draw).round_dp(2);
                Tick::new(symbol.clone(), *price, now)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::SessionEvent;

    fn config() -> SimulatedFeedConfig {
        SimulatedFeedConfig {
            interval: Duration::from_millis(100),
            seed: Some(7),
            ..SimulatedFeedConfig::default()
        }
    }

    async fn next_tick(rx: &mut tokio::sync::mpsc::Receiver<SessionEvent>) -> Tick {
        loop {
            match rx.recv().await {
                Some(SessionEvent::Feed(FeedEvent::Tick(tick))) => return tick,
                Some(_) => {}
                None => panic!("feed closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn walk_stays_within_step() {
        let feed = SimulatedFeed::new(config());
        let (sink, mut rx) = FeedSink::channel(16);
        feed.connect(sink).await.unwrap();
        feed.subscribe(vec!["BTC/USD".into()]).await.unwrap();

        let mut previous = dec!(69000);
        for _ in 0..20 {
            let tick = next_tick(&mut rx).await;
            assert_eq!(tick.symbol, "BTC/USD");
            let bound = previous * dec!(0.00025) + dec!(0.01);
            assert!((tick.price - previous).abs() <= bound, "{previous} -> {}", tick.price);
            previous = tick.price;
        }
        assert_eq!(feed.last_price("BTC/USD"), Some(previous));

        feed.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_replaces_symbols() {
        let feed = SimulatedFeed::new(config());
        let (sink, mut rx) = FeedSink::channel(16);
        feed.connect(sink).await.unwrap();
        feed.subscribe(vec!["BTC/USD".into()]).await.unwrap();
        assert_eq!(next_tick(&mut rx).await.symbol, "BTC/USD");

        feed.subscribe(vec!["ETH/USD".into()]).await.unwrap();
        // Queued before the switch.
        while rx.try_recv().is_ok() {}

        for _ in 0..5 {
            assert_eq!(next_tick(&mut rx).await.symbol, "ETH/USD");
        }

        feed.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_generator() {
        let feed = SimulatedFeed::new(config());
        let (sink, mut rx) = FeedSink::channel(16);
        feed.connect(sink).await.unwrap();
        feed.subscribe(vec!["BTC/USD".into()]).await.unwrap();
        let _ = next_tick(&mut rx).await;

        feed.disconnect().await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_walks_repeat() {
        let run = || async {
            let feed = SimulatedFeed::new(config());
            let (sink, mut rx) = FeedSink::channel(16);
            feed.connect(sink).await.unwrap();
            feed.subscribe(vec!["BTC/USD".into()]).await.unwrap();
            let mut prices = Vec::new();
            for _ in 0..5 {
                prices.push(next_tick(&mut rx).await.price);
            }
            feed.disconnect().await;
            prices
        };
        assert_eq!(run().await, run().await);
    }
}
