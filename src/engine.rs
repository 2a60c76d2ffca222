//! Feed cycle orchestration
//!
//! One cycle: read the witness record, resolve every configured market
//! concurrently, aggregate, convert, decide and (maybe) broadcast. A market
//! that fails or has no liquidity is excluded and the cycle goes on; only
//! losing every market, the witness record or the reference feed aborts the
//! publish step.

use chrono::Utc;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::decision::{
    format_feed_price, DecisionReport, PublishDecision, PublishDecisionEngine, FEED_QUOTE_UNIT,
};
use crate::error::{FeedError, FeedResult};
use crate::exchange::ExchangeClient;
use crate::ledger::LedgerClient;
use crate::oracle::{FeedConverter, PriceAggregator};
use crate::router::MarketRouter;
use crate::rpc::with_timeout;
use crate::types::{MarketPair, MarketQuote};

/// Static inputs of every cycle
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub witness: String,
    pub markets: Vec<MarketPair>,
    pub bridge_asset: String,
    pub reference_asset: String,
    /// Multiplier applied to the converted price
    pub correction_factor: f64,
    pub request_timeout: Duration,
}

/// What a completed cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// Final price after conversion and correction
    pub price: f64,
    pub quotes: Vec<MarketQuote>,
    pub report: DecisionReport,
    /// `Some` when a broadcast was attempted
    pub broadcast: Option<Result<(), FeedError>>,
}

impl CycleOutcome {
    pub fn published(&self) -> bool {
        matches!(self.broadcast, Some(Ok(())))
    }
}

pub struct FeedCycle<E: ExchangeClient, L: LedgerClient> {
    router: MarketRouter<E>,
    ledger: Arc<L>,
    aggregator: PriceAggregator,
    converter: FeedConverter,
    decision: PublishDecisionEngine,
    settings: CycleSettings,
}

impl<E: ExchangeClient, L: LedgerClient> FeedCycle<E, L> {
    pub fn new(
        router: MarketRouter<E>,
        ledger: Arc<L>,
        aggregator: PriceAggregator,
        converter: FeedConverter,
        decision: PublishDecisionEngine,
        settings: CycleSettings,
    ) -> Self {
        Self {
            router,
            ledger,
            aggregator,
            converter,
            decision,
            settings,
        }
    }

    /// Resolve every market concurrently; failures and empty books are
    /// logged and left out.
    pub async fn collect_quotes(&self) -> Vec<MarketQuote> {
        let bridge = self.settings.bridge_asset.as_str();
        let lookups = self.settings.markets.iter().map(|market| async move {
            (market, self.router.resolve_bridged_price(market, bridge).await)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(market, result)| match result {
                Ok(Some(quote)) => {
                    tracing::info!(
                        market = %market,
                        price = quote.price,
                        volume = quote.volume,
                        "{} price", bridge
                    );
                    Some(quote)
                }
                Ok(None) => {
                    tracing::warn!(market = %market, "no liquidity, market excluded");
                    None
                }
                Err(e) if e.is_source_level() => {
                    tracing::warn!(market = %market, error = %e, "market excluded");
                    None
                }
                Err(e) => {
                    tracing::error!(market = %market, error = %e, "market excluded");
                    None
                }
            })
            .collect()
    }

    /// Run a single cycle
    pub async fn run_once(&self) -> FeedResult<CycleOutcome> {
        let timeout = self.settings.request_timeout;
        let witness = self.settings.witness.as_str();

        let record = with_timeout(timeout, "witness read", self.ledger.read_witness(witness)).await?;

        let quotes = self.collect_quotes().await;
        let aggregate = self
            .aggregator
            .aggregate(&quotes, self.settings.markets.len())?;
        tracing::info!(
            metric = %aggregate.statistic,
            value = aggregate.value,
            sources = aggregate.sources.len(),
            "aggregated {} price", self.settings.bridge_asset
        );

        // Several bridge RPCs with node fallback, each one bounded
        let reference = self
            .ledger
            .read_reference_feed(&self.settings.reference_asset)
            .await?;
        tracing::info!(asset = %self.settings.reference_asset, reference, "reference settlement price");

        let converted = self.converter.convert(aggregate.value, reference)?;
        let price = converted * self.settings.correction_factor;
        if self.settings.correction_factor != 1.0 {
            tracing::info!(
                k = self.settings.correction_factor,
                price,
                "price after correction"
            );
        }
        tracing::info!(price, "calculated price");

        match with_timeout(timeout, "median read", self.ledger.read_median_price()).await {
            Ok(median) => tracing::info!(median, "current median price"),
            Err(e) => tracing::debug!(error = %e, "median price unavailable"),
        }

        let report = self.decision.evaluate(price, &record, Utc::now())?;
        tracing::info!(decision = %report.decision, relative_diff = report.relative_diff, "decision");

        let broadcast = match report.decision {
            PublishDecision::Publish(reason) => {
                let formatted = format_feed_price(price)?;
                tracing::info!(price = %formatted, %reason, "price to publish");
                let result = with_timeout(
                    timeout,
                    "feed broadcast",
                    self.ledger.publish_feed(witness, &formatted, FEED_QUOTE_UNIT),
                )
                .await
                .map_err(|e| match e {
                    FeedError::Broadcast(_) => e,
                    other => FeedError::Broadcast(other.to_string()),
                });
                if let Err(e) = &result {
                    tracing::error!(error = %e, "broadcast failed");
                }
                Some(result)
            }
            PublishDecision::WouldPublish(reason) => {
                tracing::info!(%reason, "--dry-run mode, not publishing price feed");
                None
            }
            PublishDecision::Skip => {
                tracing::debug!("no trigger fired, not publishing");
                None
            }
        };

        Ok(CycleOutcome {
            price,
            quotes,
            report,
            broadcast,
        })
    }

    /// Run cycles until `monitor` is off or the process gets Ctrl-C.
    /// Returns the last cycle's result.
    pub async fn run(
        &self,
        monitor: bool,
        interval: Duration,
        cycle_timeout: Duration,
    ) -> FeedResult<CycleOutcome> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(monitor, interval, cycle_timeout, shutdown)
            .await
    }

    /// Run cycles until `monitor` is off or `shutdown` completes.
    ///
    /// Every cycle is bounded by `cycle_timeout`; failed cycles are logged
    /// and the loop continues. A shutdown that arrives mid-cycle lets that
    /// cycle finish, then stops.
    pub async fn run_until<S>(
        &self,
        monitor: bool,
        interval: Duration,
        cycle_timeout: Duration,
        shutdown: S,
    ) -> FeedResult<CycleOutcome>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stopping = false;
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            let span = tracing::info_span!("cycle", n = cycle);
            let run = with_timeout(cycle_timeout, "feed cycle", self.run_once()).instrument(span);
            tokio::pin!(run);

            let result = loop {
                tokio::select! {
                    result = &mut run => break result,
                    _ = &mut shutdown, if monitor && !stopping => {
                        tracing::info!("interrupted, stopping after this cycle");
                        stopping = true;
                    }
                }
            };

            if let Err(e) = &result {
                tracing::error!(cycle, error = %e, "cycle failed");
            }

            if !monitor || stopping {
                return result;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("interrupted, stopping monitor");
                    return result;
                }
            }
        }
    }
}
