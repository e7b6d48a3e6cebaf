//! Builds a searcher chain from a [`SearcherConfig`].
//!
//! Layers are applied inside out: base strategy, interleaving,
//! cross-check, epoch, filter, demotion, second chance, batching, merging,
//! iterative deepening, string pruning. Each layer only exists when its
//! section is enabled.

use std::time::Duration;

use tracing::info;

use crate::budget::{BatchingSearcher, Budgets, SecondChanceSearcher};
use crate::config::{BaseConfig, BaseStrategy, SearcherConfig, WeigherKind};
use crate::deepening::IterativeDeepeningSearcher;
use crate::error::SearchError;
use crate::exclusion::{read_filter_file, DemotionSearcher, FilterSearcher};
use crate::interleaved::{InterleavedSearcher, TicketInterleavedSearcher};
use crate::pool::{BumpMergingSearcher, EpochSearcher, MergingSearcher};
use crate::primitive::{
    FifoSearcher, LifoSearcher, PhasedSearcher, RandomSearcher, RoundRobinSearcher,
    WeightedRandomSearcher,
};
use crate::priority::{
    BucketByFunctionWeigher, CoverageWeigher, MetricWeigher, PrioritySearcher, RescanSearcher,
    SumWeigher, TraceWeigher, Weigher,
};
use crate::rng::SharedRng;
use crate::searcher::Searcher;
use crate::string_prune::StringPruneSearcher;
use crate::xchk::XChkSearcher;

fn build_weigher(base: &BaseConfig) -> Box<dyn Weigher> {
    let mut parts: Vec<Box<dyn Weigher>> = base
        .weighers
        .iter()
        .map(|kind| -> Box<dyn Weigher> {
            match kind {
                WeigherKind::Coverage => Box::new(CoverageWeigher),
                WeigherKind::BucketByFunction => Box::new(BucketByFunctionWeigher::new()),
                WeigherKind::Trace => Box::new(TraceWeigher::new(base.trace_depth)),
                WeigherKind::Metric => Box::new(MetricWeigher::new(base.weight, base.metric_scale)),
            }
        })
        .collect();
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Box::new(SumWeigher::new(parts))
    }
}

/// One strategy with no decorators.
pub fn build_base(
    strategy: BaseStrategy,
    base: &BaseConfig,
    rng: &SharedRng,
) -> Result<Box<dyn Searcher>, SearchError> {
    Ok(match strategy {
        BaseStrategy::Fifo => Box::new(FifoSearcher::new()),
        BaseStrategy::Lifo => Box::new(LifoSearcher::new()),
        BaseStrategy::Random => Box::new(RandomSearcher::new(rng.clone())),
        BaseStrategy::RoundRobin => Box::new(RoundRobinSearcher::new()),
        BaseStrategy::Phased => Box::new(PhasedSearcher::new()),
        BaseStrategy::Weighted => Box::new(WeightedRandomSearcher::new(base.weight, rng.clone())),
        BaseStrategy::Priority => {
            if base.bucket.uses_weighers() {
                return Err(SearchError::Config(format!(
                    "bucket strategy '{}' must not be priority-driven",
                    base.bucket
                )));
            }
            let template = build_base(base.bucket, base, rng)?;
            Box::new(PrioritySearcher::new(
                build_weigher(base),
                template,
                base.kick_rate,
            ))
        }
        BaseStrategy::Rescan => Box::new(RescanSearcher::new(build_weigher(base), rng.clone())),
    })
}

/// Validate `config` and assemble the full chain.
pub fn build_searcher(
    config: &SearcherConfig,
    rng: &SharedRng,
) -> Result<Box<dyn Searcher>, SearchError> {
    config.validate()?;

    let mut searcher = build_base(config.base.strategy, &config.base, rng)?;

    if config.interleave.enabled {
        let mut all = vec![searcher];
        for strategy in &config.interleave.strategies {
            all.push(build_base(*strategy, &config.base, rng)?);
        }
        searcher = if config.interleave.tickets {
            Box::new(TicketInterleavedSearcher::new(all, rng.clone()))
        } else {
            Box::new(InterleavedSearcher::new(all))
        };
    }

    // Below epoch so a concretized state is re-snapshotted before it is checked.
    if config.xchk.enabled {
        searcher = Box::new(XChkSearcher::new(searcher));
    }

    if config.epoch.enabled {
        let pool = build_base(config.epoch.pool, &config.base, rng)?;
        searcher = Box::new(EpochSearcher::new(
            searcher,
            pool,
            rng.clone(),
            config.epoch.watermark,
        ));
    }

    if config.filter.enabled {
        let mut patterns = config.filter.functions.clone();
        if let Some(path) = &config.filter.file {
            patterns.extend(read_filter_file(path)?);
        }
        searcher = Box::new(FilterSearcher::new(searcher, patterns, config.filter.mode));
    }

    if config.demotion.enabled {
        searcher = Box::new(DemotionSearcher::new(searcher, config.demotion.max_repeats));
    }

    if config.second_chance.enabled {
        searcher = Box::new(SecondChanceSearcher::new(
            searcher,
            config.second_chance.boost,
            config.second_chance.boost_cov,
        ));
    }

    if config.batching.enabled {
        let b = &config.batching;
        searcher = Box::new(BatchingSearcher::new(
            searcher,
            Budgets {
                time: Duration::from_millis(b.time_ms),
                instructions: b.instructions,
                queries: b.queries,
                adaptive: b.adaptive,
            },
        ));
    }

    if config.merge.use_merge {
        searcher = Box::new(MergingSearcher::new(searcher, config.merge.points()));
    } else if config.merge.use_bump_merge {
        searcher = Box::new(BumpMergingSearcher::new(searcher, config.merge.points()));
    }

    if config.deepening.enabled {
        searcher = Box::new(IterativeDeepeningSearcher::new(searcher));
    }

    if config.string_prune.enabled {
        searcher = Box::new(StringPruneSearcher::new(searcher));
    }

    info!(searcher = %searcher.describe(), "searcher chain built");
    Ok(searcher)
}
