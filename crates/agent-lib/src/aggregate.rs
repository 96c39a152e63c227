//! Window aggregation into per-interface KPIs

use crate::models::{IfIndex, Sample, SummaryKpi};
use crate::rate::{PairOutcome, RateEngine};

/// Summarize an ordered window of samples for one interface.
///
/// Never fails: an empty window reports zero availability with `no_data`
/// set, and fewer than two samples report a zero error rate.
pub fn summarize(if_index: IfIndex, samples: &[Sample], engine: &RateEngine) -> SummaryKpi {
    let sample_count = samples.len();

    let availability_percent = if sample_count == 0 {
        0.0
    } else {
        let up = samples.iter().filter(|s| s.oper_status.is_up()).count();
        100.0 * up as f64 / sample_count as f64
    };

    let pairs: Vec<_> = samples
        .windows(2)
        .filter_map(|w| match engine.compute(&w[0], &w[1]) {
            PairOutcome::Usable(rates) => Some(rates),
            PairOutcome::OutOfOrder | PairOutcome::CounterReset(_) => None,
        })
        .collect();

    SummaryKpi {
        if_index,
        if_name: samples.last().map(|s| s.if_name.clone()),
        sample_count,
        pair_count: pairs.len(),
        availability_percent,
        error_rate_percent: mean(pairs.iter().filter_map(|r| r.error_rate_percent)).unwrap_or(0.0),
        mean_in_util_percent: mean(pairs.iter().filter_map(|r| r.in_util_percent)),
        mean_out_util_percent: mean(pairs.iter().filter_map(|r| r.out_util_percent)),
        first_sample_time: samples.first().map(|s| s.sample_time),
        last_sample_time: samples.last().map(|s| s.sample_time),
        no_data: sample_count == 0,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
