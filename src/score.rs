//! Per-category cost models.
//!
//! Every scorer returns `1 / cost` where cost is a time in seconds, so a higher score is
//! always better (spec.md §4.3). The 1e-3/1e-5 scaling constants exist only so scores from
//! different categories land in comparable magnitudes when they get compared against the
//! AM score during the TAG pass (spec.md §4.4 pass 5) — they must be preserved verbatim for
//! behavioral parity with the original cost models.

use crate::resource::{Bandwidth, TransportResource};
use crate::address::RemoteIfaceAttr;

const RMA_SMALL_MSG: f64 = 4096.0;
const RMA_BW_TEST_MSG: f64 = 256.0 * 1024.0;

/// Bundles the local resource, the matched remote interface, and the one piece of worker
/// configuration every scorer needs (the latency-growth term scales with how many peers
/// the worker expects to maintain).
pub struct ScoreInputs<'a> {
    pub local: &'a TransportResource,
    pub remote: &'a RemoteIfaceAttr,
    pub estimated_num_endpoints: u32,
}

/// An interface's bandwidth is its dedicated share plus its pooled share divided across
/// the endpoints expected to contend for it.
pub fn effective_bandwidth(bw: &Bandwidth, estimated_num_endpoints: u32) -> f64 {
    bw.dedicated + bw.shared / (estimated_num_endpoints.max(1) as f64)
}

fn latency(inputs: &ScoreInputs) -> f64 {
    inputs
        .local
        .latency
        .overhead
        .max(inputs.remote.lat_overhead)
        + inputs.local.latency.growth * (inputs.estimated_num_endpoints as f64)
}

fn min_bandwidth(inputs: &ScoreInputs) -> f64 {
    effective_bandwidth(&inputs.local.bandwidth, inputs.estimated_num_endpoints)
        .min(effective_bandwidth(&inputs.remote.bandwidth, inputs.estimated_num_endpoints))
}

/// Best for small (4 KiB) one-sided put/get.
pub fn rma_score(inputs: &ScoreInputs) -> f64 {
    1e-3 / (latency(inputs) + inputs.local.overhead + RMA_SMALL_MSG / min_bandwidth(inputs))
}

/// Best one-sided latency, for atomics.
pub fn amo_score(inputs: &ScoreInputs) -> f64 {
    1e-3 / (latency(inputs) + inputs.local.overhead)
}

/// Best end-to-end latency, for active messages.
pub fn am_score(inputs: &ScoreInputs) -> f64 {
    1e-3 / (latency(inputs) + inputs.local.overhead + inputs.remote.overhead)
}

/// Best single-MTU bandwidth, for high-bandwidth active messages.
pub fn am_bw_score(inputs: &ScoreInputs) -> f64 {
    let size = inputs.local.max_bcopy;
    let time = size / min_bandwidth(inputs)
        + inputs.local.overhead
        + inputs.remote.overhead
        + latency(inputs);
    size / time * 1e-5
}

/// Best throughput with lowest overhead for a 256 KiB rendezvous-sized transfer,
/// including the cost of registering that memory on the local MD.
pub fn rma_bw_score(inputs: &ScoreInputs) -> f64 {
    1.0 / (RMA_BW_TEST_MSG / min_bandwidth(inputs)
        + latency(inputs)
        + inputs.local.overhead
        + inputs.local.reg_cost.overhead
        + RMA_BW_TEST_MSG * inputs.local.reg_cost.growth)
}

/// Same shape as [`am_score`]; used to pick the auxiliary (wireup-message) transport.
pub fn aux_score(inputs: &ScoreInputs) -> f64 {
    am_score(inputs)
}

/// Epsilon-aware ordering of two scores, matching spec.md §4.1: equal under
/// `ε · max(1, |a|, |b|)` beats raw floating-point comparison, since category scores
/// routinely differ only in the sixth decimal.
pub fn score_cmp(a: f64, b: f64) -> std::cmp::Ordering {
    let eps = f64::EPSILON * 1.0_f64.max(a.abs()).max(b.abs());
    let diff = a - b;
    if diff.abs() < eps {
        std::cmp::Ordering::Equal
    } else if diff > 0.0 {
        std::cmp::Ordering::Greater
    } else {
        std::cmp::Ordering::Less
    }
}
