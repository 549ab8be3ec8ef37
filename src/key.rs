//! Materializes the selector's lane table into the fixed-width endpoint configuration
//! key the caller keeps for the life of the endpoint (spec.md §4.6).

use crate::address::RemoteAddressEntry;
use crate::lane::Usage;
use crate::resource::TransportResource;
use crate::score::score_cmp;
use crate::selector::{aux_criterion, PlanOutcome};

/// Upper bound on lanes per endpoint.
pub const MAX_LANES: usize = 8;
/// Upper bound on distinct memory domains in `rma_bw_md_map`.
pub const MAX_OP_MDS: usize = 4;

/// Transport families known to mishandle remote-key-based RMA despite advertising
/// `NEED_RKEY`; excluded from `rma_bw_md_map` construction (spec.md §4.6 step 4).
const QUIRKY_TRANSPORTS: &[&str] = &["ugni"];

/// One lane's static routing data, as kept for the endpoint's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneInfo {
    pub resource_index: usize,
    pub proxy_lane: Option<usize>,
    pub dst_md_index: u32,
    pub remote_addr_index: usize,
}

/// The planning engine's output: everything the endpoint needs to route traffic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EndpointConfigKey {
    pub lanes: Vec<LaneInfo>,
    /// `am_bw_lanes[0]` always duplicates `am_lane`; `am_bw_lanes[1..]` are sorted
    /// descending by AM-bandwidth score.
    pub am_bw_lanes: Vec<Option<usize>>,
    pub rma_lanes: Vec<Option<usize>>,
    pub rma_bw_lanes: Vec<Option<usize>>,
    pub amo_lanes: Vec<Option<usize>>,
    pub am_lane: Option<usize>,
    pub tag_lane: Option<usize>,
    pub wireup_lane: Option<usize>,
    /// Local memory-domain indices backing the sorted `rma_bw_lanes`, capped at
    /// [`MAX_OP_MDS`] bits.
    pub rma_bw_md_map: u64,
    pub am_emulated: bool,
}

/// Sorts `slot_lanes` (lane indices paired with their category score) descending by
/// score, with zero-score (unused) slots sinking to the tail — spec.md §4.6 step 3.
fn sorted_lane_table(mut entries: Vec<(usize, f64)>) -> Vec<Option<usize>> {
    entries.sort_by(|(_, a), (_, b)| score_cmp(*b, *a));
    entries
        .into_iter()
        .map(|(index, score)| if score > 0.0 { Some(index) } else { None })
        .collect()
}

fn category_table(outcome: &PlanOutcome, usage: Usage, score_of: impl Fn(&crate::lane::LaneDescriptor) -> f64) -> Vec<Option<usize>> {
    let entries: Vec<(usize, f64)> = outcome
        .lanes
        .lanes
        .iter()
        .enumerate()
        .filter(|(_, l)| l.usage.contains(usage))
        .map(|(i, l)| (i, score_of(l)))
        .collect();
    sorted_lane_table(entries)
}

/// Picks the wireup (out-of-band handshake) lane: the first lane satisfying the
/// auxiliary capability profile, or failing that, any lane on a peer-to-peer transport
/// (spec.md §4.6 step 5).
fn select_wireup_lane(outcome: &PlanOutcome, resources: &[TransportResource], addresses: &[RemoteAddressEntry]) -> Option<usize> {
    let criterion = aux_criterion();

    let aux_match = outcome.lanes.lanes.iter().position(|l| {
        let local = &resources[l.resource_index];
        let remote = &addresses[l.addr_index].iface_attr;
        local.iface_flags.contains_all(criterion.local_iface_flags)
            && remote.cap_flags.contains_all(criterion.remote_iface_flags)
    });
    if aux_match.is_some() {
        return aux_match;
    }

    outcome
        .lanes
        .lanes
        .iter()
        .position(|l| resources[l.resource_index].is_p2p())
}

/// Builds the final endpoint configuration key from a completed selection pass.
pub fn construct_lanes(
    outcome: PlanOutcome,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
) -> EndpointConfigKey {
    let mut key = EndpointConfigKey {
        am_lane: outcome.am_lane,
        tag_lane: outcome.tag_lane,
        am_emulated: outcome.am_emulated,
        ..Default::default()
    };

    key.lanes = outcome
        .lanes
        .lanes
        .iter()
        .map(|l| LaneInfo {
            resource_index: l.resource_index,
            proxy_lane: l.proxy_lane,
            dst_md_index: l.dst_md_index,
            remote_addr_index: l.addr_index,
        })
        .collect();

    key.rma_lanes = category_table(&outcome, Usage::RMA, |l| l.rma_score);
    key.rma_bw_lanes = category_table(&outcome, Usage::RMA_BW, |l| l.rma_bw_score);
    key.amo_lanes = category_table(&outcome, Usage::AMO, |l| l.amo_score);

    let mut am_bw_lanes = category_table(&outcome, Usage::AM_BW, |l| l.am_bw_score);
    am_bw_lanes.insert(0, outcome.am_lane);
    key.am_bw_lanes = am_bw_lanes;

    key.rma_bw_md_map = 0;
    for lane_index in key.rma_bw_lanes.iter().flatten() {
        if key.rma_bw_md_map.count_ones() as usize >= MAX_OP_MDS {
            break;
        }
        let lane = &outcome.lanes.lanes[*lane_index];
        let resource = &resources[lane.resource_index];
        if !resource.md_flags.contains(crate::resource::MdFlags::NEED_RKEY) {
            continue;
        }
        if QUIRKY_TRANSPORTS.contains(&resource.transport_name.as_str()) {
            continue;
        }
        key.rma_bw_md_map |= 1u64 << resource.md_index;
    }

    key.wireup_lane = select_wireup_lane(&outcome, resources, addresses);

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_table_sinks_zero_scores_to_tail() {
        let table = sorted_lane_table(vec![(0, 0.0), (1, 5.0), (2, 2.0)]);
        assert_eq!(table, vec![Some(1), Some(2), None]);
    }
}
