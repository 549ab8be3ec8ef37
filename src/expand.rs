//! Repeated-selection expanders shared by the memory-access passes (RMA, AMO) and the
//! bandwidth passes (AM_BW, RMA_BW): pick one lane, then keep picking until a cap, a
//! score threshold, or exhaustion stops the loop (spec.md §4.5).

use std::collections::HashSet;

use crate::address::RemoteAddressEntry;
use crate::aggregator::{LaneTable, ScoreKind};
use crate::criteria::Criterion;
use crate::error::WireupError;
use crate::lane::Usage;
use crate::matcher::select_transport_excluding;
use crate::resource::{MdFlags, TransportResource};
use crate::score::score_cmp;

/// Registered-then-allocated memory access expansion (spec.md §4.5 "memaccess
/// expansion"). Tries to add at least one registered-memory lane; if that succeeds, keeps
/// adding allocated-memory lanes as long as each new one scores strictly better than the
/// registered lane that anchored the pass.
pub fn add_memaccess_lanes(
    mut criterion: Criterion,
    usage: Usage,
    score_kind: ScoreKind,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
    lanes: &mut LaneTable,
) -> Result<(), WireupError> {
    add_memaccess_lanes_excluding(
        criterion,
        usage,
        score_kind,
        resources,
        addresses,
        estimated_num_endpoints,
        is_reachable,
        lanes,
        &|_, _| false,
    )
}

/// Like [`add_memaccess_lanes`], but additionally excludes any local resource
/// `extra_exclude_local` flags at every pick in the expansion. Lets a caller (the AMO
/// pass) restrict the resource pool by a predicate that has nothing to do with memory
/// domains (peer-to-peer eligibility) while still indexing into the caller's full
/// resource list, so the resulting `resource_index` values stay valid outside this call.
pub fn add_memaccess_lanes_excluding(
    mut criterion: Criterion,
    usage: Usage,
    score_kind: ScoreKind,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
    lanes: &mut LaneTable,
    extra_exclude_local: &dyn Fn(usize, &TransportResource) -> bool,
) -> Result<(), WireupError> {
    let mut excluded_local_mds: HashSet<u32> = HashSet::new();
    let mut excluded_remote_mds: HashSet<u32> = HashSet::new();

    criterion.local_md_flags |= MdFlags::REG;
    criterion.remote_md_flags |= MdFlags::REG;

    let exclude_local = |i: usize, r: &TransportResource| {
        excluded_local_mds.contains(&r.md_index) || extra_exclude_local(i, r)
    };
    let exclude_remote = |a: &RemoteAddressEntry| excluded_remote_mds.contains(&a.md_index);

    let registered = select_transport_excluding(
        &criterion,
        resources,
        addresses,
        estimated_num_endpoints,
        is_reachable,
        &exclude_local,
        &exclude_remote,
    )?;
    let reg_score = registered.score;
    excluded_local_mds.insert(resources[registered.resource_index].md_index);
    excluded_remote_mds.insert(addresses[registered.addr_index].md_index);
    lanes.add(registered, usage, score_kind);

    criterion.local_md_flags.remove(MdFlags::REG);
    criterion.remote_md_flags.remove(MdFlags::REG);
    criterion.local_md_flags |= MdFlags::ALLOC;
    criterion.remote_md_flags |= MdFlags::ALLOC;

    while lanes.len() < crate::key::MAX_LANES {
        let exclude_local = |i: usize, r: &TransportResource| {
            excluded_local_mds.contains(&r.md_index) || extra_exclude_local(i, r)
        };
        let exclude_remote = |a: &RemoteAddressEntry| excluded_remote_mds.contains(&a.md_index);

        let next = select_transport_excluding(
            &criterion,
            resources,
            addresses,
            estimated_num_endpoints,
            is_reachable,
            &exclude_local,
            &exclude_remote,
        );
        let next = match next {
            Ok(m) => m,
            Err(_) => break,
        };
        if score_cmp(next.score, reg_score) != std::cmp::Ordering::Greater {
            break;
        }
        excluded_local_mds.insert(resources[next.resource_index].md_index);
        excluded_remote_mds.insert(addresses[next.addr_index].md_index);
        lanes.add(next, usage, score_kind);
    }

    Ok(())
}

/// Outcome of one bandwidth-expansion run, carrying just enough to let the caller decide
/// whether to keep calling it for another memory type (spec.md §4.4 pass 4).
pub struct BwExpansionResult {
    pub lanes_added: usize,
}

/// Repeated bandwidth-lane selection (spec.md §4.5 "bw expansion"): after each pick,
/// excludes that pick's local and remote *device* (not just md) from further
/// consideration, and accumulates destination md indices into `md_map` capped at
/// `max_op_mds`. Stops at `max_lanes`, at the md-map cap, on exhaustion, or the moment a
/// self/shared-memory resource is picked.
pub fn add_bw_lanes(
    criterion: &Criterion,
    usage: Usage,
    score_kind: ScoreKind,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
    lanes: &mut LaneTable,
    max_lanes: usize,
    max_op_mds: usize,
    md_map: &mut HashSet<u32>,
) -> BwExpansionResult {
    add_bw_lanes_excluding(
        criterion,
        usage,
        score_kind,
        resources,
        addresses,
        estimated_num_endpoints,
        is_reachable,
        lanes,
        max_lanes,
        max_op_mds,
        md_map,
        &[],
        &[],
    )
}

/// Like [`add_bw_lanes`], but additionally seeds the excluded local/remote device sets
/// before the first pick. Used by the AM_BW pass to carve out the AM lane's device from
/// the very first iteration (spec.md §4.4 pass 6), mirroring how `md_map` is seeded with
/// the AM lane's memory domain by the caller before this function is ever called.
#[allow(clippy::too_many_arguments)]
pub fn add_bw_lanes_excluding(
    criterion: &Criterion,
    usage: Usage,
    score_kind: ScoreKind,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
    lanes: &mut LaneTable,
    max_lanes: usize,
    max_op_mds: usize,
    md_map: &mut HashSet<u32>,
    seed_excluded_local_devices: &[u32],
    seed_excluded_remote_devices: &[u32],
) -> BwExpansionResult {
    let mut excluded_local_devices: HashSet<u32> = seed_excluded_local_devices.iter().copied().collect();
    let mut excluded_remote_devices: HashSet<u32> = seed_excluded_remote_devices.iter().copied().collect();
    let mut added = 0;

    while added < max_lanes && md_map.len() < max_op_mds && lanes.len() < crate::key::MAX_LANES {
        let exclude_local = |_i: usize, r: &TransportResource| excluded_local_devices.contains(&r.device_index);
        let exclude_remote = |a: &RemoteAddressEntry| excluded_remote_devices.contains(&a.dev_index);

        let result = select_transport_excluding(
            criterion,
            resources,
            addresses,
            estimated_num_endpoints,
            is_reachable,
            &exclude_local,
            &exclude_remote,
        );
        let result = match result {
            Ok(m) => m,
            Err(_) => break,
        };

        let picked = &resources[result.resource_index];
        let is_self_or_shm = picked.is_self_or_shm();
        excluded_local_devices.insert(picked.device_index);
        excluded_remote_devices.insert(addresses[result.addr_index].dev_index);
        md_map.insert(result.dst_md_index);
        lanes.add(result, usage, score_kind);
        added += 1;

        if is_self_or_shm {
            break;
        }
    }

    BwExpansionResult { lanes_added: added }
}
