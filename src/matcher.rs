//! The two-phase transport matcher: filter the remote address list down to candidates a
//! criterion could use, then scan local resources for the best-scoring reachable match.

use log::trace;

use crate::address::RemoteAddressEntry;
use crate::criteria::Criterion;
use crate::error::{missing_requirement_reason, MissingRequirement, WireupError};
use crate::resource::{IfaceFlags, TransportResource};
use crate::score::{score_cmp, ScoreInputs};

/// A successful match: which local resource and which remote address entry to pair, the
/// memory domain the remote side expects data to land on, and the score that won.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub resource_index: usize,
    pub addr_index: usize,
    pub dst_md_index: u32,
    pub score: f64,
    /// Combined local + remote interface priority, used only to break score ties
    /// (spec.md §4.1); not part of the match's public meaning.
    pub priority: i64,
}

/// Narrows `resources` and `addresses` by capability before scoring, mirroring the
/// original's bitmap-based prefilter: a resource or address entry that fails a flag/MD
/// check can never win regardless of score, so excluding it up front keeps the O(n*m)
/// scoring loop cheap.
fn candidate_bitmaps(
    criterion: &Criterion,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    exclude_local: &dyn Fn(usize, &TransportResource) -> bool,
    exclude_remote: &dyn Fn(&RemoteAddressEntry) -> bool,
) -> (Vec<usize>, Vec<usize>) {
    debug_assert!(
        IfaceFlags::WIRE_TRANSMITTED.contains(criterion.remote_iface_flags),
        "{}: criterion requires a remote iface flag the address codec never transmits",
        criterion.title
    );

    let local: Vec<usize> = resources
        .iter()
        .enumerate()
        .filter(|(i, r)| {
            !exclude_local(*i, r)
                && (r.is_aux == criterion.allow_aux || !r.is_aux)
                && r.iface_flags.contains_all(criterion.local_iface_flags)
                && r.md_flags.contains_all(criterion.local_md_flags)
                && r.atomic.contains_all(criterion.local_atomic)
        })
        .map(|(i, _)| i)
        .collect();

    let remote: Vec<usize> = addresses
        .iter()
        .enumerate()
        .filter(|(_, a)| {
            !exclude_remote(a)
                && a.iface_attr
                    .cap_flags
                    .contains_all(criterion.remote_iface_flags)
                && a.md_flags.contains_all(criterion.remote_md_flags)
                && a.iface_attr.atomic.contains_all(criterion.remote_atomic)
        })
        .map(|(i, _)| i)
        .collect();

    (local, remote)
}

/// Finds the best-scoring `(resource, address)` pair satisfying `criterion`, among pairs
/// `is_reachable` allows. Reachability is injected rather than embedded (spec.md §1: actual
/// transport-layer routability is out of scope for this engine) so tests can exercise the
/// selection logic without a real network layer.
///
/// Ties are broken by remote interface priority, then local resource priority, matching
/// the original's sort comparators (spec.md §4.1).
pub fn select_transport(
    criterion: &Criterion,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
) -> Result<MatchResult, WireupError> {
    select_transport_excluding(
        criterion,
        resources,
        addresses,
        estimated_num_endpoints,
        is_reachable,
        &|_, _| false,
        &|_| false,
    )
}

/// Like [`select_transport`], but additionally excludes any local resource or remote
/// address entry the given predicates flag. Used by the memory-access and bandwidth
/// expanders (spec.md §4.5) to remove already-consumed devices/memory domains between
/// repeated picks without needing to physically shrink the resource/address slices.
/// `exclude_local` receives the candidate's index into `resources`, so callers can exclude
/// by a criterion unrelated to the resource's own fields (e.g. the AMO pass excluding
/// peer-to-peer resources not on the caller's atomic-capable whitelist) while every
/// `MatchResult::resource_index` this returns stays a valid index into the same slice.
pub fn select_transport_excluding(
    criterion: &Criterion,
    resources: &[TransportResource],
    addresses: &[RemoteAddressEntry],
    estimated_num_endpoints: u32,
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
    exclude_local: &dyn Fn(usize, &TransportResource) -> bool,
    exclude_remote: &dyn Fn(&RemoteAddressEntry) -> bool,
) -> Result<MatchResult, WireupError> {
    let (local_candidates, remote_candidates) =
        candidate_bitmaps(criterion, resources, addresses, exclude_local, exclude_remote);

    let mut best: Option<MatchResult> = None;

    for &ri in &local_candidates {
        let local = &resources[ri];
        for &ai in &remote_candidates {
            let remote = &addresses[ai];
            if !is_reachable(local, remote) {
                continue;
            }

            let inputs = ScoreInputs {
                local,
                remote: &remote.iface_attr,
                estimated_num_endpoints,
            };
            let score = (criterion.score_fn)(&inputs);

            let priority = (local.priority as i64) + (remote.iface_attr.priority as i64);

            let better = match &best {
                None => true,
                Some(current) => match score_cmp(score, current.score) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => priority > current.priority,
                },
            };

            if better {
                best = Some(MatchResult {
                    resource_index: ri,
                    addr_index: ai,
                    dst_md_index: remote.md_index,
                    score,
                    priority,
                });
            }
        }
    }

    best.ok_or_else(|| {
        // Diagnose against the exclude/aux-filtered population, not `local_candidates`/
        // `remote_candidates`: those already require every category to pass at once, so
        // checking a single category against them would be tautologically true whenever
        // any candidate exists at all.
        let local_pool: Vec<usize> = resources
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !exclude_local(*i, r) && (r.is_aux == criterion.allow_aux || !r.is_aux)
            })
            .map(|(i, _)| i)
            .collect();
        let remote_pool: Vec<usize> = addresses
            .iter()
            .enumerate()
            .filter(|(_, a)| !exclude_remote(a))
            .map(|(i, _)| i)
            .collect();

        let local_flags_ok = local_pool
            .iter()
            .any(|&i| resources[i].iface_flags.contains_all(criterion.local_iface_flags));
        let remote_flags_ok = remote_pool.iter().any(|&i| {
            addresses[i]
                .iface_attr
                .cap_flags
                .contains_all(criterion.remote_iface_flags)
        });
        let local_md_ok = local_pool
            .iter()
            .any(|&i| resources[i].md_flags.contains_all(criterion.local_md_flags));
        let remote_md_ok = remote_pool
            .iter()
            .any(|&i| addresses[i].md_flags.contains_all(criterion.remote_md_flags));
        let local_atomic_ok = local_pool
            .iter()
            .any(|&i| resources[i].atomic.contains_all(criterion.local_atomic));
        let remote_atomic_ok = remote_pool
            .iter()
            .any(|&i| addresses[i].iface_attr.atomic.contains_all(criterion.remote_atomic));

        // Name the specific missing flag off the first pool member, mirroring
        // `ucp_wireup_get_missing_flag_desc`'s per-resource naming.
        let local_flags_desc = (!local_flags_ok)
            .then(|| local_pool.first())
            .flatten()
            .and_then(|&i| {
                resources[i]
                    .iface_flags
                    .first_missing_name(criterion.local_iface_flags)
            });
        let remote_flags_desc = (!remote_flags_ok)
            .then(|| remote_pool.first())
            .flatten()
            .and_then(|&i| {
                addresses[i]
                    .iface_attr
                    .cap_flags
                    .first_missing_name(criterion.remote_iface_flags)
            });
        let local_md_desc = (!local_md_ok)
            .then(|| local_pool.first())
            .flatten()
            .and_then(|&i| {
                resources[i]
                    .md_flags
                    .first_missing_name(criterion.local_md_flags)
            });
        let remote_md_desc = (!remote_md_ok)
            .then(|| remote_pool.first())
            .flatten()
            .and_then(|&i| {
                addresses[i]
                    .md_flags
                    .first_missing_name(criterion.remote_md_flags)
            });
        let local_atomic_desc = (!local_atomic_ok)
            .then(|| local_pool.first())
            .flatten()
            .and_then(|&i| resources[i].atomic.first_missing_desc(criterion.local_atomic));
        let remote_atomic_desc = (!remote_atomic_ok)
            .then(|| remote_pool.first())
            .flatten()
            .and_then(|&i| {
                addresses[i]
                    .iface_attr
                    .atomic
                    .first_missing_desc(criterion.remote_atomic)
            });

        let reason = missing_requirement_reason(&MissingRequirement {
            local_flags_ok,
            remote_flags_ok,
            local_md_ok,
            remote_md_ok,
            local_atomic_ok,
            remote_atomic_ok,
            local_flags_desc,
            remote_flags_desc,
            local_md_desc,
            remote_md_desc,
            local_atomic_desc,
            remote_atomic_desc,
        });
        trace!("{}: no candidate matched ({reason})", criterion.title);

        WireupError::Unreachable {
            title: criterion.title,
            reason,
        }
    })
}
