//! Orchestrates the six fixed-order category passes and folds their results into one
//! lane table (spec.md §4.4).

use std::collections::HashSet;

use bitflags::bitflags;
use log::{debug, trace, warn};

use crate::address::RemoteAddressEntry;
use crate::aggregator::{LaneTable, ScoreKind};
use crate::criteria::Criterion;
use crate::error::WireupError;
use crate::expand::{add_bw_lanes, add_bw_lanes_excluding, add_memaccess_lanes, add_memaccess_lanes_excluding};
use crate::lane::Usage;
use crate::matcher::select_transport;
use crate::resource::{AtomicMatrix, AtomicOps, IfaceFlags, MdFlags, TransportResource};
use crate::score::{aux_score, rma_bw_score};

bitflags! {
    /// Capabilities the endpoint was asked to support, read from worker configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features: u16 {
        const RMA     = 1 << 0;
        const AMO32   = 1 << 1;
        const AMO64   = 1 << 2;
        const TAG     = 1 << 3;
        const STREAM  = 1 << 4;
        const AM      = 1 << 5;
        const WAKEUP  = 1 << 6;
    }
}

bitflags! {
    /// Per-endpoint creation flags, set by the caller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EndpointInitFlags: u8 {
        /// Force-create an AM lane even if nothing else would require one.
        const CREATE_AM_LANE = 1 << 0;
        /// This endpoint only ever carries memory-type (e.g. accelerator) buffers;
        /// AMO and TAG are meaningless for it and AM emulation is never a safe fallback.
        const MEM_TYPE       = 1 << 1;
    }
}

/// How the endpoint reacts to a peer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandlingMode {
    #[default]
    None,
    Peer,
}

/// Per-endpoint parameters supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointParams {
    pub err_handling_mode: ErrorHandlingMode,
    pub sock_addr: bool,
}

/// Read-only worker configuration the selector consults (spec.md §6 "Configuration
/// inputs"). `atomic_tls` names the local resources explicitly chosen to carry atomics;
/// resources outside that set may still host an AMO lane as long as they are not
/// peer-to-peer (spec.md §4.4 pass 2).
pub struct WorkerContext {
    pub resources: Vec<TransportResource>,
    pub features: Features,
    pub max_eager_lanes: usize,
    pub max_rndv_lanes: usize,
    pub estimated_num_endpoints: u32,
    pub atomic_tls: HashSet<usize>,
}

impl WorkerContext {
    fn allow_am_emulation(&self, init_flags: EndpointInitFlags, params: &EndpointParams) -> bool {
        !init_flags.contains(EndpointInitFlags::MEM_TYPE)
            && params.err_handling_mode != ErrorHandlingMode::Peer
    }
}

/// Everything the six passes accumulated, before key construction.
pub struct PlanOutcome {
    pub lanes: LaneTable,
    pub am_lane: Option<usize>,
    pub tag_lane: Option<usize>,
    pub am_emulated: bool,
}

const MAX_OP_MDS: usize = 4;

fn atomic_matrix_for(features: Features) -> AtomicMatrix {
    let ops = AtomicOps::ADD | AtomicOps::SWAP | AtomicOps::CSWAP;
    AtomicMatrix {
        op32: if features.contains(Features::AMO32) { ops } else { AtomicOps::empty() },
        fop32: if features.contains(Features::AMO32) { ops } else { AtomicOps::empty() },
        op64: if features.contains(Features::AMO64) { ops } else { AtomicOps::empty() },
        fop64: if features.contains(Features::AMO64) { ops } else { AtomicOps::empty() },
    }
}

/// `am_emulated` is true once an earlier pass has already fallen back to AM emulation
/// (spec.md §4.4, §7): the original sets `UCP_EP_CREATE_AM_LANE` on that same fallback
/// path (`ucp_wireup_add_memaccess_lanes`'s `out:` block) so the AM lane this emulation
/// depends on actually gets created, and this mirrors that by making emulation force the
/// same outcome `CREATE_AM_LANE` would.
fn is_am_required(
    ctx: &WorkerContext,
    params: &EndpointParams,
    init_flags: EndpointInitFlags,
    lanes: &LaneTable,
    am_emulated: bool,
) -> bool {
    if init_flags.contains(EndpointInitFlags::CREATE_AM_LANE) || params.sock_addr || am_emulated {
        return true;
    }
    if !init_flags.contains(EndpointInitFlags::MEM_TYPE)
        && ctx.features.intersects(Features::TAG | Features::STREAM | Features::AM)
    {
        return true;
    }
    lanes
        .lanes
        .iter()
        .any(|l| ctx.resources[l.resource_index].is_p2p())
}

/// Runs the six passes in their fixed order and returns the accumulated lane table.
///
/// Intermediate RMA/AMO failures are swallowed into `am_emulated = true` when
/// [`WorkerContext::allow_am_emulation`] permits it (spec.md §4.4, §7); any other failure,
/// or a zero-lane result, is returned as [`WireupError::Unreachable`].
pub fn search_lanes(
    ctx: &WorkerContext,
    params: &EndpointParams,
    init_flags: EndpointInitFlags,
    addresses: &[RemoteAddressEntry],
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
) -> Result<PlanOutcome, WireupError> {
    if ctx.max_eager_lanes == 0 {
        return Err(WireupError::InvalidConfig(
            "max_eager_lanes must be at least 1 (the am lane always occupies a slot)",
        ));
    }

    let allow_am = ctx.allow_am_emulation(init_flags, params);
    let mut lanes = LaneTable::new();
    let mut am_emulated = false;
    let mut am_lane: Option<usize> = None;
    let mut am_lane_score: f64 = 0.0;
    let mut tag_lane: Option<usize> = None;

    // Pass 1: RMA. A memory-type endpoint only needs to copy across memory types, which
    // is a much weaker requirement than general remote memory access (spec.md §4.4 pass 1).
    if ctx.features.contains(Features::RMA) || init_flags.contains(EndpointInitFlags::MEM_TYPE) {
        let mut criterion = Criterion::new("remote memory access", crate::score::rma_score);
        if init_flags.contains(EndpointInitFlags::MEM_TYPE) {
            criterion.local_iface_flags = IfaceFlags::PUT_SHORT;
            criterion.remote_iface_flags = IfaceFlags::PUT_SHORT;
        } else {
            criterion.local_iface_flags =
                IfaceFlags::PUT_SHORT | IfaceFlags::PUT_BCOPY | IfaceFlags::GET_BCOPY | IfaceFlags::PENDING;
            criterion.remote_iface_flags =
                IfaceFlags::PUT_SHORT | IfaceFlags::PUT_BCOPY | IfaceFlags::GET_BCOPY;
        }
        match add_memaccess_lanes(
            criterion,
            Usage::RMA,
            ScoreKind::Rma,
            &ctx.resources,
            addresses,
            ctx.estimated_num_endpoints,
            is_reachable,
            &mut lanes,
        ) {
            Ok(()) => {}
            Err(e) if allow_am => {
                warn!("rma lanes unavailable ({e}), falling back to am emulation");
                am_emulated = true;
            }
            Err(e) => return Err(e),
        }
    }

    // Pass 2: AMO. Never attempted for a memory-type endpoint: atomics make no sense on
    // accelerator-only buffers (spec.md §8).
    if ctx.features.intersects(Features::AMO32 | Features::AMO64)
        && !init_flags.contains(EndpointInitFlags::MEM_TYPE)
    {
        let mut criterion = Criterion::new("atomic operations", crate::score::amo_score);
        criterion.local_iface_flags = IfaceFlags::PENDING;
        criterion.local_atomic = atomic_matrix_for(ctx.features);
        criterion.remote_atomic = atomic_matrix_for(ctx.features);

        // Forbid peer-to-peer resources unless the caller explicitly whitelisted them for
        // atomics (spec.md §4.4 pass 2). Excluding by (index, resource) predicate rather
        // than filtering into a new slice keeps `resource_index` valid against
        // `ctx.resources`, which the rest of the pipeline (lane table, key construction)
        // indexes into directly.
        let exclude_p2p = |i: usize, r: &TransportResource| r.is_p2p() && !ctx.atomic_tls.contains(&i);

        match add_memaccess_lanes_excluding(
            criterion,
            Usage::AMO,
            ScoreKind::Amo,
            &ctx.resources,
            addresses,
            ctx.estimated_num_endpoints,
            is_reachable,
            &mut lanes,
            &exclude_p2p,
        ) {
            Ok(()) => {}
            Err(e) if allow_am => {
                warn!("amo lanes unavailable ({e}), falling back to am emulation");
                am_emulated = true;
            }
            Err(e) => return Err(e),
        }
    }

    // Pass 3: AM.
    if is_am_required(ctx, params, init_flags, &lanes, am_emulated) {
        let mut criterion = Criterion::new("active messages", crate::score::am_score);
        criterion.local_iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;
        criterion.remote_iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;
        if ctx.features.contains(Features::TAG | Features::WAKEUP) {
            criterion.local_iface_flags |= IfaceFlags::EVENT_RECV;
        }

        let result = select_transport(
            &criterion,
            &ctx.resources,
            addresses,
            ctx.estimated_num_endpoints,
            is_reachable,
        )?;

        // Proxy is needed when the remote interface only ever wakes on a *signaled*
        // receive (never an unsignaled one) and the local transport can't depend on the
        // peer connecting back to it directly: in that case the first AM must be re-sent
        // signaled through whatever lane ends up carrying the wakeup (spec.md §4.2).
        let remote_recv_flags = addresses[result.addr_index].iface_attr.cap_flags
            & (IfaceFlags::EVENT_RECV | IfaceFlags::EVENT_RECV_SIG);
        let needs_proxy = remote_recv_flags == IfaceFlags::EVENT_RECV_SIG
            && !ctx.resources[result.resource_index].is_p2p();

        am_lane_score = result.score;
        let index = lanes.add(result, Usage::AM, ScoreKind::None);
        if needs_proxy {
            lanes.mark_self_proxy(index);
            debug!("am lane {index} marked as its own proxy (remote wakes only on signal)");
        }
        am_lane = Some(index);
    }

    // Pass 4: RMA_BW. Runs for a memory-type endpoint even without TAG (registration-free,
    // since accelerator memory can't be registered the normal way); otherwise only when
    // TAG is requested, since that's the only feature that needs rendezvous RMA.
    if init_flags.contains(EndpointInitFlags::MEM_TYPE) || ctx.features.contains(Features::TAG) {
        let mut criterion = Criterion::new("rendezvous memory access", rma_bw_score);
        criterion.local_iface_flags = IfaceFlags::PUT_ZCOPY | IfaceFlags::GET_ZCOPY;
        criterion.remote_iface_flags = IfaceFlags::PUT_ZCOPY | IfaceFlags::GET_ZCOPY;
        if !init_flags.contains(EndpointInitFlags::MEM_TYPE) {
            criterion.local_md_flags = MdFlags::REG;
            criterion.remote_md_flags = MdFlags::REG;
        }
        if ctx.features.contains(Features::TAG | Features::WAKEUP) {
            criterion.local_iface_flags |= IfaceFlags::EVENT_RECV;
        }

        let mut md_map = HashSet::new();
        add_bw_lanes(
            &criterion,
            Usage::RMA_BW,
            ScoreKind::RmaBw,
            &ctx.resources,
            addresses,
            ctx.estimated_num_endpoints,
            is_reachable,
            &mut lanes,
            ctx.max_rndv_lanes,
            MAX_OP_MDS,
            &mut md_map,
        );
    }

    // Pass 5: TAG. Never attempted for a memory-type endpoint (spec.md §8): hardware tag
    // matching only makes sense for host-memory eager/rendezvous traffic.
    if ctx.features.contains(Features::TAG)
        && params.err_handling_mode == ErrorHandlingMode::None
        && !init_flags.contains(EndpointInitFlags::MEM_TYPE)
    {
        let mut criterion = Criterion::new("hardware tag matching", crate::score::am_score);
        criterion.local_iface_flags = IfaceFlags::TAG_EAGER_BCOPY
            | IfaceFlags::TAG_RNDV_ZCOPY
            | IfaceFlags::GET_ZCOPY
            | IfaceFlags::PENDING;
        criterion.remote_iface_flags = criterion.local_iface_flags;
        criterion.local_md_flags = MdFlags::REG;
        criterion.remote_md_flags = MdFlags::REG;
        if ctx.features.contains(Features::WAKEUP) {
            criterion.local_iface_flags |= IfaceFlags::EVENT_RECV;
        }

        match select_transport(
            &criterion,
            &ctx.resources,
            addresses,
            ctx.estimated_num_endpoints,
            is_reachable,
        ) {
            Ok(result) => {
                let beats_am = am_lane.is_none()
                    || crate::score::score_cmp(result.score, am_lane_score)
                        == std::cmp::Ordering::Greater;
                if beats_am {
                    let remote_recv_flags = addresses[result.addr_index].iface_attr.cap_flags
                        & (IfaceFlags::EVENT_RECV | IfaceFlags::EVENT_RECV_SIG);
                    let needs_proxy = remote_recv_flags == IfaceFlags::EVENT_RECV_SIG
                        && !ctx.resources[result.resource_index].is_p2p();

                    let index = lanes.add(result, Usage::TAG, ScoreKind::None);
                    if needs_proxy {
                        lanes.mark_self_proxy(index);
                        debug!("tag lane {index} marked as its own proxy (remote wakes only on signal)");
                    }
                    tag_lane = Some(index);
                } else {
                    trace!("tag lane score did not beat the am lane; tag matching will run in software");
                }
            }
            Err(e) => {
                trace!("no tag lane available ({e}); tag matching will run in software");
            }
        }
    }

    // Pass 6: AM_BW. Never attempted for a memory-type endpoint (spec.md §8), same
    // reasoning as the TAG pass it exists to support.
    if ctx.features.contains(Features::TAG)
        && ctx.max_eager_lanes > 1
        && !init_flags.contains(EndpointInitFlags::MEM_TYPE)
    {
        if let Some(am_index) = am_lane {
            let am_descriptor = &lanes.lanes[am_index];
            let am_resource = &ctx.resources[am_descriptor.resource_index];
            if !am_resource.is_self_or_shm() {
                let excluded_device = am_resource.device_index;
                let excluded_remote_device = addresses[am_descriptor.addr_index].dev_index;

                let mut criterion = Criterion::new("high-bandwidth active messages", crate::score::am_bw_score);
                criterion.local_iface_flags = IfaceFlags::AM_BCOPY;
                criterion.remote_iface_flags = IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC;
                if ctx.features.contains(Features::WAKEUP) {
                    criterion.local_iface_flags |= IfaceFlags::EVENT_RECV;
                }

                let mut md_map = HashSet::new();
                md_map.insert(am_resource.md_index);

                add_bw_lanes_excluding(
                    &criterion,
                    Usage::AM_BW,
                    ScoreKind::AmBw,
                    &ctx.resources,
                    addresses,
                    ctx.estimated_num_endpoints,
                    is_reachable,
                    &mut lanes,
                    ctx.max_eager_lanes.saturating_sub(1),
                    MAX_OP_MDS,
                    &mut md_map,
                    &[excluded_device],
                    &[excluded_remote_device],
                );
            }
        }
    }

    if lanes.is_empty() {
        return Err(WireupError::Unreachable {
            title: "lane selection",
            reason: "no lane could be selected from any pass".to_string(),
        });
    }

    Ok(PlanOutcome { lanes, am_lane, tag_lane, am_emulated })
}

/// A criterion matching the auxiliary (wireup-message) capability profile: connect-to-
/// interface, bcopy AM, async callback remotely, pending locally (spec.md §4.6 step 5).
pub fn aux_criterion() -> Criterion {
    let mut c = Criterion::new("wireup auxiliary", aux_score);
    c.local_iface_flags = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::PENDING;
    c.remote_iface_flags = IfaceFlags::CONNECT_TO_IFACE | IfaceFlags::AM_BCOPY | IfaceFlags::CB_ASYNC;
    c.allow_aux = true;
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::RemoteIfaceAttr;
    use crate::resource::{Bandwidth, DeviceType, Latency, MdFlags, RegCost};

    fn resource(name: &str, device_index: u32, iface_flags: IfaceFlags) -> TransportResource {
        TransportResource {
            transport_name: name.to_string(),
            device_name: format!("{name}{device_index}"),
            device_type: DeviceType::Network,
            iface_flags,
            md_flags: MdFlags::REG | MdFlags::ALLOC,
            atomic: AtomicMatrix::default(),
            latency: Latency { overhead: 1e-6, growth: 1e-9 },
            bandwidth: Bandwidth { shared: 1e10, dedicated: 0.0 },
            reg_cost: RegCost { overhead: 1e-7, growth: 1e-12 },
            overhead: 1e-7,
            priority: 0,
            max_bcopy: 8192.0,
            device_index,
            md_index: device_index,
            is_aux: false,
        }
    }

    fn address(cap_flags: IfaceFlags, md_flags: MdFlags, dev_index: u32) -> RemoteAddressEntry {
        RemoteAddressEntry {
            device_addr: vec![1, 2, 3],
            iface_addr: Some(vec![4, 5]),
            ep_addr: None,
            iface_attr: RemoteIfaceAttr {
                cap_flags,
                overhead: 1e-7,
                bandwidth: Bandwidth { shared: 1e10, dedicated: 0.0 },
                priority: 0,
                lat_overhead: 1e-6,
                atomic: AtomicMatrix::default(),
            },
            md_flags,
            tl_name_csum: 0,
            md_index: dev_index,
            dev_index,
        }
    }

    #[test]
    fn zero_eager_lanes_is_rejected_up_front() {
        let ctx = WorkerContext {
            resources: vec![],
            features: Features::AM,
            max_eager_lanes: 0,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let err = search_lanes(&ctx, &EndpointParams::default(), EndpointInitFlags::empty(), &[], &|_, _| true)
            .unwrap_err();
        assert!(matches!(err, WireupError::InvalidConfig(_)));
    }

    #[test]
    fn mem_type_endpoint_skips_amo_tag_and_am_bw_passes() {
        let ctx = WorkerContext {
            resources: vec![resource(
                "verbs",
                0,
                IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::PUT_SHORT,
            )],
            features: Features::AM | Features::TAG | Features::AMO32,
            max_eager_lanes: 2,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![address(
            IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::PUT_SHORT,
            MdFlags::empty(),
            0,
        )];

        let outcome = search_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::MEM_TYPE,
            &addrs,
            &|_, _| true,
        )
        .unwrap();

        assert!(outcome.tag_lane.is_none());
        assert!(outcome.lanes.lanes.iter().all(|l| !l.usage.contains(Usage::AMO)));
        assert!(outcome.lanes.lanes.iter().all(|l| !l.usage.contains(Usage::AM_BW)));
    }

    #[test]
    fn am_bw_pass_excludes_the_am_lane_device() {
        let ctx = WorkerContext {
            resources: vec![
                resource("verbs", 0, IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC),
                resource("verbs", 1, IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC),
            ],
            features: Features::AM | Features::TAG,
            max_eager_lanes: 2,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![
            address(IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC, MdFlags::empty(), 0),
            address(IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC, MdFlags::empty(), 1),
        ];

        let outcome = search_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| true,
        )
        .unwrap();

        let am_index = outcome.am_lane.expect("am lane must be selected");
        let am_device = ctx.resources[outcome.lanes.lanes[am_index].resource_index].device_index;

        for lane in outcome.lanes.lanes.iter().filter(|l| l.usage.contains(Usage::AM_BW)) {
            let device = ctx.resources[lane.resource_index].device_index;
            assert_ne!(device, am_device, "am_bw expansion must not reuse the am lane's device");
        }
    }

    #[test]
    fn rma_emulation_fallback_forces_the_am_pass_to_run() {
        // No resource advertises PUT/GET, so the RMA pass can't find anything — it falls
        // back to am_emulated instead of failing outright. `Features::RMA` alone doesn't
        // make the AM pass required, so without the emulation flag forcing it, this would
        // leave the lane table empty (spec.md §8 seed scenario 5).
        let ctx = WorkerContext {
            resources: vec![resource("tcp", 0, IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC)],
            features: Features::RMA,
            max_eager_lanes: 1,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![address(IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC, MdFlags::empty(), 0)];

        let outcome = search_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| true,
        )
        .unwrap();

        assert!(outcome.am_emulated);
        assert!(outcome.am_lane.is_some());
    }
}
