//! Wireup lane-selection engine.
//!
//! At connection setup between two workers, each side enumerates its local transport
//! resources (devices × protocols: RDMA verbs, shared memory, TCP, self-loopback, ...)
//! and receives a packed list of the remote peer's resources. This crate decides which
//! subset of resources, paired with which remote addresses, become the **lanes** of the
//! endpoint: the parallel, typed communication channels used for active messages,
//! one-sided RMA, atomics, and hardware tag matching.
//!
//! The engine is a synchronous, single-shot planner: one call per endpoint, no I/O, no
//! blocking, no retries (selection is deterministic on its inputs). Decoding the peer's
//! packed address into [`RemoteAddressEntry`] values, and actually attaching hardware
//! queue pairs to the lanes this crate selects, are both the caller's responsibility.
//!
//! ```
//! use rdma_wireup::{
//!     select_lanes, EndpointInitFlags, EndpointParams, Features, WorkerContext,
//! };
//!
//! # fn example(resources: Vec<rdma_wireup::TransportResource>, addresses: &[rdma_wireup::RemoteAddressEntry]) -> Result<(), rdma_wireup::WireupError> {
//! let ctx = WorkerContext {
//!     resources,
//!     features: Features::AM,
//!     max_eager_lanes: 1,
//!     max_rndv_lanes: 1,
//!     estimated_num_endpoints: 1,
//!     atomic_tls: Default::default(),
//! };
//! let params = EndpointParams::default();
//! let key = select_lanes(&ctx, &params, EndpointInitFlags::empty(), addresses, &|_, _| true)?;
//! let _ = key.am_lane;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod aggregator;
pub mod criteria;
pub mod error;
pub mod expand;
pub mod key;
pub mod lane;
pub mod matcher;
pub mod resource;
pub mod score;
pub mod selector;

use log::trace;

pub use address::{RemoteAddressEntry, RemoteIfaceAttr};
pub use error::WireupError;
pub use key::{EndpointConfigKey, LaneInfo, MAX_LANES, MAX_OP_MDS};
pub use lane::{LaneDescriptor, Usage};
pub use resource::{
    AtomicMatrix, AtomicOps, Bandwidth, DeviceType, IfaceFlags, Latency, MdFlags, RegCost,
    TransportResource,
};
pub use selector::{EndpointInitFlags, EndpointParams, ErrorHandlingMode, Features, WorkerContext};

/// Runs all six selection passes against `addresses` and materializes the resulting
/// [`EndpointConfigKey`].
///
/// `is_reachable` delegates the one decision this crate does not make itself: whether a
/// given local resource can actually route to a given remote address (same transport
/// family, mutually routable device addresses). Injecting it as a closure keeps the
/// planner's core logic testable without a live transport layer.
///
/// Returns [`WireupError::Unreachable`] if no lane could be selected at all, or if a
/// required pass fails and active-message emulation is not permitted for this endpoint.
pub fn select_lanes(
    ctx: &WorkerContext,
    params: &EndpointParams,
    init_flags: EndpointInitFlags,
    addresses: &[RemoteAddressEntry],
    is_reachable: &dyn Fn(&TransportResource, &RemoteAddressEntry) -> bool,
) -> Result<EndpointConfigKey, WireupError> {
    trace!(
        "selecting lanes: {} local resources, {} remote addresses",
        ctx.resources.len(),
        addresses.len()
    );

    let outcome = selector::search_lanes(ctx, params, init_flags, addresses, is_reachable)?;
    let config = key::construct_lanes(outcome, &ctx.resources, addresses);

    trace!(
        "selected {} lanes (am_lane={:?}, tag_lane={:?}, wireup_lane={:?}, am_emulated={})",
        config.lanes.len(),
        config.am_lane,
        config.tag_lane,
        config.wireup_lane,
        config.am_emulated
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource::{Bandwidth, DeviceType, Latency, RegCost};

    fn resource(name: &str, device_type: DeviceType, iface_flags: IfaceFlags) -> TransportResource {
        TransportResource {
            transport_name: name.to_string(),
            device_name: format!("{name}0"),
            device_type,
            iface_flags,
            md_flags: MdFlags::REG | MdFlags::ALLOC,
            atomic: AtomicMatrix::default(),
            latency: Latency { overhead: 1e-6, growth: 1e-9 },
            bandwidth: Bandwidth { shared: 1e10, dedicated: 0.0 },
            reg_cost: RegCost { overhead: 1e-7, growth: 1e-12 },
            overhead: 1e-7,
            priority: 0,
            max_bcopy: 8192.0,
            device_index: 0,
            md_index: 0,
            is_aux: false,
        }
    }

    fn address(cap_flags: IfaceFlags, md_flags: MdFlags) -> RemoteAddressEntry {
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
            md_index: 0,
            dev_index: 0,
        }
    }

    #[test]
    fn am_only_feature_set_yields_a_single_am_lane() {
        let ctx = WorkerContext {
            resources: vec![resource(
                "tcp",
                DeviceType::Network,
                IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
            )],
            features: Features::AM,
            max_eager_lanes: 1,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![address(
            IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
            MdFlags::empty(),
        )];

        let key = select_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| true,
        )
        .unwrap();

        assert_eq!(key.lanes.len(), 1);
        assert_eq!(key.am_lane, Some(0));
        assert_eq!(key.am_bw_lanes.first(), Some(&Some(0)));
    }

    #[test]
    fn no_reachable_resources_is_unreachable() {
        let ctx = WorkerContext {
            resources: vec![resource(
                "tcp",
                DeviceType::Network,
                IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
            )],
            features: Features::AM,
            max_eager_lanes: 1,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![address(
            IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC,
            MdFlags::empty(),
        )];

        let err = select_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| false,
        )
        .unwrap_err();

        assert!(matches!(err, WireupError::Unreachable { .. }));
    }

    #[test]
    fn running_selection_twice_is_idempotent() {
        let ctx = WorkerContext {
            resources: vec![resource(
                "verbs",
                DeviceType::Network,
                IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::PUT_BCOPY | IfaceFlags::GET_BCOPY,
            )],
            features: Features::AM | Features::RMA,
            max_eager_lanes: 1,
            max_rndv_lanes: 1,
            estimated_num_endpoints: 1,
            atomic_tls: Default::default(),
        };
        let addrs = vec![address(
            IfaceFlags::AM_BCOPY | IfaceFlags::CB_SYNC | IfaceFlags::PUT_BCOPY | IfaceFlags::GET_BCOPY,
            MdFlags::REG,
        )];

        let first = select_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| true,
        )
        .unwrap();
        let second = select_lanes(
            &ctx,
            &EndpointParams::default(),
            EndpointInitFlags::empty(),
            &addrs,
            &|_, _| true,
        )
        .unwrap();

        assert_eq!(first, second);
    }
}
