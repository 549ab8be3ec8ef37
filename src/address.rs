//! Decoded remote address entries.
//!
//! The address codec that packs/unpacks a peer's worker descriptor into these entries is
//! an external collaborator (spec.md §1); this crate only consumes its output.

use crate::resource::{AtomicMatrix, Bandwidth, IfaceFlags, MdFlags};

/// Remote interface attributes, as decoded from the peer's packed address.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteIfaceAttr {
    pub cap_flags: IfaceFlags,
    /// Per-message processing overhead on the remote side.
    pub overhead: f64,
    pub bandwidth: Bandwidth,
    pub priority: i32,
    /// Latency overhead floor, distinct from `overhead` (see [`crate::resource::Latency`]).
    pub lat_overhead: f64,
    pub atomic: AtomicMatrix,
}

/// One remote resource a peer has offered, as it appears in the decoded address list.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAddressEntry {
    /// Opaque device-address bytes; only the (out-of-scope) reachability check interprets
    /// these.
    pub device_addr: Vec<u8>,
    /// Opaque interface-address bytes, present when the peer's transport accepts
    /// `CONNECT_TO_IFACE`.
    pub iface_addr: Option<Vec<u8>>,
    /// Opaque endpoint-address bytes, present when the peer's transport requires
    /// `CONNECT_TO_EP` (peer-to-peer).
    pub ep_addr: Option<Vec<u8>>,
    pub iface_attr: RemoteIfaceAttr,
    pub md_flags: MdFlags,
    /// Checksum of the remote transport's name; diagnostics only, never a routing key.
    pub tl_name_csum: u16,
    pub md_index: u32,
    pub dev_index: u32,
}
