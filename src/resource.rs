//! Local transport resource data model.
//!
//! A [`TransportResource`] is one (transport, device) pair a worker can offer as a lane.
//! Everything here is read-only input to the selection engine; nothing in this module
//! performs I/O or touches hardware.

use bitflags::bitflags;

bitflags! {
    /// Capability flags carried on a transport interface.
    ///
    /// This is the local counterpart of [`crate::address::RemoteIfaceAttr::cap_flags`].
    /// Only the flags a `Criterion` can actually require are modeled; flags that exist on
    /// the wire but this engine never checks are intentionally omitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IfaceFlags: u32 {
        const AM_SHORT               = 1 << 0;
        const AM_BCOPY                = 1 << 1;
        const AM_ZCOPY                = 1 << 2;
        const PUT_SHORT               = 1 << 3;
        const PUT_BCOPY               = 1 << 4;
        const PUT_ZCOPY               = 1 << 5;
        const GET_SHORT               = 1 << 6;
        const GET_BCOPY               = 1 << 7;
        const GET_ZCOPY               = 1 << 8;
        const ERRHANDLE_PEER_FAILURE  = 1 << 9;
        const CONNECT_TO_IFACE        = 1 << 10;
        const CONNECT_TO_EP           = 1 << 11;
        const CB_SYNC                 = 1 << 12;
        const CB_ASYNC                = 1 << 13;
        const EVENT_RECV              = 1 << 14;
        const EVENT_RECV_SIG          = 1 << 15;
        const PENDING                 = 1 << 16;
        const TAG_EAGER_BCOPY         = 1 << 17;
        const TAG_EAGER_ZCOPY         = 1 << 18;
        const TAG_RNDV_ZCOPY          = 1 << 19;
    }
}

impl IfaceFlags {
    /// The subset of flags the (out-of-scope) address codec actually transmits on the
    /// wire. `Matcher` asserts every criterion's remote requirement is a subset of this
    /// (spec.md §4.1): a criterion that asks for a flag the codec never packs can never be
    /// satisfied, which almost always means the criterion is wrong, not the peer.
    pub const WIRE_TRANSMITTED: Self = Self::from_bits_truncate(
        Self::CONNECT_TO_IFACE.bits()
            | Self::CB_SYNC.bits()
            | Self::CB_ASYNC.bits()
            | Self::AM_BCOPY.bits()
            | Self::PUT_SHORT.bits()
            | Self::PUT_BCOPY.bits()
            | Self::PUT_ZCOPY.bits()
            | Self::GET_SHORT.bits()
            | Self::GET_BCOPY.bits()
            | Self::GET_ZCOPY.bits()
            | Self::TAG_EAGER_BCOPY.bits()
            | Self::TAG_RNDV_ZCOPY.bits()
            | Self::EVENT_RECV.bits()
            | Self::EVENT_RECV_SIG.bits()
            | Self::PENDING.bits(),
    );

    /// `self` provides every flag `required` asks for.
    pub fn contains_all(self, required: Self) -> bool {
        self.contains(required)
    }

    /// Name of the lowest-numbered flag present in `required` but missing from `self`,
    /// in the lower-case phrase style of the original's `ucp_wireup_iface_flags` table.
    pub fn first_missing_name(self, required: Self) -> Option<&'static str> {
        const NAMES: [(IfaceFlags, &str); 20] = [
            (IfaceFlags::AM_SHORT, "am short"),
            (IfaceFlags::AM_BCOPY, "am bcopy"),
            (IfaceFlags::AM_ZCOPY, "am zcopy"),
            (IfaceFlags::PUT_SHORT, "put short"),
            (IfaceFlags::PUT_BCOPY, "put bcopy"),
            (IfaceFlags::PUT_ZCOPY, "put zcopy"),
            (IfaceFlags::GET_SHORT, "get short"),
            (IfaceFlags::GET_BCOPY, "get bcopy"),
            (IfaceFlags::GET_ZCOPY, "get zcopy"),
            (IfaceFlags::ERRHANDLE_PEER_FAILURE, "peer failure handler"),
            (IfaceFlags::CONNECT_TO_IFACE, "connect to iface"),
            (IfaceFlags::CONNECT_TO_EP, "connect to ep"),
            (IfaceFlags::CB_SYNC, "sync callback"),
            (IfaceFlags::CB_ASYNC, "async callback"),
            (IfaceFlags::EVENT_RECV, "tag or active message event"),
            (IfaceFlags::EVENT_RECV_SIG, "signaled message event"),
            (IfaceFlags::PENDING, "pending"),
            (IfaceFlags::TAG_EAGER_BCOPY, "tag eager bcopy"),
            (IfaceFlags::TAG_EAGER_ZCOPY, "tag eager zcopy"),
            (IfaceFlags::TAG_RNDV_ZCOPY, "tag rndv zcopy"),
        ];
        let missing = required & !self;
        NAMES
            .iter()
            .find(|(bit, _)| missing.contains(*bit))
            .map(|(_, name)| *name)
    }
}

bitflags! {
    /// Capability flags carried on a memory domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MdFlags: u32 {
        const ALLOC     = 1 << 0;
        const REG       = 1 << 1;
        const NEED_RKEY = 1 << 2;
        const SOCKADDR  = 1 << 3;
    }
}

impl MdFlags {
    pub fn contains_all(self, required: Self) -> bool {
        self.contains(required)
    }

    /// Name of the lowest-numbered flag present in `required` but missing from `self`,
    /// matching the phrase style of the original's `ucp_wireup_md_flags` table.
    pub fn first_missing_name(self, required: Self) -> Option<&'static str> {
        const NAMES: [(MdFlags, &str); 4] = [
            (MdFlags::ALLOC, "memory allocation"),
            (MdFlags::REG, "memory registration"),
            (MdFlags::NEED_RKEY, "remote key support"),
            (MdFlags::SOCKADDR, "sockaddr support"),
        ];
        let missing = required & !self;
        NAMES
            .iter()
            .find(|(bit, _)| missing.contains(*bit))
            .map(|(_, name)| *name)
    }
}

bitflags! {
    /// One operand-size row of the atomic-op capability matrix: which of
    /// add/and/or/xor/swap/cswap the interface supports for this op kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AtomicOps: u8 {
        const ADD   = 1 << 0;
        const AND   = 1 << 1;
        const OR    = 1 << 2;
        const XOR   = 1 << 3;
        const SWAP  = 1 << 4;
        const CSWAP = 1 << 5;
    }
}

impl AtomicOps {
    /// Name of the lowest-numbered op bit present in `required` but missing from `self`.
    fn first_missing_name(self, required: Self) -> Option<&'static str> {
        const NAMES: [(AtomicOps, &str); 6] = [
            (AtomicOps::ADD, "add"),
            (AtomicOps::AND, "and"),
            (AtomicOps::OR, "or"),
            (AtomicOps::XOR, "xor"),
            (AtomicOps::SWAP, "swap"),
            (AtomicOps::CSWAP, "cswap"),
        ];
        let missing = required & !self;
        NAMES
            .iter()
            .find(|(bit, _)| missing.contains(*bit))
            .map(|(_, name)| *name)
    }
}

/// The 32/64-bit × {non-fetching, fetching} atomic operation capability matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtomicMatrix {
    pub op32: AtomicOps,
    pub fop32: AtomicOps,
    pub op64: AtomicOps,
    pub fop64: AtomicOps,
}

impl AtomicMatrix {
    pub fn contains_all(self, required: Self) -> bool {
        self.op32.contains(required.op32)
            && self.fop32.contains(required.fop32)
            && self.op64.contains(required.op64)
            && self.fop64.contains(required.fop64)
    }

    /// A human-readable name for the first required-but-missing atomic flag, checked in
    /// the same order the original wireup code checks them: 32-bit op, 64-bit op, 32-bit
    /// fetch-op, 64-bit fetch-op.
    pub fn first_missing_desc(self, required: Self) -> Option<String> {
        if let Some(name) = self.op32.first_missing_name(required.op32) {
            return Some(format!("32-bit atomic {name}"));
        }
        if let Some(name) = self.op64.first_missing_name(required.op64) {
            return Some(format!("64-bit atomic {name}"));
        }
        if let Some(name) = self.fop32.first_missing_name(required.fop32) {
            return Some(format!("32-bit atomic fetch-{name}"));
        }
        if let Some(name) = self.fop64.first_missing_name(required.fop64) {
            return Some(format!("64-bit atomic fetch-{name}"));
        }
        None
    }
}

/// Where a transport resource sits in the local device hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Loopback to the same process.
    SelfLoopback,
    /// Shared memory between processes on one host.
    SharedMemory,
    /// A real network device (verbs NIC, TCP NIC, ...).
    Network,
}

/// One-sided latency model: a fixed overhead plus a term that grows with the number of
/// endpoints the worker expects to maintain (more endpoints sharing one interface means
/// more per-peer bookkeeping on the critical path).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    pub overhead: f64,
    pub growth: f64,
}

/// Bandwidth split into a part shared across all endpoints on the interface and a part
/// dedicated to each one; see [`crate::score::effective_bandwidth`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bandwidth {
    pub shared: f64,
    pub dedicated: f64,
}

/// Memory-registration cost model for a memory domain: a fixed overhead plus a
/// per-byte growth term, used by the RMA_BW scorer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegCost {
    pub overhead: f64,
    pub growth: f64,
}

/// A local (transport, device) pair the worker can offer as a lane.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResource {
    pub transport_name: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub iface_flags: IfaceFlags,
    pub md_flags: MdFlags,
    pub atomic: AtomicMatrix,
    pub latency: Latency,
    pub bandwidth: Bandwidth,
    pub reg_cost: RegCost,
    /// Fixed per-message processing overhead, distinct from `latency.overhead` (the
    /// interface's idle-to-first-byte latency floor).
    pub overhead: f64,
    pub priority: i32,
    /// Largest buffer-copy active-message payload this interface can send in one call;
    /// feeds the AM_BW scorer's size term.
    pub max_bcopy: f64,
    /// Device index, for the device bitmaps the bandwidth expander clears as it picks.
    pub device_index: u32,
    /// Memory-domain index; resources sharing an MD share a registration cache.
    pub md_index: u32,
    /// Auxiliary resources (e.g. a bootstrap-only transport) only participate in passes
    /// whose criterion explicitly allows them.
    pub is_aux: bool,
}

impl TransportResource {
    /// A peer-to-peer transport requires both endpoints to be connected symmetrically
    /// (`CONNECT_TO_EP`); such a transport cannot host an AMO lane unless the caller
    /// explicitly whitelists it (spec.md §4.4 pass 2), and needs AM for wireup (§4.4 pass 3).
    pub fn is_p2p(&self) -> bool {
        self.iface_flags.contains(IfaceFlags::CONNECT_TO_EP)
    }

    /// Lanes on self/shared-memory transports never benefit from further bandwidth
    /// expansion (spec.md §4.5(d)).
    pub fn is_self_or_shm(&self) -> bool {
        matches!(
            self.device_type,
            DeviceType::SelfLoopback | DeviceType::SharedMemory
        )
    }
}
