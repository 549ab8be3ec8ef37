//! A selected lane: one resource/address pairing that has been assigned one or more uses.

use bitflags::bitflags;

bitflags! {
    /// Which operation categories a lane has been selected to carry. A single lane can
    /// accumulate several uses as later passes discover they can reuse it (spec.md §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Usage: u8 {
        const AM      = 1 << 0;
        const AM_BW   = 1 << 1;
        const RMA     = 1 << 2;
        const RMA_BW  = 1 << 3;
        const AMO     = 1 << 4;
        const TAG     = 1 << 5;
    }
}

/// One lane in the selection context being built up across passes.
///
/// `proxy_lane` distinguishes three states (spec.md §4.2): `None` means this lane speaks
/// for itself; `Some(i)` where `i` is this lane's own index means it is explicitly marked
/// as its own proxy (set once a later pass decides it must be materialized as a real
/// endpoint rather than folded into another lane); `Some(j)` with `j != i` means this lane
/// is a stand-in for lane `j` and traffic routed to it should really go to `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneDescriptor {
    pub resource_index: usize,
    pub addr_index: usize,
    pub proxy_lane: Option<usize>,
    pub dst_md_index: u32,
    pub usage: Usage,
    pub am_bw_score: f64,
    pub rma_score: f64,
    pub rma_bw_score: f64,
    pub amo_score: f64,
}

impl LaneDescriptor {
    pub fn new(resource_index: usize, addr_index: usize, dst_md_index: u32) -> Self {
        Self {
            resource_index,
            addr_index,
            proxy_lane: None,
            dst_md_index,
            usage: Usage::empty(),
            am_bw_score: 0.0,
            rma_score: 0.0,
            rma_bw_score: 0.0,
            amo_score: 0.0,
        }
    }

    /// Whether this descriptor is a proxy for some other lane (spec.md §4.2). `own_index`
    /// is this lane's position in the owning [`crate::aggregator::LaneTable`]; a lane
    /// marked as its own proxy is not really a proxy, just flagged as self-sufficient.
    pub fn is_proxy(&self, own_index: usize) -> bool {
        match self.proxy_lane {
            Some(target) => target != own_index,
            None => false,
        }
    }
}
