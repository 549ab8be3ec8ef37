//! The input to one transport-matcher pass.

use crate::resource::{AtomicMatrix, IfaceFlags, MdFlags};
use crate::score::ScoreInputs;

/// A required-capability description plus a cost model, fed to [`crate::matcher::select_transport`].
///
/// Built fresh for each selector pass (spec.md §4.4); cheap to construct and clone.
#[derive(Clone)]
pub struct Criterion {
    /// Used only in diagnostics and trace logs.
    pub title: &'static str,
    pub local_iface_flags: IfaceFlags,
    pub remote_iface_flags: IfaceFlags,
    pub local_md_flags: MdFlags,
    pub remote_md_flags: MdFlags,
    pub local_atomic: AtomicMatrix,
    pub remote_atomic: AtomicMatrix,
    pub score_fn: fn(&ScoreInputs) -> f64,
    /// Whether resources marked [`crate::resource::TransportResource::is_aux`] may be
    /// matched by this criterion (only the wireup-message criterion sets this).
    pub allow_aux: bool,
}

impl Criterion {
    /// A criterion with no capability requirements and the given title/score function;
    /// callers fill in flags as needed. Mirrors the `= {0}` zero-initialization idiom the
    /// original uses for `ucp_wireup_criteria_t` before setting only the fields a given
    /// pass cares about.
    pub fn new(title: &'static str, score_fn: fn(&ScoreInputs) -> f64) -> Self {
        Self {
            title,
            local_iface_flags: IfaceFlags::empty(),
            remote_iface_flags: IfaceFlags::empty(),
            local_md_flags: MdFlags::empty(),
            remote_md_flags: MdFlags::empty(),
            local_atomic: AtomicMatrix::default(),
            remote_atomic: AtomicMatrix::default(),
            score_fn,
            allow_aux: false,
        }
    }
}
