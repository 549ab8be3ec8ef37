//! Errors the selection engine can report.

use thiserror::Error;

/// Failure modes of [`crate::select_lanes`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WireupError {
    /// No local/remote resource pair satisfied a criterion.
    #[error("{title}: {reason}")]
    Unreachable {
        /// The criterion's title (e.g. `"active messages"`), for log correlation.
        title: &'static str,
        reason: String,
    },
    /// The caller asked for an endpoint configuration this engine cannot build.
    #[error("invalid endpoint configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Whether each requirement category was satisfied by at least one candidate, plus (when
/// it wasn't) the specific missing flag named off the first candidate in that category —
/// mirrors `ucp_wireup_get_missing_flag_desc`/`ucp_wireup_get_missing_amo_flag_desc`, which
/// name one concrete flag rather than the whole bitmask.
pub(crate) struct MissingRequirement {
    pub local_flags_ok: bool,
    pub remote_flags_ok: bool,
    pub local_md_ok: bool,
    pub remote_md_ok: bool,
    pub local_atomic_ok: bool,
    pub remote_atomic_ok: bool,
    pub local_flags_desc: Option<&'static str>,
    pub remote_flags_desc: Option<&'static str>,
    pub local_md_desc: Option<&'static str>,
    pub remote_md_desc: Option<&'static str>,
    pub local_atomic_desc: Option<String>,
    pub remote_atomic_desc: Option<String>,
}

/// Renders why no candidate matched, picking the single most informative missing
/// requirement rather than dumping the whole criterion (mirrors the original's one-reason
/// diagnostic in `ucp_wireup_select_transport`), naming the specific flag when one is known.
pub(crate) fn missing_requirement_reason(m: &MissingRequirement) -> String {
    if !m.remote_flags_ok {
        match m.remote_flags_desc {
            Some(desc) => format!("no peer interface supports {desc}"),
            None => "no peer interface advertises the required capability flags".to_string(),
        }
    } else if !m.local_flags_ok {
        match m.local_flags_desc {
            Some(desc) => format!("no local interface supports {desc}"),
            None => "no local interface supports the required capability flags".to_string(),
        }
    } else if !m.remote_md_ok {
        match m.remote_md_desc {
            Some(desc) => format!("no peer memory domain supports {desc}"),
            None => "no peer memory domain advertises the required flags".to_string(),
        }
    } else if !m.local_md_ok {
        match m.local_md_desc {
            Some(desc) => format!("no local memory domain supports {desc}"),
            None => "no local memory domain supports the required flags".to_string(),
        }
    } else if !m.remote_atomic_ok {
        match &m.remote_atomic_desc {
            Some(desc) => format!("no peer interface supports {desc}"),
            None => "no peer interface supports the required atomic operations".to_string(),
        }
    } else if !m.local_atomic_ok {
        match &m.local_atomic_desc {
            Some(desc) => format!("no local interface supports {desc}"),
            None => "no local interface supports the required atomic operations".to_string(),
        }
    } else {
        "no reachable local/remote pair was found".to_string()
    }
}
