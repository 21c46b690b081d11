//! Capability allowlist for isolated instances.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use playgate_core::SharedCapability;

/// One host service an isolated instance may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Drawing surface.
    Surface,
    /// Frame scheduling.
    FrameScheduler,
    /// Monotonic and wall clocks.
    Clock,
    /// Pseudo-random numbers.
    Random,
    /// Deferred timers.
    Timers,
    /// Decoding of inline media (data URIs).
    MediaDecoder,
    /// A shared library granted on request.
    Shared(SharedCapability),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface => f.write_str("surface"),
            Self::FrameScheduler => f.write_str("frame_scheduler"),
            Self::Clock => f.write_str("clock"),
            Self::Random => f.write_str("random"),
            Self::Timers => f.write_str("timers"),
            Self::MediaDecoder => f.write_str("media_decoder"),
            Self::Shared(shared) => write!(f, "shared:{}", shared),
        }
    }
}

/// Services every instance receives.
pub const BASELINE: [Capability; 6] = [
    Capability::Surface,
    Capability::FrameScheduler,
    Capability::Clock,
    Capability::Random,
    Capability::Timers,
    Capability::MediaDecoder,
];

/// The immutable set of capabilities granted to one instance.
///
/// A set is built from the baseline plus whatever shared capabilities the
/// module requested at submission. There is no way to remove an entry or to
/// grant anything outside [`Capability`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    granted: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// The baseline allowlist alone.
    pub fn baseline() -> Arc<Self> {
        Arc::new(Self {
            granted: BASELINE.into_iter().collect(),
        })
    }

    /// The baseline plus the requested shared capabilities.
    pub fn for_request(shared: &BTreeSet<SharedCapability>) -> Arc<Self> {
        let granted = BASELINE
            .into_iter()
            .chain(shared.iter().copied().map(Capability::Shared))
            .collect();
        Arc::new(Self { granted })
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.granted.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}
