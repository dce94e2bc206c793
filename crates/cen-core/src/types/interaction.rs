//! Time-stamped events recorded on edges.

use std::sync::Weak;

use crate::payload::Payload;
use crate::types::edge::{Edge, EdgeRef};

/// A time-stamped event on an edge.
///
/// Interactions are not atomic: they have a start time (UNIX epoch
/// milliseconds) and a duration in milliseconds. They are immutable after
/// creation and ordered by insertion on their owning edge; create them via
/// [`Edge::add_interaction`] or [`Edge::add_detected_interaction`].
#[derive(Clone)]
pub struct Interaction {
    edge: Weak<Edge>,
    start_time: i64,
    duration: i64,
    data: Option<Payload>,
}

impl Interaction {
    pub(crate) fn record(
        edge: Weak<Edge>,
        start_time: i64,
        duration: i64,
        data: Option<Payload>,
    ) -> Self {
        Self {
            edge,
            start_time,
            duration,
            data,
        }
    }

    /// The edge the interaction was recorded on, while it is alive.
    pub fn edge(&self) -> Option<EdgeRef> {
        self.edge.upgrade()
    }

    /// When the interaction started, in epoch milliseconds.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// When the interaction ended, in epoch milliseconds.
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }

    /// How long the interaction lasted, in milliseconds.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// The interaction's data.
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// The runtime type of the interaction's data; an empty string when the
    /// interaction carries none.
    pub fn kind(&self) -> &str {
        self.data.as_ref().map(Payload::kind).unwrap_or("")
    }
}

impl PartialEq for Interaction {
    /// Structural equality; the owning edge is identity, not content.
    fn eq(&self, other: &Self) -> bool {
        self.start_time == other.start_time
            && self.duration == other.duration
            && self.data == other.data
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interaction")
            .field("start_time", &self.start_time)
            .field("duration", &self.duration)
            .field("kind", &self.kind())
            .finish()
    }
}
