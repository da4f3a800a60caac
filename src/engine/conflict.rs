use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::LimitExceeded("empty span"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// True iff `span` overlaps any placement already committed on `studio_id`.
///
/// Linear scan; touching spans do not conflict.
pub fn conflicts(studio_id: Ulid, span: &Span, committed: &[Placement]) -> bool {
    committed
        .iter()
        .any(|p| p.studio_id == studio_id && span.start < p.span.end && span.end > p.span.start)
}

/// Committed schedules of one studio, sorted by `span.start`.
///
/// Invariant: entries are pairwise disjoint, so ends are sorted too.
#[derive(Debug, Clone)]
pub struct StudioTimeline {
    pub studio: Studio,
    entries: Vec<(Span, Ulid)>,
}

impl StudioTimeline {
    pub fn new(studio: Studio) -> Self {
        Self {
            studio,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert maintaining sort order by start.
    pub fn insert(&mut self, span: Span, schedule_id: Ulid) {
        let pos = self.entries.partition_point(|(s, _)| s.start <= span.start);
        self.entries.insert(pos, (span, schedule_id));
    }

    /// Entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, Ulid)> {
        let right_bound = self.entries.partition_point(|(s, _)| s.start < query.end);
        self.entries[..right_bound]
            .iter()
            .rev()
            .take_while(move |(s, _)| s.end > query.start)
    }
}

/// Indexed equivalent of [`conflicts`] against durable state.
pub(crate) fn check_no_conflict(timeline: &StudioTimeline, span: &Span) -> Result<(), EngineError> {
    match timeline.overlapping(span).next() {
        Some((_, id)) => Err(EngineError::Conflict(*id)),
        None => Ok(()),
    }
}
