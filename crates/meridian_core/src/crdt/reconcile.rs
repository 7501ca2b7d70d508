//! # Reconciliation
//!
//! Applies incoming batches to an engine. Every message is decoded and applied
//! on its own: a bad message is counted, logged and skipped, and never leaves a
//! half-applied value behind.
//!
//! ## Conflict rules
//!
//! - DELETE_ENTITY removes every component and tombstones the entity version.
//!   Later messages for that version are dropped, in this batch and after.
//! - LWW (PUT and DELETE_COMPONENT): the greater timestamp wins. At equal
//!   timestamps a tombstone beats data, a longer payload beats a shorter one,
//!   then the lexicographically greater payload wins. Identical state is a
//!   no-op.
//! - APPEND: inserted in value-timestamp order, oldest evicted past the bound.
//!   Exact duplicates are ignored.
//! - Unknown component ids and kind mismatches are skipped with a warning.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::codec::{CrdtMessage, MessageReader};
use crate::ecs::{ComponentStore, Engine};
use crate::error::CodecError;

/// Result of applying one message to a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state changed.
    Applied,
    /// Local state is newer. The local entry is queued to go back out.
    Outdated,
    /// The message matched the local state exactly.
    Unchanged,
    /// The payload did not decode.
    Malformed(CodecError),
}

/// Which side of an LWW conflict survives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LwwResolution {
    /// Take the incoming state.
    AcceptIncoming,
    /// Keep the local state.
    KeepLocal,
    /// Both sides hold the same state.
    Identical,
}

/// Decides an LWW conflict.
///
/// `None` payloads are tombstones. `local` is `None` when the entity never
/// had the component.
#[must_use]
pub fn resolve_lww(
    local: Option<(u32, Option<&[u8]>)>,
    incoming_timestamp: u32,
    incoming: Option<&[u8]>,
) -> LwwResolution {
    let Some((local_timestamp, local_data)) = local else {
        return LwwResolution::AcceptIncoming;
    };
    match incoming_timestamp.cmp(&local_timestamp) {
        Ordering::Greater => LwwResolution::AcceptIncoming,
        Ordering::Less => LwwResolution::KeepLocal,
        Ordering::Equal => match compare_states(incoming, local_data) {
            Ordering::Greater => LwwResolution::AcceptIncoming,
            Ordering::Less => LwwResolution::KeepLocal,
            Ordering::Equal => LwwResolution::Identical,
        },
    }
}

/// Total order on states at equal timestamps.
fn compare_states(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// Counters for one applied batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Messages that changed local state.
    pub applied: usize,
    /// Messages older than local state.
    pub outdated: usize,
    /// Messages identical to local state.
    pub unchanged: usize,
    /// Messages for removed entities.
    pub dropped_removed_entity: usize,
    /// Messages for component ids this engine does not know.
    pub unknown_component: usize,
    /// Messages that failed to decode.
    pub malformed: usize,
    /// Messages whose type does not fit the component kind.
    pub kind_mismatch: usize,
}

impl ApplyReport {
    /// Total messages seen.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied
            + self.outdated
            + self.unchanged
            + self.dropped_removed_entity
            + self.unknown_component
            + self.malformed
            + self.kind_mismatch
    }

    /// Messages that were skipped (not applied, not a valid conflict loss).
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.dropped_removed_entity + self.unknown_component + self.malformed + self.kind_mismatch
    }

    /// Adds the counters of `other` to this report.
    pub fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.outdated += other.outdated;
        self.unchanged += other.unchanged;
        self.dropped_removed_entity += other.dropped_removed_entity;
        self.unknown_component += other.unknown_component;
        self.malformed += other.malformed;
        self.kind_mismatch += other.kind_mismatch;
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Outdated => self.outdated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

/// Applies every message of `bytes` to `engine`.
pub fn apply_batch(engine: &mut Engine, bytes: &[u8]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for item in MessageReader::new(bytes) {
        match item {
            Ok(message) => apply_message(engine, message, &mut report),
            Err(err) => {
                warn!(error = %err, "skipping corrupt CRDT message");
                report.malformed += 1;
            }
        }
    }
    if report.skipped() > 0 {
        debug!(?report, "batch applied with skipped messages");
    }
    report
}

fn apply_message(engine: &mut Engine, message: CrdtMessage, report: &mut ApplyReport) {
    let entity = message.entity();

    let component_id = match message {
        CrdtMessage::DeleteEntity { entity } => {
            if engine.apply_remote_entity_removal(entity) {
                report.applied += 1;
            } else {
                report.unchanged += 1;
            }
            return;
        }
        CrdtMessage::PutComponent { component_id, .. }
        | CrdtMessage::DeleteComponent { component_id, .. }
        | CrdtMessage::AppendValue { component_id, .. } => component_id,
    };

    let Some(store) = engine.store(component_id) else {
        warn!(component_id, entity = %entity, "skipping message for unknown component");
        report.unknown_component += 1;
        return;
    };
    let kind_matches = matches!(
        (&message, store),
        (
            CrdtMessage::PutComponent { .. } | CrdtMessage::DeleteComponent { .. },
            ComponentStore::LastWriteWins(_)
        ) | (CrdtMessage::AppendValue { .. }, ComponentStore::GrowOnly(_))
    );
    if !kind_matches {
        warn!(
            component_id,
            entity = %entity,
            message_type = ?message.message_type(),
            kind = %store.kind(),
            "skipping message whose type does not fit the component kind"
        );
        report.kind_mismatch += 1;
        return;
    }

    if !engine.entities_mut().update_used_entity(entity) {
        debug!(component_id, entity = %entity, "dropping message for removed entity");
        report.dropped_removed_entity += 1;
        return;
    }

    let Some(store) = engine.store_mut(component_id) else {
        return;
    };
    let outcome = match (message, store) {
        (
            CrdtMessage::PutComponent {
                timestamp, data, ..
            },
            ComponentStore::LastWriteWins(store),
        ) => store.apply_put(entity, timestamp, &data),
        (CrdtMessage::DeleteComponent { timestamp, .. }, ComponentStore::LastWriteWins(store)) => {
            store.apply_delete(entity, timestamp)
        }
        (CrdtMessage::AppendValue { data, .. }, ComponentStore::GrowOnly(store)) => {
            store.apply_append(entity, &data)
        }
        _ => return,
    };
    if let ApplyOutcome::Malformed(err) = &outcome {
        warn!(component_id, entity = %entity, error = %err, "skipping undecodable component payload");
    }
    report.record(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_local_accepts() {
        assert_eq!(resolve_lww(None, 0, Some(b"a")), LwwResolution::AcceptIncoming);
        assert_eq!(resolve_lww(None, 0, None), LwwResolution::AcceptIncoming);
    }

    #[test]
    fn test_timestamp_dominates() {
        let local = Some((5, Some(&b"zzzz"[..])));
        assert_eq!(resolve_lww(local, 6, Some(b"a")), LwwResolution::AcceptIncoming);
        assert_eq!(resolve_lww(local, 4, Some(b"zzzzzz")), LwwResolution::KeepLocal);
        assert_eq!(resolve_lww(local, 4, None), LwwResolution::KeepLocal);
    }

    #[test]
    fn test_tombstone_wins_tie() {
        assert_eq!(
            resolve_lww(Some((3, Some(&b"abc"[..]))), 3, None),
            LwwResolution::AcceptIncoming
        );
        assert_eq!(resolve_lww(Some((3, None)), 3, Some(b"abc")), LwwResolution::KeepLocal);
        assert_eq!(resolve_lww(Some((3, None)), 3, None), LwwResolution::Identical);
    }

    #[test]
    fn test_data_tie_break() {
        let local = Some((3, Some(&b"bb"[..])));
        assert_eq!(resolve_lww(local, 3, Some(b"aaa")), LwwResolution::AcceptIncoming);
        assert_eq!(resolve_lww(local, 3, Some(b"c")), LwwResolution::KeepLocal);
        assert_eq!(resolve_lww(local, 3, Some(b"bc")), LwwResolution::AcceptIncoming);
        assert_eq!(resolve_lww(local, 3, Some(b"ba")), LwwResolution::KeepLocal);
        assert_eq!(resolve_lww(local, 3, Some(b"bb")), LwwResolution::Identical);
    }

    #[test]
    fn test_report_totals() {
        let mut report = ApplyReport::default();
        report.record(ApplyOutcome::Applied);
        report.record(ApplyOutcome::Outdated);
        report.record(ApplyOutcome::Malformed(CodecError::InvalidUtf8));
        report.unknown_component += 1;
        assert_eq!(report.total(), 4);
        assert_eq!(report.skipped(), 2);
    }
}
