//! Selection cascade: teacher → class → student pool.
//!
//! Each level holds a selection, an option list and an epoch. Selecting at
//! one level synchronously invalidates everything below it and hands back a
//! [`FetchTicket`] for the direct child. The ticket carries the child's epoch
//! at dispatch time; a result is applied only if that epoch is still current
//! and the fetch is still the live one, so the last selection always wins no
//! matter in which order responses arrive.
//!
//! ```text
//!            select / reload              on_resolved(ok)
//! Empty ───────────────────────▶ Loading ───────────────▶ Ready
//!   ▲                              │  on_resolved(err)      │ select
//!   │ ancestor changed             └──────────────▶ Error   ▼
//!   └───────────────────────────────────────────── Selected(id)
//! ```
//!
//! The cascade never performs I/O. Callers run the fetch a ticket describes
//! and feed the outcome back through [`SelectionCascade::on_resolved`].

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{CascadeError, ResolveError};
use crate::options::{Level, OptionEntry};

/// Most recent transitions kept in the log.
pub const MAX_TRANSITIONS: usize = 128;

/// Externally visible state of one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "value", rename_all = "snake_case")]
pub enum LevelPhase {
    Empty,
    Loading,
    Ready,
    Selected(String),
    Error(ResolveError),
}

impl fmt::Display for LevelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Selected(id) => write!(f, "Selected({id})"),
            Self::Error(_) => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum FetchStatus {
    #[default]
    Empty,
    Loading,
    Ready,
    Error(ResolveError),
}

#[derive(Debug, Clone, Default)]
struct LevelSlot {
    selected: Option<String>,
    options: Vec<OptionEntry>,
    epoch: u64,
    /// Epoch of the fetch whose result may still be applied.
    live_fetch: Option<u64>,
    status: FetchStatus,
}

impl LevelSlot {
    fn phase(&self) -> LevelPhase {
        if let Some(id) = &self.selected {
            return LevelPhase::Selected(id.clone());
        }
        match &self.status {
            FetchStatus::Empty => LevelPhase::Empty,
            FetchStatus::Loading => LevelPhase::Loading,
            FetchStatus::Ready => LevelPhase::Ready,
            FetchStatus::Error(e) => LevelPhase::Error(e.clone()),
        }
    }
}

/// Describes a fetch the caller must run for `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub level: Level,
    /// Teacher id for the class list, class id for the roster, `None` for teachers.
    pub parent_id: Option<String>,
    pub epoch: u64,
}

/// What [`SelectionCascade::on_resolved`] did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Options replaced; the level is `Ready` (or still `Selected`).
    Applied { level: Level, count: usize },
    /// The fetch failed; the level now carries the error.
    Failed { level: Level, error: ResolveError },
    /// The result answers a question nobody is asking any more.
    Discarded { level: Level, epoch: u64, current: u64 },
}

/// A single recorded phase change.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeTransition {
    pub level: Level,
    pub from: LevelPhase,
    pub to: LevelPhase,
    pub epoch: u64,
    pub reason: &'static str,
}

/// The three-level dependent selection state machine.
#[derive(Debug, Clone, Default)]
pub struct SelectionCascade {
    levels: [LevelSlot; 3],
    transitions: VecDeque<CascadeTransition>,
}

impl SelectionCascade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `id` at `level`, invalidating every level below.
    ///
    /// Returns the fetch to run for the direct child, or `None` at the
    /// bottom of the cascade.
    pub fn select(
        &mut self,
        level: Level,
        id: impl Into<String>,
    ) -> Result<Option<FetchTicket>, CascadeError> {
        if let Some(parent) = level.parent() {
            if self.selected(parent).is_none() {
                return Err(CascadeError::ParentNotSelected { level, parent });
            }
        }

        let id = id.into();
        self.update(level, "selected", |slot| slot.selected = Some(id.clone()));

        for below in level.descendants() {
            self.update(below, "ancestor changed", |slot| {
                slot.selected = None;
                slot.options.clear();
                slot.epoch += 1;
                slot.live_fetch = None;
                slot.status = FetchStatus::Empty;
            });
        }

        Ok(level.child().map(|child| self.dispatch(child, Some(id))))
    }

    /// Re-issue the fetch for `level` using its parent's current selection.
    ///
    /// Used for the initial teacher load and to retry after an error. Any
    /// fetch already in flight for the level becomes inert.
    pub fn reload(&mut self, level: Level) -> Result<FetchTicket, CascadeError> {
        let parent_id = match level.parent() {
            None => None,
            Some(parent) => Some(
                self.selected(parent)
                    .ok_or(CascadeError::ParentNotSelected { level, parent })?
                    .to_string(),
            ),
        };
        self.slot_mut(level).epoch += 1;
        Ok(self.dispatch(level, parent_id))
    }

    /// Apply the outcome of the fetch tagged `epoch`, unless it is stale.
    pub fn on_resolved(
        &mut self,
        level: Level,
        epoch: u64,
        result: Result<Vec<OptionEntry>, ResolveError>,
    ) -> Resolution {
        let slot = self.slot(level);
        if slot.epoch != epoch || slot.live_fetch != Some(epoch) {
            debug!(%level, epoch, current = slot.epoch, "Discarding stale options");
            return Resolution::Discarded {
                level,
                epoch,
                current: slot.epoch,
            };
        }

        match result {
            Ok(options) => {
                let count = options.len();
                self.update(level, "options resolved", |slot| {
                    slot.options = options;
                    slot.live_fetch = None;
                    slot.status = FetchStatus::Ready;
                });
                Resolution::Applied { level, count }
            }
            Err(error) => {
                self.update(level, "fetch failed", |slot| {
                    slot.live_fetch = None;
                    slot.status = FetchStatus::Error(error.clone());
                });
                Resolution::Failed { level, error }
            }
        }
    }

    pub fn phase(&self, level: Level) -> LevelPhase {
        self.slot(level).phase()
    }

    pub fn selected(&self, level: Level) -> Option<&str> {
        self.slot(level).selected.as_deref()
    }

    pub fn options(&self, level: Level) -> &[OptionEntry] {
        &self.slot(level).options
    }

    /// The loaded option with `id` at `level`, if listed.
    pub fn option(&self, level: Level, id: &str) -> Option<&OptionEntry> {
        self.options(level).iter().find(|entry| entry.id == id)
    }

    pub fn epoch(&self, level: Level) -> u64 {
        self.slot(level).epoch
    }

    /// Whether a fetch whose result would still be applied is outstanding.
    pub fn has_live_fetch(&self, level: Level) -> bool {
        self.slot(level).live_fetch.is_some()
    }

    /// Recent phase changes, oldest first, capped at [`MAX_TRANSITIONS`].
    pub fn transitions(&self) -> &VecDeque<CascadeTransition> {
        &self.transitions
    }

    fn dispatch(&mut self, level: Level, parent_id: Option<String>) -> FetchTicket {
        let epoch = self.slot(level).epoch;
        self.update(level, "fetch dispatched", |slot| {
            slot.live_fetch = Some(epoch);
            slot.status = FetchStatus::Loading;
        });
        FetchTicket {
            level,
            parent_id,
            epoch,
        }
    }

    fn update(&mut self, level: Level, reason: &'static str, apply: impl FnOnce(&mut LevelSlot)) {
        let slot = self.slot_mut(level);
        let from = slot.phase();
        apply(slot);
        let to = slot.phase();
        let epoch = slot.epoch;

        if from != to {
            debug!(%level, from = %from, to = %to, epoch, reason, "Level transition");
            if self.transitions.len() >= MAX_TRANSITIONS {
                self.transitions.pop_front();
            }
            self.transitions.push_back(CascadeTransition {
                level,
                from,
                to,
                epoch,
                reason,
            });
        }
    }

    fn slot(&self, level: Level) -> &LevelSlot {
        &self.levels[level.index()]
    }

    fn slot_mut(&mut self, level: Level) -> &mut LevelSlot {
        &mut self.levels[level.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(ids: &[&str]) -> Vec<OptionEntry> {
        ids.iter()
            .map(|id| OptionEntry {
                id: id.to_string(),
                display_label: id.to_uppercase(),
                raw: serde_json::json!({ "id": id }),
            })
            .collect()
    }

    /// Teacher list loaded, `teacher` selected, class list loaded, `class` selected.
    fn cascade_with_class(teacher: &str, class: &str) -> SelectionCascade {
        let mut cascade = SelectionCascade::new();
        let t = cascade.reload(Level::Teacher).unwrap();
        cascade.on_resolved(Level::Teacher, t.epoch, Ok(entries(&[teacher])));
        let c = cascade.select(Level::Teacher, teacher).unwrap().unwrap();
        cascade.on_resolved(Level::Class, c.epoch, Ok(entries(&[class])));
        cascade.select(Level::Class, class).unwrap();
        cascade
    }

    #[test]
    fn test_initial_state() {
        let cascade = SelectionCascade::new();
        for level in Level::ALL {
            assert_eq!(cascade.phase(level), LevelPhase::Empty);
            assert_eq!(cascade.epoch(level), 0);
            assert!(cascade.options(level).is_empty());
        }
    }

    #[test]
    fn test_cannot_select_class_before_teacher() {
        let mut cascade = SelectionCascade::new();
        let err = cascade.select(Level::Class, "c1").unwrap_err();
        assert_eq!(
            err,
            CascadeError::ParentNotSelected {
                level: Level::Class,
                parent: Level::Teacher
            }
        );
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Empty);
    }

    #[test]
    fn test_cannot_reload_roster_without_class() {
        let mut cascade = SelectionCascade::new();
        assert!(cascade.reload(Level::StudentPool).is_err());
    }

    #[test]
    fn test_teacher_selection_dispatches_class_fetch() {
        let mut cascade = SelectionCascade::new();
        let ticket = cascade.select(Level::Teacher, "kem").unwrap().unwrap();
        assert_eq!(ticket.level, Level::Class);
        assert_eq!(ticket.parent_id.as_deref(), Some("kem"));
        assert_eq!(ticket.epoch, cascade.epoch(Level::Class));
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Loading);
        assert!(cascade.has_live_fetch(Level::Class));
    }

    #[test]
    fn test_new_teacher_empties_class_and_roster() {
        let mut cascade = cascade_with_class("kem", "c1");
        let roster = cascade.reload(Level::StudentPool).unwrap();
        cascade.on_resolved(Level::StudentPool, roster.epoch, Ok(entries(&["s1", "s2"])));
        let class_epoch = cascade.epoch(Level::Class);
        let roster_epoch = cascade.epoch(Level::StudentPool);

        cascade.select(Level::Teacher, "abc").unwrap();

        assert_eq!(cascade.selected(Level::Class), None);
        assert!(cascade.options(Level::Class).is_empty());
        assert_eq!(cascade.selected(Level::StudentPool), None);
        assert!(cascade.options(Level::StudentPool).is_empty());
        assert_eq!(cascade.epoch(Level::Class), class_epoch + 1);
        assert_eq!(cascade.epoch(Level::StudentPool), roster_epoch + 1);
        assert_eq!(cascade.phase(Level::StudentPool), LevelPhase::Empty);
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Loading);
    }

    #[test]
    fn test_new_class_empties_roster_only() {
        let mut cascade = cascade_with_class("kem", "c1");
        let roster = cascade.reload(Level::StudentPool).unwrap();
        cascade.on_resolved(Level::StudentPool, roster.epoch, Ok(entries(&["s1"])));

        let ticket = cascade.select(Level::Class, "c2").unwrap().unwrap();

        assert_eq!(ticket.level, Level::StudentPool);
        assert_eq!(ticket.parent_id.as_deref(), Some("c2"));
        assert!(cascade.options(Level::StudentPool).is_empty());
        assert_eq!(cascade.selected(Level::Teacher), Some("kem"));
        assert_eq!(cascade.options(Level::Class).len(), 1);
    }

    #[test]
    fn test_late_response_for_superseded_teacher_is_discarded() {
        let mut cascade = SelectionCascade::new();
        let for_a = cascade.select(Level::Teacher, "A").unwrap().unwrap();
        let for_b = cascade.select(Level::Teacher, "B").unwrap().unwrap();

        let applied = cascade.on_resolved(Level::Class, for_b.epoch, Ok(entries(&["b1", "b2"])));
        assert_eq!(
            applied,
            Resolution::Applied {
                level: Level::Class,
                count: 2
            }
        );

        let late = cascade.on_resolved(Level::Class, for_a.epoch, Ok(entries(&["a1"])));
        assert!(matches!(late, Resolution::Discarded { .. }));

        let ids: Vec<_> = cascade.options(Level::Class).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2"]);
    }

    #[test]
    fn test_stale_response_arriving_first_is_discarded() {
        let mut cascade = SelectionCascade::new();
        let for_a = cascade.select(Level::Teacher, "A").unwrap().unwrap();
        let for_b = cascade.select(Level::Teacher, "B").unwrap().unwrap();

        let early = cascade.on_resolved(Level::Class, for_a.epoch, Ok(entries(&["a1"])));
        assert!(matches!(early, Resolution::Discarded { .. }));
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Loading);

        cascade.on_resolved(Level::Class, for_b.epoch, Ok(entries(&["b1"])));
        assert_eq!(cascade.options(Level::Class)[0].id, "b1");
    }

    #[test]
    fn test_stale_failure_does_not_poison_level() {
        let mut cascade = SelectionCascade::new();
        let for_a = cascade.select(Level::Teacher, "A").unwrap().unwrap();
        cascade.select(Level::Teacher, "B").unwrap();

        let outcome = cascade.on_resolved(
            Level::Class,
            for_a.epoch,
            Err(ResolveError::Network("reset".into())),
        );
        assert!(matches!(outcome, Resolution::Discarded { .. }));
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Loading);
    }

    #[test]
    fn test_duplicate_result_is_inert() {
        let mut cascade = SelectionCascade::new();
        let ticket = cascade.select(Level::Teacher, "kem").unwrap().unwrap();
        cascade.on_resolved(Level::Class, ticket.epoch, Ok(entries(&["c1"])));
        let again = cascade.on_resolved(Level::Class, ticket.epoch, Ok(entries(&["zz"])));
        assert!(matches!(again, Resolution::Discarded { .. }));
        assert_eq!(cascade.options(Level::Class)[0].id, "c1");
    }

    #[test]
    fn test_failure_sets_error_and_keeps_other_levels() {
        let mut cascade = SelectionCascade::new();
        let teachers = cascade.reload(Level::Teacher).unwrap();
        cascade.on_resolved(Level::Teacher, teachers.epoch, Ok(entries(&["kem"])));
        let classes = cascade.select(Level::Teacher, "kem").unwrap().unwrap();

        let err = ResolveError::Malformed("not an array".into());
        let outcome = cascade.on_resolved(Level::Class, classes.epoch, Err(err.clone()));

        assert_eq!(
            outcome,
            Resolution::Failed {
                level: Level::Class,
                error: err.clone()
            }
        );
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Error(err));
        assert_eq!(cascade.selected(Level::Teacher), Some("kem"));
        assert_eq!(cascade.options(Level::Teacher).len(), 1);
        assert!(!cascade.has_live_fetch(Level::Class));
    }

    #[test]
    fn test_reselecting_recovers_from_error() {
        let mut cascade = SelectionCascade::new();
        let first = cascade.select(Level::Teacher, "kem").unwrap().unwrap();
        cascade.on_resolved(
            Level::Class,
            first.epoch,
            Err(ResolveError::Network("timeout".into())),
        );

        let retry = cascade.select(Level::Teacher, "kem").unwrap().unwrap();
        assert!(retry.epoch > first.epoch);
        cascade.on_resolved(Level::Class, retry.epoch, Ok(entries(&["c1"])));
        assert_eq!(cascade.phase(Level::Class), LevelPhase::Ready);
    }

    #[test]
    fn test_reload_supersedes_in_flight_fetch() {
        let mut cascade = SelectionCascade::new();
        let first = cascade.reload(Level::Teacher).unwrap();
        let second = cascade.reload(Level::Teacher).unwrap();
        assert!(matches!(
            cascade.on_resolved(Level::Teacher, first.epoch, Ok(entries(&["old"]))),
            Resolution::Discarded { .. }
        ));
        cascade.on_resolved(Level::Teacher, second.epoch, Ok(entries(&["new"])));
        assert_eq!(cascade.options(Level::Teacher)[0].id, "new");
    }

    #[test]
    fn test_selecting_student_has_no_child_fetch() {
        let mut cascade = cascade_with_class("kem", "c1");
        assert_eq!(cascade.select(Level::StudentPool, "s1").unwrap(), None);
        assert_eq!(
            cascade.phase(Level::StudentPool),
            LevelPhase::Selected("s1".into())
        );
    }

    #[test]
    fn test_invalidation_holds_for_any_selection_sequence() {
        let mut cascade = SelectionCascade::new();
        let script = [
            (Level::Teacher, "t1"),
            (Level::Class, "c1"),
            (Level::StudentPool, "s1"),
            (Level::Class, "c2"),
            (Level::Teacher, "t2"),
            (Level::Class, "c3"),
            (Level::Teacher, "t2"),
        ];
        for (level, id) in script {
            if let Some(ticket) = cascade.select(level, id).unwrap() {
                cascade.on_resolved(ticket.level, ticket.epoch, Ok(entries(&["x"])));
            }
            for below in level.descendants().skip(1) {
                assert_eq!(cascade.selected(below), None);
                assert!(cascade.options(below).is_empty());
            }
            if let Some(child) = level.child() {
                assert_eq!(cascade.selected(child), None);
            }
        }
    }

    #[test]
    fn test_transitions_are_recorded() {
        let mut cascade = SelectionCascade::new();
        let ticket = cascade.select(Level::Teacher, "kem").unwrap().unwrap();
        cascade.on_resolved(Level::Class, ticket.epoch, Ok(entries(&["c1"])));

        let log: Vec<_> = cascade
            .transitions()
            .iter()
            .map(|t| (t.level, t.to.to_string()))
            .collect();
        assert_eq!(
            log,
            [
                (Level::Teacher, "Selected(kem)".to_string()),
                (Level::Class, "Loading".to_string()),
                (Level::Class, "Ready".to_string()),
            ]
        );
        assert_eq!(cascade.transitions()[0].reason, "selected");
    }

    #[test]
    fn test_option_lookup_by_id() {
        let cascade = cascade_with_class("kem", "c1");
        assert_eq!(
            cascade.option(Level::Class, "c1").map(|e| e.display_label.as_str()),
            Some("C1")
        );
        assert!(cascade.option(Level::Class, "c2").is_none());
        assert!(cascade.option(Level::StudentPool, "c1").is_none());
    }

    #[test]
    fn test_transition_log_keeps_most_recent() {
        let mut cascade = SelectionCascade::new();
        for round in 0..MAX_TRANSITIONS {
            cascade.select(Level::Teacher, format!("t{round}")).unwrap();
        }
        assert_eq!(cascade.transitions().len(), MAX_TRANSITIONS);

        let last = cascade.transitions().back().unwrap();
        assert_eq!((last.level, &last.to), (Level::Class, &LevelPhase::Loading));
        let newest = LevelPhase::Selected(format!("t{}", MAX_TRANSITIONS - 1));
        let oldest = LevelPhase::Selected("t0".to_string());
        assert!(cascade.transitions().iter().any(|t| t.to == newest));
        assert!(!cascade.transitions().iter().any(|t| t.to == oldest));
    }
}
