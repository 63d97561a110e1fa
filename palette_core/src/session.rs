use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{debug, warn};

use crate::archive::{export_archive_to_path, import_archive_from_path};
use crate::store::{KeyValueStore, SaveReport, load_working_set, save_working_set};
use crate::{
    AddStatus, Color, ColorStatistics, ExportError, ImportError, ReconcileReport, WorkingSet,
    WorkingSetError,
};

/// Every user-level change to a working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetInputColors(Vec<Color>),
    AddColor(String),
    UpdateColor { id: String, value: String },
    RemoveColor(String),
    SetPaletteSize(usize),
    SetSampleBudget(usize),
    Generate,
    ToggleUsed(String),
    AddUsedPalette(Vec<Color>),
    ClearUsed,
    ClearAll,
    Shuffle,
}

/// What an action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reconciled(ReconcileReport),
    ColorAdded(String),
    Toggled { id: String, used: bool },
    PaletteAdded(AddStatus),
    Cleared(usize),
    Shuffled,
    UnknownPalette(String),
    Rejected(WorkingSetError),
}

/// Compute the next working set from the current one and an action.
/// The current set is never modified.
pub fn reduce<R: Rng + ?Sized>(
    current: &WorkingSet,
    action: Action,
    rng: &mut R,
) -> (WorkingSet, Outcome) {
    let mut next = current.clone();

    let outcome = match action {
        Action::SetInputColors(colors) => next
            .set_input_colors(colors, rng)
            .map(Outcome::Reconciled),
        Action::AddColor(value) => next.add_color(&value, rng).map(Outcome::ColorAdded),
        Action::UpdateColor { id, value } => next
            .update_color(&id, &value, rng)
            .map(Outcome::Reconciled),
        Action::RemoveColor(id) => next.remove_color(&id, rng).map(Outcome::Reconciled),
        Action::SetPaletteSize(size) => next.set_palette_size(size, rng).map(Outcome::Reconciled),
        Action::SetSampleBudget(budget) => next
            .set_sample_budget(budget, rng)
            .map(Outcome::Reconciled),
        Action::Generate => Ok(Outcome::Reconciled(next.reconcile(rng))),
        Action::ToggleUsed(id) => Ok(match next.toggle_used(&id) {
            Some(used) => Outcome::Toggled { id, used },
            None => Outcome::UnknownPalette(id),
        }),
        Action::AddUsedPalette(colors) => Ok(Outcome::PaletteAdded(next.add_used_palette(&colors))),
        Action::ClearUsed => Ok(Outcome::Cleared(next.clear_used())),
        Action::ClearAll => Ok(Outcome::Cleared(next.clear_all())),
        Action::Shuffle => {
            next.shuffle(rng);
            Ok(Outcome::Shuffled)
        }
    };

    match outcome {
        Ok(outcome) => (next, outcome),
        Err(err) => (current.clone(), Outcome::Rejected(err)),
    }
}

/// Coalesces bursts of regenerate requests: fires once after `quiet_ms`
/// without a new request.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_ms: u32,
    /// Time since the latest pending request.
    pending: Option<u32>,
}

impl Debouncer {
    pub fn new(quiet_ms: u32) -> Self {
        Self {
            quiet_ms,
            pending: None,
        }
    }

    /// Register a request, restarting the quiet period.
    pub fn request(&mut self) {
        self.pending = Some(0);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Advance time; true exactly once when the quiet period has passed.
    pub fn tick(&mut self, dt_ms: u32) -> bool {
        let Some(elapsed) = self.pending else {
            return false;
        };
        let elapsed = elapsed.saturating_add(dt_ms);
        if elapsed >= self.quiet_ms {
            self.pending = None;
            true
        } else {
            self.pending = Some(elapsed);
            false
        }
    }
}

/// A working set bound to its store, its random source and a debouncer.
pub struct Session {
    state: WorkingSet,
    rng: StdRng,
    store: Box<dyn KeyValueStore>,
    debouncer: Debouncer,
    last_persist_warning: Option<String>,
}

impl Session {
    /// Load from `store`. With `seed`, sampling and shuffling are
    /// reproducible.
    pub fn open(store: Box<dyn KeyValueStore>, seed: Option<u64>, debounce_ms: u32) -> Self {
        let state = load_working_set(store.as_ref());
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state,
            rng,
            store,
            debouncer: Debouncer::new(debounce_ms),
            last_persist_warning: None,
        }
    }

    pub fn state(&self) -> &WorkingSet {
        &self.state
    }

    pub fn statistics(&self) -> ColorStatistics {
        self.state.statistics()
    }

    /// Warning from the most recent failed save, cleared by the next good one.
    pub fn last_persist_warning(&self) -> Option<&str> {
        self.last_persist_warning.as_deref()
    }

    /// Apply `action`, replace the state, then persist if anything changed.
    pub fn dispatch(&mut self, action: Action) -> Outcome {
        debug!(?action, "dispatch");
        let (next, outcome) = reduce(&self.state, action, &mut self.rng);
        if next != self.state {
            self.state = next;
            self.persist();
        }
        outcome
    }

    /// Queue a regenerate; it runs once bursts settle (see `tick`).
    pub fn request_generate(&mut self) {
        self.debouncer.request();
    }

    /// Advance the debounce clock, running a pending regenerate if due.
    pub fn tick(&mut self, dt_ms: u32) -> Option<Outcome> {
        if self.debouncer.tick(dt_ms) {
            Some(self.dispatch(Action::Generate))
        } else {
            None
        }
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        export_archive_to_path(self.store.as_ref(), path)
    }

    /// Replace the current set with an archive's contents. Keys the store
    /// refused show up in [`Session::last_persist_warning`].
    pub fn import_from(&mut self, path: impl AsRef<Path>) -> Result<&WorkingSet, ImportError> {
        let imported = import_archive_from_path(path, self.store.as_mut())?;
        self.state = imported.working_set;
        self.record_save(imported.report);
        Ok(&self.state)
    }

    fn persist(&mut self) {
        let report = save_working_set(self.store.as_mut(), &self.state);
        self.record_save(report);
    }

    fn record_save(&mut self, report: SaveReport) {
        if report.is_ok() {
            self.last_persist_warning = None;
        } else {
            let keys: Vec<&str> = report.failed.iter().map(|(k, _)| k.as_str()).collect();
            let message = format!("could not save {}", keys.join(", "));
            warn!(%message, "working set kept in memory only");
            self.last_persist_warning = Some(message);
        }
    }
}
