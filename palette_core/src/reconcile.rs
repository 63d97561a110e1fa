use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::generate::sample_permutations;
use crate::palette::Signature;
use crate::{Color, Palette, WorkingSet};

/// Upper bound on sampling rounds in one reconciliation.
const MAX_DRAW_ROUNDS: usize = 6;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Used palettes carried over.
    pub kept_used: usize,
    /// Used palettes dropped because a color vanished or the size changed.
    pub dropped_used: usize,
    /// Fresh unused palettes appended.
    pub generated: usize,
    /// True when fewer unique palettes exist than the budget asked for.
    pub exhausted: bool,
}

/// Result of manually marking a palette as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    /// No matching palette existed; a new used one was inserted at the front.
    Added,
    /// A matching unused palette was marked used and moved to the front.
    Exist,
    /// A matching palette was already used; it was moved to the front.
    AlreadyUsed,
    /// Wrong color count or a color that is not an input color.
    Invalid,
}

/// Re-resolve each color of `palette` by id against `inputs`.
///
/// Returns the palette with refreshed colors, or `None` when a color no
/// longer exists or the length is not `size`.
pub fn revalidate(palette: &Palette, inputs: &[Color], size: usize) -> Option<Palette> {
    if palette.colors.len() != size {
        return None;
    }

    let colors = palette
        .colors
        .iter()
        .map(|c| inputs.iter().find(|input| input.id == c.id).cloned())
        .collect::<Option<Vec<Color>>>()?;

    Some(Palette {
        colors,
        ..palette.clone()
    })
}

impl WorkingSet {
    /// Rebuild the palette list: keep still-valid used palettes up front,
    /// then backfill with fresh unique palettes up to the sample budget.
    pub fn reconcile<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut seen: HashSet<Signature> = HashSet::new();
        let mut next: Vec<Palette> = Vec::new();

        for palette in self.generated_palettes.iter().filter(|p| p.used) {
            match revalidate(palette, &self.input_colors, self.palette_size) {
                Some(valid) if seen.insert(valid.signature()) => next.push(valid),
                _ => {
                    debug!(palette = %palette.id, "dropping used palette that no longer fits");
                    report.dropped_used += 1;
                }
            }
        }
        report.kept_used = next.len();

        let need = self.sample_budget.saturating_sub(next.len());
        if need > 0 && self.can_generate() {
            // kept palettes can collide with at most their own count of draws
            let mut wanted = need.saturating_add(next.len());
            for _ in 0..MAX_DRAW_ROUNDS {
                let drawn = sample_permutations(&self.input_colors, self.palette_size, wanted, rng);
                let whole_space = drawn.len() < wanted;
                for colors in drawn {
                    if report.generated == need {
                        break;
                    }
                    if seen.insert(Signature::of(&colors)) {
                        next.push(Palette::new(colors));
                        report.generated += 1;
                    }
                }
                if report.generated == need || whole_space {
                    break;
                }
                // colors sharing a value collapse distinct draws into one palette
                wanted = wanted.saturating_mul(2);
            }
            report.exhausted = report.generated < need;
        } else if need > 0 {
            report.exhausted = true;
        }

        if next.len() > self.sample_budget {
            warn!(
                used = next.len(),
                budget = self.sample_budget,
                "more used palettes than the sample budget, truncating"
            );
            next.truncate(self.sample_budget);
            report.kept_used = report.kept_used.min(self.sample_budget);
        }

        if report.dropped_used > 0 {
            warn!(dropped = report.dropped_used, "used palettes no longer valid");
        }
        if report.exhausted {
            debug!(
                total = %self.total_combinations(),
                budget = self.sample_budget,
                "generation space exhausted"
            );
        }

        self.generated_palettes = next;
        report
    }

    /// Flip the used flag in place. Returns the new flag, or `None` for an
    /// unknown id. The list order is not touched.
    pub fn toggle_used(&mut self, palette_id: &str) -> Option<bool> {
        let palette = self
            .generated_palettes
            .iter_mut()
            .find(|p| p.id == palette_id)?;
        palette.used = !palette.used;
        Some(palette.used)
    }

    /// Mark the palette made of `colors` as used, creating it if needed.
    pub fn add_used_palette(&mut self, colors: &[Color]) -> AddStatus {
        let resolved = colors
            .iter()
            .map(|c| self.color(&c.id).cloned())
            .collect::<Option<Vec<Color>>>();
        let resolved = match resolved {
            Some(r) if r.len() == self.palette_size => r,
            _ => {
                warn!(
                    colors = colors.len(),
                    palette_size = self.palette_size,
                    "manual palette does not match current size or input colors"
                );
                return AddStatus::Invalid;
            }
        };

        let signature = Signature::of(&resolved);
        let existing = self
            .generated_palettes
            .iter()
            .position(|p| p.signature() == signature);

        match existing {
            None => {
                let mut palette = Palette::new(resolved);
                palette.used = true;
                self.generated_palettes.insert(0, palette);
                self.enforce_budget_after_insert();
                AddStatus::Added
            }
            Some(index) => {
                let mut palette = self.generated_palettes.remove(index);
                let status = if palette.used {
                    AddStatus::AlreadyUsed
                } else {
                    palette.used = true;
                    AddStatus::Exist
                };
                self.generated_palettes.insert(0, palette);
                status
            }
        }
    }

    /// Evict the last unused palette, or the last palette if all are used.
    fn enforce_budget_after_insert(&mut self) {
        if self.generated_palettes.len() <= self.sample_budget {
            return;
        }
        match self.generated_palettes.iter().rposition(|p| !p.used) {
            Some(index) => {
                self.generated_palettes.remove(index);
            }
            None => {
                warn!(budget = self.sample_budget, "palette list full of used palettes, evicting oldest tail entry");
                self.generated_palettes.truncate(self.sample_budget);
            }
        }
    }

    /// Unmark every used palette. Returns how many were unmarked.
    pub fn clear_used(&mut self) -> usize {
        let mut cleared = 0;
        for palette in self.generated_palettes.iter_mut().filter(|p| p.used) {
            palette.used = false;
            cleared += 1;
        }
        cleared
    }

    /// Drop every palette, used ones included. Destructive.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.generated_palettes.len();
        self.generated_palettes.clear();
        removed
    }

    /// Used palettes first in their current order, unused shuffled after.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let (used, mut unused): (Vec<Palette>, Vec<Palette>) = self
            .generated_palettes
            .drain(..)
            .partition(|p| p.used);
        unused.shuffle(rng);
        self.generated_palettes = used;
        self.generated_palettes.extend(unused);
    }

    /// Bring an externally sourced set back within its invariants: revalidate
    /// used and unused palettes alike, drop duplicates, clamp to budget.
    /// Returns how many palettes were removed.
    pub fn sanitize(&mut self) -> usize {
        let before = self.generated_palettes.len();
        let mut seen: HashSet<Signature> = HashSet::new();
        let mut kept: Vec<Palette> = Vec::with_capacity(before);

        // used first so they win signature collisions
        let (used, unused): (Vec<&Palette>, Vec<&Palette>) =
            self.generated_palettes.iter().partition(|p| p.used);
        for palette in used.into_iter().chain(unused) {
            if let Some(valid) = revalidate(palette, &self.input_colors, self.palette_size)
                && seen.insert(valid.signature())
            {
                kept.push(valid);
            }
        }
        kept.truncate(self.sample_budget);

        let removed = before - kept.len();
        if removed > 0 {
            warn!(removed, "sanitize dropped palettes that no longer fit the input colors");
        }
        self.generated_palettes = kept;
        removed
    }
}
