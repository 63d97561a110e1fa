use anyhow::Context;
use rand::Rng;
use std::fs;
use std::path::Path;

pub mod archive;
pub mod color;
pub mod generate;
pub mod palette;
pub mod persist;
pub mod reconcile;
pub mod session;
pub mod stats;
pub mod store;

mod error;

pub use color::{Color, ColorId, default_input_colors, normalize_value};
pub use error::{ExportError, ImportError, PersistError, StoreError, WorkingSetError};
pub use generate::{PermutationCount, count_permutations, permutations, sample_permutations};
pub use palette::{Palette, PaletteFilter, Signature};
pub use reconcile::{AddStatus, ReconcileReport};
pub use session::{Action, Debouncer, Outcome, Session};
pub use stats::{ColorStatistics, compute_statistics};
pub use store::{FileStore, KeyValueStore, MemoryStore};

pub const DEFAULT_PALETTE_SIZE: usize = 3;
pub const DEFAULT_SAMPLE_BUDGET: usize = 120;
pub const MIN_PALETTE_SIZE: usize = 2;
pub const MAX_PALETTE_SIZE: usize = 6;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// The working set is the whole curated document: input colors, the
/// palette size, and the current palette list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    pub input_colors: Vec<Color>,
    pub palette_size: usize,
    pub generated_palettes: Vec<Palette>,
    /// Upper bound on `generated_palettes.len()`.
    pub sample_budget: usize,
}

impl Default for WorkingSet {
    fn default() -> Self {
        Self {
            input_colors: default_input_colors(),
            palette_size: DEFAULT_PALETTE_SIZE,
            generated_palettes: Vec::new(),
            sample_budget: DEFAULT_SAMPLE_BUDGET,
        }
    }
}

/// One page of a filtered palette listing.
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub palettes: Vec<&'a Palette>,
    pub index: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl WorkingSet {
    pub fn new(input_colors: Vec<Color>, palette_size: usize, sample_budget: usize) -> Self {
        Self {
            input_colors,
            palette_size,
            generated_palettes: Vec::new(),
            sample_budget,
        }
    }

    /// Save the working set as a versioned JSON document.
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let doc = persist::serialize(self).context("serialize working set")?;
        let json = serde_json::to_string_pretty(&doc).context("encode working set json")?;
        fs::write(path.as_ref(), json).context("write working set json file")?;
        Ok(())
    }

    /// Load a working set written by `save_json_file` (or a legacy export).
    pub fn load_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path.as_ref()).context("read working set json file")?;
        let value: serde_json::Value =
            serde_json::from_str(&text).context("parse working set json")?;
        let ws = persist::deserialize(&value).context("decode working set document")?;
        Ok(ws)
    }

    pub fn color(&self, id: &str) -> Option<&Color> {
        self.input_colors.iter().find(|c| c.id == id)
    }

    pub fn find_palette(&self, id: &str) -> Option<&Palette> {
        self.generated_palettes.iter().find(|p| p.id == id)
    }

    /// Whether the current colors and size admit any palette at all.
    pub fn can_generate(&self) -> bool {
        self.palette_size > 0 && self.palette_size <= self.input_colors.len()
    }

    pub fn total_combinations(&self) -> PermutationCount {
        count_permutations(self.input_colors.len(), self.palette_size)
    }

    pub fn used_count(&self) -> usize {
        self.generated_palettes.iter().filter(|p| p.used).count()
    }

    pub fn filtered(&self, filter: PaletteFilter) -> impl Iterator<Item = &Palette> {
        self.generated_palettes
            .iter()
            .filter(move |p| filter.matches(p))
    }

    /// Zero-based page of the filtered listing. Out-of-range pages are empty.
    pub fn page(&self, filter: PaletteFilter, index: usize, per_page: usize) -> Page<'_> {
        let per_page = per_page.max(1);
        let matching: Vec<&Palette> = self.filtered(filter).collect();
        let total_items = matching.len();

        Page {
            palettes: matching
                .into_iter()
                .skip(index.saturating_mul(per_page))
                .take(per_page)
                .collect(),
            index,
            total_pages: total_items.div_ceil(per_page),
            total_items,
        }
    }

    pub fn statistics(&self) -> ColorStatistics {
        compute_statistics(
            &self.generated_palettes,
            self.palette_size,
            &self.input_colors,
        )
    }

    /// Replace the input colors and reconcile.
    pub fn set_input_colors<R: Rng + ?Sized>(
        &mut self,
        colors: Vec<Color>,
        rng: &mut R,
    ) -> Result<ReconcileReport, WorkingSetError> {
        if colors.is_empty() {
            return Err(WorkingSetError::LastColor);
        }
        self.input_colors = colors;
        Ok(self.reconcile(rng))
    }

    /// Append a new input color and reconcile. Returns the new color's id.
    pub fn add_color<R: Rng + ?Sized>(
        &mut self,
        value: &str,
        rng: &mut R,
    ) -> Result<ColorId, WorkingSetError> {
        let color = Color::new(value)?;
        let id = color.id.clone();
        self.input_colors.push(color);
        self.reconcile(rng);
        Ok(id)
    }

    /// Change the value of an existing color. Used palettes keep referring to
    /// it by id and pick up the new value.
    pub fn update_color<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        value: &str,
        rng: &mut R,
    ) -> Result<ReconcileReport, WorkingSetError> {
        let value = normalize_value(value)?;
        let color = self
            .input_colors
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| WorkingSetError::UnknownColor(id.to_string()))?;
        color.value = value;
        Ok(self.reconcile(rng))
    }

    pub fn remove_color<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        rng: &mut R,
    ) -> Result<ReconcileReport, WorkingSetError> {
        let pos = self
            .input_colors
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| WorkingSetError::UnknownColor(id.to_string()))?;
        if self.input_colors.len() == 1 {
            return Err(WorkingSetError::LastColor);
        }
        self.input_colors.remove(pos);
        Ok(self.reconcile(rng))
    }

    pub fn set_palette_size<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<ReconcileReport, WorkingSetError> {
        if !(MIN_PALETTE_SIZE..=MAX_PALETTE_SIZE).contains(&size) {
            return Err(WorkingSetError::InvalidPaletteSize(size));
        }
        self.palette_size = size;
        Ok(self.reconcile(rng))
    }

    pub fn set_sample_budget<R: Rng + ?Sized>(
        &mut self,
        budget: usize,
        rng: &mut R,
    ) -> Result<ReconcileReport, WorkingSetError> {
        if budget == 0 {
            return Err(WorkingSetError::InvalidSampleBudget);
        }
        self.sample_budget = budget;
        Ok(self.reconcile(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rgb_set() -> WorkingSet {
        let colors = ["#FF0000", "#00FF00", "#0000FF"]
            .iter()
            .map(|v| Color::new(v).unwrap())
            .collect();
        WorkingSet::new(colors, 2, 10)
    }

    #[test]
    fn default_set_is_seeded() {
        let ws = WorkingSet::default();
        assert_eq!(ws.input_colors.len(), 6);
        assert_eq!(ws.palette_size, DEFAULT_PALETTE_SIZE);
        assert_eq!(ws.sample_budget, DEFAULT_SAMPLE_BUDGET);
        assert!(ws.generated_palettes.is_empty());
        assert_eq!(ws.total_combinations(), PermutationCount::Exact(120));
    }

    #[test]
    fn palette_size_bounds_are_enforced() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        assert_eq!(
            ws.set_palette_size(1, &mut rng),
            Err(WorkingSetError::InvalidPaletteSize(1))
        );
        assert_eq!(
            ws.set_palette_size(7, &mut rng),
            Err(WorkingSetError::InvalidPaletteSize(7))
        );
        assert_eq!(ws.palette_size, 2);
    }

    #[test]
    fn oversized_palette_yields_nothing() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        ws.set_palette_size(4, &mut rng)?;
        assert!(!ws.can_generate());
        assert!(ws.generated_palettes.is_empty());
        Ok(())
    }

    #[test]
    fn cannot_remove_last_color() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        let ids: Vec<String> = ws.input_colors.iter().map(|c| c.id.clone()).collect();
        ws.remove_color(&ids[0], &mut rng)?;
        ws.remove_color(&ids[1], &mut rng)?;
        assert_eq!(
            ws.remove_color(&ids[2], &mut rng),
            Err(WorkingSetError::LastColor)
        );
        assert_eq!(ws.input_colors.len(), 1);
        assert_eq!(
            ws.set_input_colors(Vec::new(), &mut rng),
            Err(WorkingSetError::LastColor)
        );
        Ok(())
    }

    #[test]
    fn unknown_color_is_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        assert_eq!(
            ws.update_color("nope", "#FFFFFF", &mut rng),
            Err(WorkingSetError::UnknownColor("nope".to_string()))
        );
        assert_eq!(
            ws.remove_color("nope", &mut rng),
            Err(WorkingSetError::UnknownColor("nope".to_string()))
        );
    }

    #[test]
    fn add_color_grows_generation_space() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        ws.reconcile(&mut rng);
        assert_eq!(ws.generated_palettes.len(), 6);

        let id = ws.add_color("#ffffff", &mut rng)?;
        assert_eq!(ws.color(&id).map(|c| c.value.as_str()), Some("#FFFFFF"));
        assert_eq!(ws.generated_palettes.len(), 10);
        Ok(())
    }

    #[test]
    fn paging_splits_filtered_listing() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        ws.reconcile(&mut rng);

        let first = ws.page(PaletteFilter::All, 0, 4);
        assert_eq!(first.palettes.len(), 4);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.total_items, 6);

        let second = ws.page(PaletteFilter::All, 1, 4);
        assert_eq!(second.palettes.len(), 2);
        assert!(ws.page(PaletteFilter::All, 5, 4).palettes.is_empty());
        assert_eq!(ws.page(PaletteFilter::Used, 0, 4).total_items, 0);
    }

    #[test]
    fn json_file_round_trip() -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ws = rgb_set();
        ws.reconcile(&mut rng);
        ws.generated_palettes[0].used = true;

        let dir = std::env::temp_dir().join("palette-core-lib-json");
        fs::create_dir_all(&dir)?;
        let path = dir.join("working_set.json");

        ws.save_json_file(&path)?;
        let loaded = WorkingSet::load_json_file(&path)?;
        assert_eq!(loaded, ws);

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
