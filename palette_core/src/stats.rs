use serde::Serialize;
use std::collections::BTreeMap;

use crate::{Color, Palette};

/// Per-position usage counts over used palettes.
///
/// Dense over the current input colors: every position `1..=palette_size`
/// has an entry for every input color value, zero if never used there.
/// Palette colors whose value is not an input color are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColorStatistics {
    positions: BTreeMap<usize, BTreeMap<String, u32>>,
    used_palettes: usize,
}

pub fn compute_statistics(
    palettes: &[Palette],
    palette_size: usize,
    input_colors: &[Color],
) -> ColorStatistics {
    let mut positions: BTreeMap<usize, BTreeMap<String, u32>> = BTreeMap::new();
    for position in 1..=palette_size {
        let counts = positions.entry(position).or_default();
        for color in input_colors {
            counts.insert(color.value.clone(), 0);
        }
    }

    let mut used_palettes = 0;
    for palette in palettes.iter().filter(|p| p.used) {
        used_palettes += 1;
        for (i, color) in palette.colors.iter().enumerate() {
            if let Some(count) = positions
                .get_mut(&(i + 1))
                .and_then(|counts| counts.get_mut(&color.value))
            {
                *count += 1;
            }
        }
    }

    ColorStatistics {
        positions,
        used_palettes,
    }
}

impl ColorStatistics {
    /// Count for a 1-based position and color value.
    pub fn count(&self, position: usize, value: &str) -> Option<u32> {
        self.positions.get(&position)?.get(value).copied()
    }

    pub fn position(&self, position: usize) -> Option<&BTreeMap<String, u32>> {
        self.positions.get(&position)
    }

    pub fn positions(&self) -> impl Iterator<Item = (usize, &BTreeMap<String, u32>)> {
        self.positions.iter().map(|(p, counts)| (*p, counts))
    }

    pub fn used_palettes(&self) -> usize {
        self.used_palettes
    }

    /// Display order for one position: highest count first, ties by value.
    pub fn ranked(&self, position: usize) -> Vec<(&str, u32)> {
        let mut out: Vec<(&str, u32)> = self
            .positions
            .get(&position)
            .map(|counts| counts.iter().map(|(v, n)| (v.as_str(), *n)).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(id: &str, value: &str) -> Color {
        Color {
            id: id.to_string(),
            value: value.to_string(),
            label: None,
        }
    }

    fn palette(colors: &[&Color], used: bool) -> Palette {
        let mut p = Palette::new(colors.iter().map(|c| (*c).clone()).collect());
        p.used = used;
        p
    }

    #[test]
    fn no_used_palettes_still_dense() {
        let inputs = vec![color("r", "#FF0000"), color("g", "#00FF00")];
        let stats = compute_statistics(&[], 3, &inputs);

        for position in 1..=3 {
            let counts = stats.position(position).unwrap();
            assert_eq!(counts.len(), 2);
            assert!(counts.values().all(|n| *n == 0));
        }
        assert_eq!(stats.position(4), None);
        assert_eq!(stats.used_palettes(), 0);
    }

    #[test]
    fn counts_only_used_palettes() {
        let r = color("r", "#FF0000");
        let g = color("g", "#00FF00");
        let b = color("b", "#0000FF");
        let inputs = vec![r.clone(), g.clone(), b.clone()];
        let palettes = vec![
            palette(&[&r, &g], true),
            palette(&[&r, &b], true),
            palette(&[&g, &r], false),
        ];

        let stats = compute_statistics(&palettes, 2, &inputs);

        assert_eq!(stats.count(1, "#FF0000"), Some(2));
        assert_eq!(stats.count(1, "#00FF00"), Some(0));
        assert_eq!(stats.count(2, "#00FF00"), Some(1));
        assert_eq!(stats.count(2, "#0000FF"), Some(1));
        assert_eq!(stats.count(2, "#FF0000"), Some(0));
        assert_eq!(stats.used_palettes(), 2);
    }

    #[test]
    fn stale_colors_are_ignored() {
        let r = color("r", "#FF0000");
        let ghost = color("x", "#ABCDEF");
        let stats = compute_statistics(&[palette(&[&ghost, &r], true)], 2, &[r.clone()]);

        assert_eq!(stats.count(1, "#ABCDEF"), None);
        assert_eq!(stats.count(1, "#FF0000"), Some(0));
        assert_eq!(stats.count(2, "#FF0000"), Some(1));
    }

    #[test]
    fn ranked_sorts_by_count_then_value() {
        let r = color("r", "#FF0000");
        let g = color("g", "#00FF00");
        let b = color("b", "#0000FF");
        let inputs = vec![r.clone(), g.clone(), b.clone()];
        let palettes = vec![palette(&[&g, &r], true), palette(&[&g, &b], true)];

        let stats = compute_statistics(&palettes, 2, &inputs);

        assert_eq!(
            stats.ranked(1),
            vec![("#00FF00", 2), ("#0000FF", 0), ("#FF0000", 0)]
        );
        assert!(stats.ranked(9).is_empty());
    }
}
