use palette_core::{Color, ColorStatistics, Palette, PermutationCount, WorkingSet};
use std::fmt::Write;

const RESET: &str = "\x1b[0m";

/// Hex value on its own color, with readable text on top.
pub fn swatch(color: &Color) -> String {
    let Some((r, g, b)) = color.rgb() else {
        return format!(" {} ", color.value);
    };
    let (fr, fg, fb) = match color.contrast_text() {
        "#000000" => (0, 0, 0),
        _ => (255, 255, 255),
    };
    format!(
        "\x1b[48;2;{r};{g};{b}m\x1b[38;2;{fr};{fg};{fb}m {} {RESET}",
        color.value
    )
}

/// `  3. * <swatches>  <id>`, index 1-based, `*` for used.
pub fn palette_line(index: usize, palette: &Palette) -> String {
    let marker = if palette.used { '*' } else { ' ' };
    let mut line = format!("{index:>4}. {marker} ");
    for color in &palette.colors {
        line.push_str(&swatch(color));
    }
    let _ = write!(line, "  {}", palette.id);
    line
}

pub fn color_lines(ws: &WorkingSet) -> Vec<String> {
    ws.input_colors
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let label = c.label.as_deref().unwrap_or("");
            format!("{:>3}. {} {:<8} {}", i + 1, swatch(c), label, c.id)
        })
        .collect()
}

pub fn count_line(ws: &WorkingSet, total: &PermutationCount) -> String {
    format!(
        "{} colors, size {}: {} possible palettes, {} listed ({} used), budget {}",
        ws.input_colors.len(),
        ws.palette_size,
        total.formatted(),
        ws.generated_palettes.len(),
        ws.used_count(),
        ws.sample_budget
    )
}

/// One block per position, most used color first.
pub fn statistics_lines(ws: &WorkingSet, stats: &ColorStatistics) -> Vec<String> {
    let mut out = vec![format!("used palettes: {}", stats.used_palettes())];
    for (position, _) in stats.positions() {
        out.push(format!("position {position}:"));
        for (value, count) in stats.ranked(position) {
            let color = ws
                .input_colors
                .iter()
                .find(|c| c.value == value)
                .map(swatch)
                .unwrap_or_else(|| value.to_string());
            out.push(format!("    {color} {count}"));
        }
    }
    out
}
