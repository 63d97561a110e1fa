mod config;
mod render;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use palette_core::{
    Action, AddStatus, Color, FileStore, KeyValueStore, Outcome, PaletteFilter, Session,
    WorkingSet,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::Level as TraceLevel;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

use config::Config;

/// Generate ordered color palettes and curate the ones you use.
#[derive(Parser, Debug)]
#[command(name = "palette", version, about)]
struct Args {
    /// Store file holding the working set
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for reproducible sampling and shuffling
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

/// One REPL line, parsed with the same subcommands.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ReplLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List input colors
    Colors,
    /// Add an input color (#RGB or #RRGGBB)
    AddColor { value: String },
    /// Change the value of an input color (1-based index or id)
    SetColor { color: String, value: String },
    /// Remove an input color (1-based index or id)
    RemoveColor { color: String },
    /// Set the palette size
    Size { n: usize },
    /// Set the sample budget
    Budget { n: usize },
    /// Regenerate, keeping used palettes
    Generate,
    /// Show one page of palettes
    List {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Flip the used flag of a palette (1-based list index or id)
    Toggle { palette: String },
    /// Mark the palette made of these colors as used
    Mark {
        #[arg(required = true)]
        colors: Vec<String>,
    },
    /// Unmark every used palette
    ClearUsed,
    /// Drop every palette, used ones included
    ClearAll {
        #[arg(long)]
        yes: bool,
    },
    /// Shuffle unused palettes, used ones stay first
    Shuffle,
    /// Per-position color counts over used palettes
    Stats,
    /// Number of possible palettes
    Count,
    /// Write the store to a zip archive
    Export { path: PathBuf },
    /// Replace the working set with a zip archive's contents
    Import { path: PathBuf },
    /// Interactive prompt
    Repl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    All,
    Used,
    Unused,
}

impl From<FilterArg> for PaletteFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => PaletteFilter::All,
            FilterArg::Used => PaletteFilter::Used,
            FilterArg::Unused => PaletteFilter::Unused,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("install tracing subscriber")?;

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let state_path = config.state_path(args.state.as_deref());
    debug!(path = %state_path.display(), "opening store");

    let store = FileStore::new(&state_path);
    let fresh = store.keys().map(|keys| keys.is_empty()).unwrap_or(false);
    let mut session = Session::open(Box::new(store), args.seed, config.debounce_ms);

    if fresh && session.state().can_generate() {
        info!("new store, generating first palettes");
        session.dispatch(Action::Generate);
    }

    match args.command {
        Command::Repl => repl(&mut session, &config),
        command => run(&mut session, command, &config),
    }
}

fn repl(session: &mut Session, config: &Config) -> anyhow::Result<()> {
    println!("Palette REPL. Commands as on the command line, ';' separates several.");
    println!("Type 'help' for commands. 'quit' to exit.");

    loop {
        print!("palette> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            // EOF (Ctrl+D)
            break;
        }

        if !repl_line(session, &line, config) {
            return Ok(());
        }
    }

    Ok(())
}

/// Run one input line. `false` once the user asked to quit.
fn repl_line(session: &mut Session, line: &str, config: &Config) -> bool {
    for part in line.split(';') {
        let words: Vec<&str> = part.split_whitespace().collect();
        let Some(first) = words.first() else {
            continue;
        };
        if matches!(*first, "quit" | "exit") {
            return false;
        }

        let parsed = match ReplLine::try_parse_from(words.iter().copied()) {
            Ok(parsed) => parsed,
            Err(err) => {
                let _ = err.print();
                continue;
            }
        };

        // bursts of generate coalesce into one run; anything else sees
        // the regenerated list
        if !matches!(parsed.command, Command::Generate) {
            flush_generate(session, config);
        }
        let result = match parsed.command {
            Command::Repl => {
                println!("already in the REPL");
                Ok(())
            }
            Command::Generate => {
                session.request_generate();
                Ok(())
            }
            command => run(session, command, config),
        };
        if let Err(err) = result {
            println!("error: {err:#}");
        }
    }

    flush_generate(session, config);
    true
}

fn flush_generate(session: &mut Session, config: &Config) {
    if let Some(outcome) = session.tick(config.debounce_ms) {
        report(session, outcome).unwrap_or_else(|err| println!("error: {err:#}"));
    }
}

fn run(session: &mut Session, command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Colors => {
            for line in render::color_lines(session.state()) {
                println!("{line}");
            }
        }
        Command::AddColor { value } => apply(session, Action::AddColor(value))?,
        Command::SetColor { color, value } => {
            let id = resolve_color(session.state(), &color)?.id.clone();
            apply(session, Action::UpdateColor { id, value })?;
        }
        Command::RemoveColor { color } => {
            let id = resolve_color(session.state(), &color)?.id.clone();
            apply(session, Action::RemoveColor(id))?;
        }
        Command::Size { n } => apply(session, Action::SetPaletteSize(n))?,
        Command::Budget { n } => apply(session, Action::SetSampleBudget(n))?,
        Command::Generate => apply(session, Action::Generate)?,
        Command::List { filter, page } => list(session.state(), filter.into(), page, config),
        Command::Toggle { palette } => {
            let id = resolve_palette(session.state(), &palette)?;
            apply(session, Action::ToggleUsed(id))?;
        }
        Command::Mark { colors } => {
            let colors = colors
                .iter()
                .map(|c| resolve_color(session.state(), c).cloned())
                .collect::<anyhow::Result<Vec<Color>>>()?;
            apply(session, Action::AddUsedPalette(colors))?;
        }
        Command::ClearUsed => apply(session, Action::ClearUsed)?,
        Command::ClearAll { yes } => {
            if !yes {
                bail!("clear-all also removes used palettes; pass --yes to confirm");
            }
            apply(session, Action::ClearAll)?;
        }
        Command::Shuffle => apply(session, Action::Shuffle)?,
        Command::Stats => {
            let stats = session.statistics();
            for line in render::statistics_lines(session.state(), &stats) {
                println!("{line}");
            }
        }
        Command::Count => {
            let ws = session.state();
            println!("{}", render::count_line(ws, &ws.total_combinations()));
        }
        Command::Export { path } => {
            session
                .export_to(&path)
                .with_context(|| format!("export to '{}'", path.display()))?;
            println!("Exported to: {}", path.display());
        }
        Command::Import { path } => {
            let ws = session
                .import_from(&path)
                .with_context(|| format!("import from '{}'", path.display()))?;
            println!(
                "Imported {} colors, {} palettes ({} used)",
                ws.input_colors.len(),
                ws.generated_palettes.len(),
                ws.used_count()
            );
            if let Some(warning) = session.last_persist_warning() {
                eprintln!("warning: {warning}");
            }
        }
        Command::Repl => repl(session, config)?,
    }
    Ok(())
}

fn apply(session: &mut Session, action: Action) -> anyhow::Result<()> {
    let outcome = session.dispatch(action);
    report(session, outcome)
}

fn report(session: &Session, outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Reconciled(r) => {
            println!(
                "{} used kept, {} used dropped, {} generated",
                r.kept_used, r.dropped_used, r.generated
            );
            if r.exhausted {
                println!("every possible palette is listed");
            }
        }
        Outcome::ColorAdded(id) => println!("Added color {id}"),
        Outcome::Toggled { id, used } => {
            let state = if used { "used" } else { "unused" };
            println!("Palette {id} marked {state}");
        }
        Outcome::PaletteAdded(status) => match status {
            AddStatus::Added => println!("Added a new used palette"),
            AddStatus::Exist => println!("Marked the existing palette used"),
            AddStatus::AlreadyUsed => println!("Palette was already used"),
            AddStatus::Invalid => bail!(
                "a palette needs exactly {} current input colors",
                session.state().palette_size
            ),
        },
        Outcome::Cleared(n) => println!("Cleared {n} palettes"),
        Outcome::Shuffled => println!("Shuffled"),
        Outcome::UnknownPalette(id) => bail!("no palette '{id}'"),
        Outcome::Rejected(err) => return Err(err.into()),
    }

    if let Some(warning) = session.last_persist_warning() {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn list(ws: &WorkingSet, filter: PaletteFilter, page: usize, config: &Config) {
    let page = ws.page(filter, page.saturating_sub(1), config.page_size);
    for palette in &page.palettes {
        let index = ws
            .generated_palettes
            .iter()
            .position(|p| p.id == palette.id)
            .unwrap_or(0);
        println!("{}", render::palette_line(index + 1, palette));
    }
    println!(
        "page {}/{} ({} palettes)",
        page.index + 1,
        page.total_pages.max(1),
        page.total_items
    );
}

/// A 1-based index into the input colors, or a color id.
fn resolve_color<'a>(ws: &'a WorkingSet, key: &str) -> anyhow::Result<&'a Color> {
    if let Ok(n) = key.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| ws.input_colors.get(i))
            .with_context(|| format!("no color #{n} (have {})", ws.input_colors.len()));
    }
    ws.color(key).with_context(|| format!("no color '{key}'"))
}

/// A 1-based index into the palette list, or a palette id.
fn resolve_palette(ws: &WorkingSet, key: &str) -> anyhow::Result<String> {
    if let Ok(n) = key.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| ws.generated_palettes.get(i))
            .map(|p| p.id.clone())
            .with_context(|| format!("no palette #{n}"));
    }
    ws.find_palette(key)
        .map(|p| p.id.clone())
        .with_context(|| format!("no palette '{key}'"))
}
