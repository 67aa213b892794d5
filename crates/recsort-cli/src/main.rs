//! recsort CLI: run a control statement deck over record files.
//!
//! ```text
//! recsort --cards sort.cards --input a.dat --input b.dat --output out.dat
//! recsort --control "SORT FIELDS=(1,8,CH,A)" < in.dat > out.dat
//! ```

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{debug, info};

use recsort::{RecordFormat, SortConfig, SortInput, Sorter};

/// Sort, merge and reformat record files with DFSORT-style control statements.
#[derive(Parser)]
#[command(name = "recsort", version, about)]
struct Cli {
    /// File holding the control statements.
    #[arg(short, long, conflicts_with = "control", required_unless_present = "control")]
    cards: Option<PathBuf>,

    /// Control statements given inline.
    #[arg(long)]
    control: Option<String>,

    /// Input files, in order. Reads stdin when absent.
    #[arg(short, long = "input")]
    inputs: Vec<PathBuf>,

    /// Output files, one per OUTFIL destination. Writes stdout when absent.
    #[arg(short, long = "output")]
    outputs: Vec<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed record length in bytes.
    #[arg(long, conflicts_with = "separator")]
    record_length: Option<usize>,

    /// Record separator; accepts \n, \r and \t escapes.
    #[arg(long)]
    separator: Option<String>,

    /// In-memory limit in bytes before spilling to disk.
    #[arg(long)]
    memory_limit: Option<u64>,

    /// Keep input order for equal keys.
    #[arg(long, conflicts_with = "unstable")]
    stable: bool,

    /// Allow equal keys in any order.
    #[arg(long)]
    unstable: bool,

    /// Leading header records copied to every output.
    #[arg(long)]
    header: Option<usize>,

    /// Directory for spill files.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Spill worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let cards = match (&cli.cards, cli.control) {
        (Some(path), _) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("reading control statements from {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => miette::bail!("no control statements given"),
    };
    let sorter = Sorter::from_cards(&cards, config)?;
    debug!(destinations = sorter.destination_count(), "control statements compiled");

    let inputs = if cli.inputs.is_empty() {
        let mut data = Vec::new();
        io::stdin()
            .read_to_end(&mut data)
            .into_diagnostic()
            .wrap_err("reading stdin")?;
        vec![SortInput::from(data)]
    } else {
        cli.inputs.iter().map(SortInput::file).collect()
    };

    let stats = if cli.outputs.is_empty() {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        sorter.sort(&inputs, &mut [&mut lock])?
    } else {
        let mut files = cli
            .outputs
            .iter()
            .map(|path| {
                File::create(path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("creating {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut outputs: Vec<&mut dyn Write> =
            files.iter_mut().map(|f| f as &mut dyn Write).collect();
        sorter.sort(&inputs, &mut outputs)?
    };

    info!(
        strategy = %stats.strategy,
        input = stats.input_records,
        output = stats.output_records,
        "done"
    );
    Ok(())
}

fn build_config(cli: &Cli) -> Result<SortConfig> {
    let mut config = match &cli.config {
        Some(path) => SortConfig::load(path)?,
        None => SortConfig::default(),
    };
    if let Some(length) = cli.record_length {
        config = config.with_record_format(RecordFormat::fixed(length));
    }
    if let Some(separator) = &cli.separator {
        config = config.with_record_format(RecordFormat::separated(unescape(separator)));
    }
    if let Some(limit) = cli.memory_limit {
        config = config.with_memory_limit(limit);
    }
    if cli.stable {
        config = config.with_stable(true);
    } else if cli.unstable {
        config = config.with_stable(false);
    }
    if let Some(count) = cli.header {
        config = config.with_header_records(count);
    }
    if let Some(dir) = &cli.temp_dir {
        config = config.with_temp_dir(dir);
    }
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    Ok(config)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\r\\n"), "\r\n");
        assert_eq!(unescape("|"), "|");
        assert_eq!(unescape("a\\\\b"), "a\\b");
    }

    #[test]
    fn test_build_config_flags() {
        let cli = Cli::parse_from([
            "recsort",
            "--control",
            "SORT FIELDS=(1,1,CH,A)",
            "--record-length",
            "80",
            "--unstable",
            "--header",
            "2",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.record_format, RecordFormat::fixed(80));
        assert!(!config.stable);
        assert_eq!(config.header_records, 2);
    }
}
