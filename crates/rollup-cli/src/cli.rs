use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rollup_csv::{read_records, CsvOptions};
use rollup_engine::{aggregate_many, AggregateOptions, GroupingSpec, KeyMode, Record, ResultSet};
use serde::Deserialize;

use crate::render;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KeyModeArg {
    /// Group by the `_`-joined text of the category values.
    Composite,
    /// Group by the typed category values (no separator/type collisions).
    Typed,
}

impl From<KeyModeArg> for KeyMode {
    fn from(value: KeyModeArg) -> Self {
        match value {
            KeyModeArg::Composite => KeyMode::Composite,
            KeyModeArg::Typed => KeyMode::Typed,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rollup",
    about = "Group CSV records by category fields and sum value fields."
)]
pub struct Args {
    /// CSV file with a header row (`-` reads stdin).
    pub input: PathBuf,

    /// Field to group by (repeatable; comma-separated lists accepted).
    #[arg(short = 'c', long = "category", value_delimiter = ',')]
    pub category_keys: Vec<String>,

    /// Field to sum within each group (repeatable; comma-separated lists accepted).
    #[arg(short = 'v', long = "value", value_delimiter = ',')]
    pub value_keys: Vec<String>,

    /// JSON file holding one grouping spec or an array of them.
    ///
    /// Format: `{"categoryKeys": [...], "valueKeys": [...]}`. Specs from the file run after the
    /// one given with `--category`/`--value`.
    #[arg(long, value_name = "PATH")]
    pub spec_file: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// How records are assigned to groups.
    #[arg(long, value_enum, default_value_t = KeyModeArg::Composite)]
    pub key_mode: KeyModeArg,

    /// CSV field delimiter (a single ASCII character).
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Keep every cell as text instead of inferring numbers and booleans.
    #[arg(long)]
    pub no_dynamic_typing: bool,

    /// Accumulate in shards of this many rows and merge the partial results.
    #[arg(long, value_name = "ROWS")]
    pub shard_rows: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecFile {
    Many(Vec<GroupingSpec>),
    One(GroupingSpec),
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<()> {
    let specs = collect_specs(&args)?;
    if specs.is_empty() {
        bail!("no grouping given: pass --category/--value or --spec-file");
    }

    if !args.delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character, got {:?}", args.delimiter);
    }
    let csv_options = CsvOptions {
        delimiter: args.delimiter as u8,
        dynamic_typing: !args.no_dynamic_typing,
        ..CsvOptions::default()
    };

    let records = read_input(&args.input, &csv_options)
        .with_context(|| format!("read {}", display_input(&args.input)))?;
    log::debug!(
        "read {} records from {}; running {} grouping spec(s)",
        records.len(),
        display_input(&args.input),
        specs.len()
    );

    let options = AggregateOptions {
        key_mode: args.key_mode.into(),
        shard_rows: args.shard_rows,
    };
    let results = aggregate_many(&records, &specs, &options)
        .into_iter()
        .zip(&specs)
        .map(|(result, spec)| {
            result.with_context(|| format!("group by {}", spec.describe()))
        })
        .collect::<Result<Vec<ResultSet>>>()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = match args.format {
        OutputFormat::Text => render::write_text(&mut out, &specs, &results),
        OutputFormat::Json => render::write_json(&mut out, &results),
    };
    match written.and_then(|()| out.flush()) {
        Ok(()) => Ok(()),
        // Downstream consumer exited early (e.g. `rollup ... | head`).
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err).context("write output"),
    }
}

fn collect_specs(args: &Args) -> Result<Vec<GroupingSpec>> {
    let mut specs = Vec::new();
    if !args.category_keys.is_empty() || !args.value_keys.is_empty() {
        specs.push(GroupingSpec {
            category_keys: trimmed(&args.category_keys),
            value_keys: trimmed(&args.value_keys),
        });
    }

    if let Some(path) = args.spec_file.as_deref() {
        let file =
            File::open(path).with_context(|| format!("open spec file {}", path.display()))?;
        let parsed: SpecFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse spec file {}", path.display()))?;
        match parsed {
            SpecFile::Many(many) => specs.extend(many),
            SpecFile::One(one) => specs.push(one),
        }
    }

    Ok(specs)
}

fn trimmed(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn read_input(path: &Path, options: &CsvOptions) -> Result<Vec<Record>> {
    if path == Path::new("-") {
        let stdin = io::stdin();
        return Ok(read_records(stdin.lock(), options)?);
    }
    let file = File::open(path)?;
    Ok(read_records(BufReader::new(file), options)?)
}

fn display_input(path: &Path) -> String {
    if path == Path::new("-") {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}
