use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;

use filekit::fs_op::metadata::FileMetadata;
use filekit::settings::Settings;
use filekit::{ReadFormat, ReaderOptions, StreamReader, StreamWriter, WriterOptions};

#[derive(Parser)]
#[command(name = "filekit", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging (overridden by FILEKIT_LOG).
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    verbose: bool,

    /// Settings file to use instead of the per-user stream.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the records of a file as JSON lines.
    Read {
        path: PathBuf,
        #[arg(long, short = 'f', value_enum, default_value_t = Format::Line)]
        format: Format,
        /// Start at this record.
        #[arg(long, default_value_t = 0)]
        skip: i64,
        /// Stop after this many records.
        #[arg(long)]
        limit: Option<usize>,
        /// Pattern for `regex`.
        #[arg(long)]
        pattern: Option<String>,
        /// Comma separated column widths for `fixed-width`.
        #[arg(long, value_delimiter = ',')]
        widths: Vec<usize>,
        /// Element name for `xml`.
        #[arg(long)]
        tag: Option<String>,
        /// Chunk size for `binary`.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Hold an exclusive lock while reading.
        #[arg(long, default_value_t = false)]
        exclusive: bool,
    },
    /// Encode stdin into a file, one record per input line.
    Write {
        path: PathBuf,
        #[arg(long, short = 'f', value_enum, default_value_t = WriteFormat::Line)]
        format: WriteFormat,
        /// Keep existing content.
        #[arg(long, short = 'a', default_value_t = false)]
        append: bool,
    },
    /// Print size, timestamps and permissions of a path as JSON.
    Info { path: PathBuf },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Character,
    Line,
    Csv,
    Binary,
    Json,
    Regex,
    FixedWidth,
    Xml,
    Serialized,
    JsonArray,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WriteFormat {
    Line,
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    filekit::logging::init(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };

    match cli.command {
        Command::Read {
            path,
            format,
            skip,
            limit,
            pattern,
            widths,
            tag,
            chunk_size,
            exclusive,
        } => {
            let format = match format {
                Format::Character => ReadFormat::Character,
                Format::Line => ReadFormat::Line,
                Format::Csv => ReadFormat::Csv(settings.csv),
                Format::Binary => match chunk_size {
                    Some(chunk_size) => ReadFormat::Binary { chunk_size },
                    None => settings.binary_format(),
                },
                Format::Json => ReadFormat::JsonLines,
                Format::Regex => {
                    let Some(pattern) = pattern else {
                        bail!("--pattern is required for the regex format");
                    };
                    let re = Regex::new(&pattern)
                        .with_context(|| format!("invalid pattern {pattern:?}"))?;
                    ReadFormat::Regex(re)
                }
                Format::FixedWidth => {
                    if widths.is_empty() {
                        bail!("--widths is required for the fixed-width format");
                    }
                    ReadFormat::FixedWidth(widths)
                }
                Format::Xml => {
                    let Some(tag) = tag else {
                        bail!("--tag is required for the xml format");
                    };
                    ReadFormat::Xml { tag }
                }
                Format::Serialized => ReadFormat::Serialized,
                Format::JsonArray => ReadFormat::JsonArray,
            };
            let mut options = ReaderOptions::from_settings(&settings);
            options.exclusive_lock = exclusive;
            read(path, format, options, skip, limit)
        }
        Command::Write {
            path,
            format,
            append,
        } => write(path, format, WriterOptions::from_settings(&settings, append)),
        Command::Info { path } => {
            let meta = FileMetadata::read(&path)
                .with_context(|| format!("cannot inspect {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }
    }
}

fn read(
    path: PathBuf,
    format: ReadFormat,
    options: ReaderOptions,
    skip: i64,
    limit: Option<usize>,
) -> Result<()> {
    let mut reader = StreamReader::with_options(&path, options);
    reader
        .select(format)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if skip > 0 {
        reader.seek(skip)?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in reader.by_ref().take(limit.unwrap_or(usize::MAX)) {
        let record = record.with_context(|| format!("while reading {}", path.display()))?;
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    reader.close()?;
    Ok(())
}

fn write(path: PathBuf, format: WriteFormat, options: WriterOptions) -> Result<()> {
    let mut writer = StreamWriter::with_options(&path, options);
    let stdin = io::stdin();

    match format {
        WriteFormat::Csv => {
            let mut rows = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .delimiter(options.csv.delimiter)
                .quote(options.csv.quote)
                .from_reader(stdin.lock());
            for row in rows.records() {
                let row = row.context("malformed CSV on stdin")?;
                writer.csv(row.iter())?;
            }
        }
        WriteFormat::Line | WriteFormat::Json => {
            for (n, line) in stdin.lock().lines().enumerate() {
                let line = line.context("cannot read stdin")?;
                if format == WriteFormat::Line {
                    writer.line(&line)?;
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(&line)
                    .with_context(|| format!("stdin line {} is not JSON", n + 1))?;
                writer.json(&value)?;
            }
        }
    }

    writer.flush()?;
    let summary = writer.summary()?;
    writer.close()?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
