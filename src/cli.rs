use anyhow::{bail, Context, Result};
use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, Parser};
use std::path::{Path, PathBuf};

/// Extract and convert CHM (compiled HTML help) archives
#[derive(Parser, Debug)]
#[command(name = "unchm", version, about)]
pub struct Cli {
    /// Extract the archive into a directory (the default mode)
    #[arg(short = 'x', long, action = ArgAction::Count)]
    pub extract: u8,

    /// Convert the archive into FORMAT: text, html or pdf
    #[arg(short = 'c', long, value_name = "FORMAT", action = ArgAction::Append)]
    pub convert: Vec<String>,

    /// Dump the archive's HTML pages to standard output
    #[arg(short = 'd', long, action = ArgAction::Count)]
    pub dump: u8,

    /// Input CHM archive
    #[arg(value_name = "CHM_FILE")]
    pub archive: Option<PathBuf>,

    /// Output directory (extract) or output file (convert).
    /// Defaults to a path named after the CHM file in the current directory.
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(value_name = "EXTRA", hide = true)]
    pub extra: Vec<String>,
}

/// Value space of the `-c` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Html,
    Pdf,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Html => "html",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Assembled-document flavors `htmldoc` can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Pdf,
}

/// The single operation this run will perform. Carrying the destination
/// inside each variant means a mode that needs an output always has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Extract { dest: PathBuf },
    ConvertToText { dest: PathBuf },
    ConvertToDocument { dest: PathBuf, kind: DocumentKind },
    DumpMarkup,
}

/// Resolved invocation: built once from argv, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub archive: PathBuf,
    pub action: Action,
}

#[derive(Debug, Clone, Copy)]
enum ModeFlag {
    Extract,
    Convert,
    Dump,
}

impl ModeFlag {
    fn spelling(self) -> &'static str {
        match self {
            ModeFlag::Extract => "-x/--extract",
            ModeFlag::Convert => "-c/--convert",
            ModeFlag::Dump => "-d/--dump",
        }
    }
}

enum Mode {
    Extract,
    Convert(OutputFormat),
    Dump,
}

/// Turn parsed matches into a `Task`, or fail with a usage diagnostic.
///
/// Mode flags are replayed in command-line order so that the diagnostic for
/// conflicting flags names the second one the user typed, whichever it was.
pub fn resolve(matches: &ArgMatches) -> Result<Task> {
    let mut observed: Vec<(usize, ModeFlag, Option<&str>)> = Vec::new();
    collect_counted_flag(matches, "extract", ModeFlag::Extract, &mut observed);
    collect_counted_flag(matches, "dump", ModeFlag::Dump, &mut observed);
    if let (Some(indices), Some(values)) = (
        matches.indices_of("convert"),
        matches.get_many::<String>("convert"),
    ) {
        observed.extend(
            indices
                .zip(values)
                .map(|(i, v)| (i, ModeFlag::Convert, Some(v.as_str()))),
        );
    }
    observed.sort_by_key(|(index, _, _)| *index);

    // Write-once mode slot: the second write is the error, and it fires
    // before the second flag's own value is looked at.
    let mut slot: Option<Mode> = None;
    for (_, flag, value) in observed {
        if slot.is_some() {
            bail!(
                "mutually exclusive options: {} cannot be combined with an earlier mode option",
                flag.spelling()
            );
        }
        slot = Some(match flag {
            ModeFlag::Extract => Mode::Extract,
            ModeFlag::Dump => Mode::Dump,
            ModeFlag::Convert => Mode::Convert(parse_format(value.unwrap_or_default())?),
        });
    }
    let mode = slot.unwrap_or(Mode::Extract);

    let archive = matches
        .get_one::<PathBuf>("archive")
        .cloned()
        .context("No CHM file was specified")?;
    let output = matches.get_one::<PathBuf>("output").cloned();
    let mut leftover: Vec<String> = matches
        .get_many::<String>("extra")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let action = match mode {
        Mode::Extract => Action::Extract {
            dest: match output {
                Some(dir) => dir,
                None => derive_extract_dir(&archive)?,
            },
        },
        Mode::Convert(format) => {
            let dest = match output {
                Some(file) => file,
                None => derive_convert_dest(&archive, format)?,
            };
            match format {
                OutputFormat::Text => Action::ConvertToText { dest },
                OutputFormat::Html => Action::ConvertToDocument {
                    dest,
                    kind: DocumentKind::Html,
                },
                OutputFormat::Pdf => Action::ConvertToDocument {
                    dest,
                    kind: DocumentKind::Pdf,
                },
            }
        }
        Mode::Dump => {
            // Dump consumes no output positional.
            if let Some(path) = output {
                leftover.insert(0, path.display().to_string());
            }
            Action::DumpMarkup
        }
    };

    if !leftover.is_empty() {
        bail!("Invalid arguments: {}", leftover.join(", "));
    }

    Ok(Task { archive, action })
}

/// Record every typed occurrence of a counted flag.
///
/// `ArgAction::Count` carries an implicit default of zero, so the flag shows
/// up in matches even when never typed; only command-line values are real.
/// It also records a single index however often the flag repeats, so the
/// occurrence is replayed `get_count` times to keep repeats visible to the
/// write-once slot.
fn collect_counted_flag<'a>(
    matches: &ArgMatches,
    id: &str,
    flag: ModeFlag,
    observed: &mut Vec<(usize, ModeFlag, Option<&'a str>)>,
) {
    if matches.value_source(id) != Some(ValueSource::CommandLine) {
        return;
    }
    let count = matches.get_count(id).max(1) as usize;
    if let Some(index) = matches.indices_of(id).and_then(|mut indices| indices.next()) {
        observed.extend(std::iter::repeat((index, flag, None)).take(count));
    }
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    match value {
        "text" => Ok(OutputFormat::Text),
        "html" => Ok(OutputFormat::Html),
        "pdf" => Ok(OutputFormat::Pdf),
        other => bail!("Unknown output format: {other} (expected text, html or pdf)"),
    }
}

/// Default extraction directory: the input's file stem, in the current
/// directory.
fn derive_extract_dir(input: &Path) -> Result<PathBuf> {
    let stem = input.file_stem().context("Input file has no name")?;
    Ok(PathBuf::from(stem))
}

/// Default conversion target: the input's file stem with the format's
/// conventional extension, in the current directory.
fn derive_convert_dest(input: &Path, format: OutputFormat) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .context("Input file has no name")?
        .to_string_lossy();
    Ok(PathBuf::from(format!("{}.{}", stem, format.extension())))
}
