use crate::chm::ChmFile;
use crate::cli::{Action, Task};
use crate::reader::ArchiveReader;
use anyhow::{bail, Context, Result};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Validate filesystem preconditions for `task`, open the archive and perform
/// its single operation. The archive handle is dropped on every exit path.
pub fn run(task: &Task) -> Result<()> {
    if !task.archive.exists() {
        bail!("No such file: {}", task.archive.display());
    }
    if task.archive.is_dir() {
        bail!(
            "A regular file is expected, got directory: {}",
            task.archive.display()
        );
    }

    let mut source = ChmFile::open(&task.archive)?;
    perform(&mut source, &task.action)
}

/// Exactly one collaborator call per action. Text conversion refuses to
/// overwrite an existing destination; the other modes leave overwrite policy
/// to the collaborator.
pub fn perform(source: &mut dyn ArchiveReader, action: &Action) -> Result<()> {
    match action {
        Action::Extract { dest } => {
            source.extract(dest)?;
        }
        Action::ConvertToText { dest } => {
            if dest.exists() {
                bail!("{} already exists", dest.display());
            }
            let out = File::create(dest)
                .with_context(|| format!("Failed to create {}", dest.display()))?;
            let mut writer = BufWriter::new(out);
            source.convert_to_text(&mut writer)?;
            writer.flush()?;
            info!("Wrote {}", dest.display());
        }
        Action::ConvertToDocument { dest, kind } => {
            source.convert_to_document(dest, *kind)?;
            info!("Wrote {}", dest.display());
        }
        Action::DumpMarkup => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            source.dump_markup(&mut out)?;
        }
    }
    Ok(())
}
