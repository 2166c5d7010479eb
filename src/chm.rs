use crate::cli::DocumentKind;
use crate::error::{ChmError, Result};
use crate::reader::ArchiveReader;
use crate::text;
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

const ITSF_MAGIC: &[u8; 4] = b"ITSF";
const ITSP_MAGIC: &[u8; 4] = b"ITSP";
const PMGL_MAGIC: &[u8; 4] = b"PMGL";
const SUPPORTED_VERSION: u32 = 3;
const PMGL_HEADER_LEN: usize = 20;

/// One directory listing record: where an object's bytes live.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub section: u64,
    pub offset: u64,
    pub length: u64,
}

/// An opened CHM archive: the parsed directory plus the file handle content
/// reads are served from. The handle is released on drop.
#[derive(Debug)]
pub struct ChmFile {
    file: File,
    content_offset: u64,
    entries: Vec<DirEntry>,
}

impl ChmFile {
    /// Open `path`, validate the ITSF header and walk the ITSP directory.
    pub fn open(path: &Path) -> Result<ChmFile> {
        let file = File::open(path)
            .map_err(|e| ChmError::IoContext(path.display().to_string(), e))?;
        let mut reader = BufReader::new(&file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != ITSF_MAGIC {
            return Err(ChmError::InvalidMagic(u32::from_le_bytes(magic)));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SUPPORTED_VERSION {
            return Err(ChmError::UnsupportedVersion(version));
        }
        let _header_len = reader.read_u32::<LittleEndian>()?;
        let _ = reader.read_u32::<LittleEndian>()?;
        let _timestamp = reader.read_u32::<LittleEndian>()?;
        let _language = reader.read_u32::<LittleEndian>()?;
        let mut guids = [0u8; 32];
        reader.read_exact(&mut guids)?;

        let _sec0_offset = reader.read_u64::<LittleEndian>()?;
        let _sec0_length = reader.read_u64::<LittleEndian>()?;
        let dir_offset = reader.read_u64::<LittleEndian>()?;
        let _dir_length = reader.read_u64::<LittleEndian>()?;
        // Version 3 stores the content section base right after the
        // header section table.
        let content_offset = reader.read_u64::<LittleEndian>()?;

        reader.seek(SeekFrom::Start(dir_offset))?;
        reader.read_exact(&mut magic)?;
        if &magic != ITSP_MAGIC {
            return Err(ChmError::Malformed("missing ITSP directory header".into()));
        }
        let _itsp_version = reader.read_u32::<LittleEndian>()?;
        let itsp_header_len = reader.read_u32::<LittleEndian>()?;
        let _ = reader.read_u32::<LittleEndian>()?;
        let chunk_size = reader.read_u32::<LittleEndian>()? as usize;
        let _density = reader.read_u32::<LittleEndian>()?;
        let _depth = reader.read_u32::<LittleEndian>()?;
        let _root_index = reader.read_i32::<LittleEndian>()?;
        let _first_pmgl = reader.read_u32::<LittleEndian>()?;
        let _last_pmgl = reader.read_u32::<LittleEndian>()?;
        let _ = reader.read_i32::<LittleEndian>()?;
        let num_chunks = reader.read_u32::<LittleEndian>()?;

        if chunk_size <= PMGL_HEADER_LEN {
            return Err(ChmError::Malformed(format!(
                "implausible directory chunk size {chunk_size}"
            )));
        }

        let mut entries = Vec::new();
        let mut chunk = vec![0u8; chunk_size];
        for index in 0..num_chunks as u64 {
            reader.seek(SeekFrom::Start(
                dir_offset + itsp_header_len as u64 + index * chunk_size as u64,
            ))?;
            reader.read_exact(&mut chunk)?;
            // PMGI index chunks carry no listings of their own
            if &chunk[..4] != PMGL_MAGIC {
                continue;
            }
            parse_pmgl(&chunk, &mut entries)?;
        }

        debug!("{}: {} directory entries", path.display(), entries.len());
        Ok(ChmFile {
            file,
            content_offset,
            entries,
        })
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    fn read_content(&mut self, entry: &DirEntry) -> Result<Vec<u8>> {
        if entry.section != 0 {
            // Non-zero sections are LZX-compressed
            return Err(ChmError::UnsupportedCompression(entry.section));
        }
        self.file
            .seek(SeekFrom::Start(self.content_offset + entry.offset))?;
        let mut data = vec![0u8; entry.length as usize];
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Materialize every content entry under `dest`.
    pub fn do_extract(&mut self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)
            .map_err(|e| ChmError::IoContext(dest.display().to_string(), e))?;

        let content: Vec<DirEntry> = self
            .entries
            .iter()
            .filter(|e| is_content(&e.name))
            .cloned()
            .collect();

        let mut files = 0usize;
        for entry in &content {
            let disk_path = sanitized_join(dest, &entry.name);
            if entry.name.ends_with('/') && entry.length == 0 {
                fs::create_dir_all(&disk_path)?;
                continue;
            }
            if let Some(parent) = disk_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = self.read_content(entry)?;
            fs::write(&disk_path, &data)
                .map_err(|e| ChmError::IoContext(disk_path.display().to_string(), e))?;
            files += 1;
        }

        info!("Extracted {} files to {}", files, dest.display());
        Ok(())
    }

    /// Render every HTML page to plain text, in directory order, separated
    /// by blank lines.
    pub fn do_convert_to_text(&mut self, out: &mut dyn Write) -> Result<()> {
        let docs = self.documents();
        let mut first = true;
        for entry in &docs {
            let data = self.read_content(entry)?;
            let rendered = text::html_to_text(&String::from_utf8_lossy(&data));
            if rendered.is_empty() {
                continue;
            }
            if !first {
                out.write_all(b"\n")?;
            }
            out.write_all(rendered.as_bytes())?;
            first = false;
        }
        Ok(())
    }

    /// Assemble all HTML pages into a single document via `htmldoc`.
    pub fn do_convert_to_document(&mut self, dest: &Path, kind: DocumentKind) -> Result<()> {
        let staging = tempfile::tempdir()?;
        self.do_extract(staging.path())?;

        let pages: Vec<PathBuf> = self
            .documents()
            .iter()
            .map(|e| sanitized_join(staging.path(), &e.name))
            .collect();
        if pages.is_empty() {
            return Err(ChmError::Malformed(
                "archive contains no HTML documents".into(),
            ));
        }

        let format = match kind {
            DocumentKind::Html => "html",
            DocumentKind::Pdf => "pdf",
        };
        debug!("running htmldoc over {} pages", pages.len());
        let output = Command::new("htmldoc")
            .arg("--webpage")
            .args(["-t", format])
            .arg("-f")
            .arg(dest)
            .args(&pages)
            .output()
            .map_err(|e| ChmError::Converter(format!("failed to run htmldoc: {e}")))?;
        if !output.status.success() {
            return Err(ChmError::Converter(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// Stream every HTML page's raw bytes to `out`, in directory order.
    pub fn do_dump_markup(&mut self, out: &mut dyn Write) -> Result<()> {
        let docs = self.documents();
        for entry in &docs {
            let data = self.read_content(entry)?;
            out.write_all(&data)?;
        }
        Ok(())
    }

    fn documents(&self) -> Vec<DirEntry> {
        self.entries
            .iter()
            .filter(|e| is_document(&e.name))
            .cloned()
            .collect()
    }
}

impl ArchiveReader for ChmFile {
    fn extract(&mut self, dest: &Path) -> anyhow::Result<()> {
        Ok(self.do_extract(dest)?)
    }

    fn convert_to_text(&mut self, out: &mut dyn Write) -> anyhow::Result<()> {
        Ok(self.do_convert_to_text(out)?)
    }

    fn convert_to_document(&mut self, dest: &Path, kind: DocumentKind) -> anyhow::Result<()> {
        Ok(self.do_convert_to_document(dest, kind)?)
    }

    fn dump_markup(&mut self, out: &mut dyn Write) -> anyhow::Result<()> {
        Ok(self.do_dump_markup(out)?)
    }
}

fn parse_pmgl(chunk: &[u8], entries: &mut Vec<DirEntry>) -> Result<()> {
    // Offset 4 holds the free space at the chunk's tail (quickref area);
    // entries occupy everything between the header and that tail.
    let free_space =
        u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as usize;
    let end = chunk.len().saturating_sub(free_space).max(PMGL_HEADER_LEN);

    let mut pos = PMGL_HEADER_LEN;
    while pos < end {
        let name_len = read_encint(chunk, &mut pos)? as usize;
        if name_len == 0 || pos + name_len > end {
            return Err(ChmError::Malformed(
                "directory entry overruns its chunk".into(),
            ));
        }
        let name = String::from_utf8_lossy(&chunk[pos..pos + name_len]).into_owned();
        pos += name_len;
        let section = read_encint(chunk, &mut pos)?;
        let offset = read_encint(chunk, &mut pos)?;
        let length = read_encint(chunk, &mut pos)?;
        entries.push(DirEntry {
            name,
            section,
            offset,
            length,
        });
    }
    Ok(())
}

/// Big-endian 7-bit variable-length integer: high bit marks continuation.
fn read_encint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| ChmError::Malformed("truncated directory entry".into()))?;
        *pos += 1;
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Normal content objects start with `/`; `/#…` and `/$…` are the help
/// system's indexes and `::…` storages are internal metadata.
fn is_content(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('/') && !matches!(chars.next(), Some('#') | Some('$'))
}

fn is_document(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    is_content(name) && (lower.ends_with(".html") || lower.ends_with(".htm"))
}

/// Join an archive entry name onto `root`, dropping `.`/`..` segments so a
/// hostile name cannot escape the destination. Handles both separators since
/// archives may carry Windows-style names.
fn sanitized_join(root: &Path, name: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for part in name.split(['/', '\\']) {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        out.push(part);
    }
    out
}
