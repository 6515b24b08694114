// Faststart adapter - Moves the MP4 index ahead of the media payload

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::ports::StreamFinalizer;

/// Largest `moov` box loaded into memory
const MAX_MOOV_SIZE: u64 = 64 * 1024 * 1024;

/// Boxes whose payload is a list of child boxes on the way down to `stco`/`co64`
const CONTAINERS: [&[u8; 4]; 5] = [b"moov", b"trak", b"mdia", b"minf", b"stbl"];

/// One top-level box of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TopLevelBox {
    kind: [u8; 4],
    start: u64,
    size: u64,
}

/// Pure-Rust [`StreamFinalizer`] for MP4 files.
///
/// Moves the top-level `moov` box in front of the first `mdat` and shifts every
/// chunk offset that pointed past the insertion point.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaststartAdapter;

impl FaststartAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl StreamFinalizer for FaststartAdapter {
    fn rewrite(&self, input: &Path, output: &Path) -> PipelineResult<bool> {
        let mut reader = File::open(input)?;
        let file_size = reader.metadata()?.len();
        let boxes = read_top_level(&mut reader, file_size)?;

        let moov = boxes.iter().find(|b| &b.kind == b"moov").copied();
        let first_mdat = boxes.iter().position(|b| &b.kind == b"mdat");
        let (Some(moov), Some(first_mdat)) = (moov, first_mdat) else {
            warn!(input = %input.display(), "No moov/mdat pair, cannot rewrite for streaming");
            return Ok(false);
        };

        if moov.start < boxes[first_mdat].start {
            debug!(input = %input.display(), "Index already precedes media, copying");
            std::fs::copy(input, output)?;
            return Ok(true);
        }

        if moov.size > MAX_MOOV_SIZE {
            warn!(size = moov.size, "moov box too large to rewrite");
            return Ok(false);
        }
        let moov_size = usize::try_from(moov.size)
            .map_err(|_| PipelineError::Container(format!("moov size {} not addressable", moov.size)))?;

        let mut moov_bytes = vec![0u8; moov_size];
        reader.seek(SeekFrom::Start(moov.start))?;
        reader.read_exact(&mut moov_bytes)?;

        let insert_at = boxes[first_mdat].start;
        if let Err(reason) = shift_chunk_offsets(&mut moov_bytes, insert_at, moov.start, moov.size) {
            warn!(%reason, "Chunk offsets cannot be shifted");
            return Ok(false);
        }

        let mut writer = BufWriter::new(File::create(output)?);
        for b in boxes.iter().take_while(|b| b.start < insert_at) {
            copy_range(&mut reader, &mut writer, b.start, b.size)?;
        }
        writer.write_all(&moov_bytes)?;
        for b in boxes.iter().filter(|b| b.start >= insert_at && b.start != moov.start) {
            copy_range(&mut reader, &mut writer, b.start, b.size)?;
        }
        writer.flush()?;

        info!(
            input = %input.display(),
            output = %output.display(),
            moov_size = moov.size,
            "Moved index ahead of media data"
        );
        Ok(true)
    }
}

fn read_top_level(reader: &mut File, file_size: u64) -> PipelineResult<Vec<TopLevelBox>> {
    let mut boxes = Vec::new();
    let mut pos = 0u64;

    while pos < file_size {
        reader.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;

        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let kind = [header[4], header[5], header[6], header[7]];
        let size = match size32 {
            1 => {
                let mut ext = [0u8; 8];
                reader.read_exact(&mut ext)?;
                u64::from_be_bytes(ext)
            }
            0 => file_size - pos,
            n => n,
        };

        let end = pos.checked_add(size).filter(|end| size >= 8 && *end <= file_size);
        let Some(end) = end else {
            return Err(PipelineError::Container(format!(
                "box {} at {} has invalid size {}",
                String::from_utf8_lossy(&kind),
                pos,
                size
            )));
        };

        boxes.push(TopLevelBox { kind, start: pos, size });
        pos = end;
    }

    Ok(boxes)
}

fn copy_range(reader: &mut File, writer: &mut impl Write, start: u64, len: u64) -> io::Result<()> {
    reader.seek(SeekFrom::Start(start))?;
    let copied = io::copy(&mut Read::by_ref(reader).take(len), writer)?;
    if copied != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "source truncated during rewrite"));
    }
    Ok(())
}

/// Add `delta` to every chunk offset in `[insert_at, moov_start)`.
///
/// Offsets at or past the original `moov` position do not move.
fn shift_chunk_offsets(moov: &mut [u8], insert_at: u64, moov_start: u64, delta: u64) -> Result<(), String> {
    let (header, _) = box_header(moov, 0)?;
    walk(&mut moov[header..], insert_at, moov_start, delta)
}

/// Header length and total size of the box at `pos`
fn box_header(buf: &[u8], pos: usize) -> Result<(usize, usize), String> {
    let size32 = u32::from_be_bytes(be4(header_field(buf, pos, 0..4)?)) as u64;
    let (header, size) = match size32 {
        1 => (16, u64::from_be_bytes(be8(header_field(buf, pos, 8..16)?))),
        0 => (8, (buf.len() - pos) as u64),
        n => (8, n),
    };

    let size = usize::try_from(size).map_err(|_| format!("box at {} too large", pos))?;
    if size < header || pos.checked_add(size).map_or(true, |end| end > buf.len()) {
        return Err(format!("box at {} has invalid size {}", pos, size));
    }
    Ok((header, size))
}

fn header_field(buf: &[u8], pos: usize, range: std::ops::Range<usize>) -> Result<&[u8], String> {
    buf.get(pos + range.start..pos + range.end)
        .ok_or_else(|| format!("truncated box header at {}", pos))
}

fn walk(buf: &mut [u8], insert_at: u64, moov_start: u64, delta: u64) -> Result<(), String> {
    let mut pos = 0;
    while pos + 8 <= buf.len() {
        let (header, size) = box_header(buf, pos)?;
        let kind = [buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]];
        let body = &mut buf[pos + header..pos + size];

        match &kind {
            b"stco" => patch_table(body, 4, insert_at, moov_start, delta)?,
            b"co64" => patch_table(body, 8, insert_at, moov_start, delta)?,
            k if CONTAINERS.contains(&k) => walk(body, insert_at, moov_start, delta)?,
            _ => {}
        }
        pos += size;
    }
    Ok(())
}

/// Patch a full-box offset table with `width`-byte entries
fn patch_table(body: &mut [u8], width: usize, insert_at: u64, moov_start: u64, delta: u64) -> Result<(), String> {
    let count = body
        .get(4..8)
        .map(|b| u32::from_be_bytes(be4(b)) as usize)
        .ok_or("truncated chunk offset table")?;
    let end = count
        .checked_mul(width)
        .and_then(|len| len.checked_add(8))
        .ok_or("chunk offset table too large")?;
    let entries = body
        .get_mut(8..end)
        .ok_or("chunk offset table shorter than its entry count")?;

    for entry in entries.chunks_exact_mut(width) {
        let offset = if width == 4 {
            u64::from(u32::from_be_bytes(be4(entry)))
        } else {
            u64::from_be_bytes(be8(entry))
        };
        if offset < insert_at || offset >= moov_start {
            continue;
        }
        let shifted = offset + delta;
        if width == 4 {
            let shifted = u32::try_from(shifted).map_err(|_| format!("offset {} exceeds 32 bits", shifted))?;
            entry.copy_from_slice(&shifted.to_be_bytes());
        } else {
            entry.copy_from_slice(&shifted.to_be_bytes());
        }
    }
    Ok(())
}

fn be4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[..4]);
    out
}

fn be8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn offsets_box(kind: &[u8; 4], offsets: &[u64]) -> Vec<u8> {
        let mut body = vec![0, 0, 0, 0];
        body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
        for offset in offsets {
            if kind == b"stco" {
                body.extend_from_slice(&(*offset as u32).to_be_bytes());
            } else {
                body.extend_from_slice(&offset.to_be_bytes());
            }
        }
        mp4_box(kind, &body)
    }

    fn moov_with(table: Vec<u8>) -> Vec<u8> {
        let stbl = mp4_box(b"stbl", &table);
        let minf = mp4_box(b"minf", &stbl);
        let mdia = mp4_box(b"mdia", &minf);
        let trak = mp4_box(b"trak", &mdia);
        let mvhd = mp4_box(b"mvhd", &[0u8; 20]);
        mp4_box(b"moov", &[mvhd, trak].concat())
    }

    /// ftyp + mdat(two chunks) + moov, offsets pointing at the chunks
    fn tail_moov_file(kind: &[u8; 4]) -> (Vec<u8>, Vec<u64>) {
        let ftyp = mp4_box(b"ftyp", b"isom\0\0\x02\0isomavc1");
        let payload: Vec<u8> = (0..64u8).collect();
        let mdat = mp4_box(b"mdat", &payload);
        let chunk_a = (ftyp.len() + 8) as u64;
        let chunk_b = chunk_a + 32;
        let moov = moov_with(offsets_box(kind, &[chunk_a, chunk_b]));
        ([ftyp, mdat, moov].concat(), vec![chunk_a, chunk_b])
    }

    fn read_offsets(file: &[u8], kind: &[u8; 4]) -> Vec<u64> {
        let pos = file.windows(4).position(|w| w == kind).unwrap() + 4;
        let count = u32::from_be_bytes(be4(&file[pos + 4..])) as usize;
        let width = if kind == b"stco" { 4 } else { 8 };
        (0..count)
            .map(|i| {
                let at = pos + 8 + i * width;
                if width == 4 {
                    u32::from_be_bytes(be4(&file[at..])) as u64
                } else {
                    u64::from_be_bytes(be8(&file[at..]))
                }
            })
            .collect()
    }

    fn rewrite_bytes(bytes: &[u8]) -> (bool, Vec<u8>) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        std::fs::write(&input, bytes).unwrap();
        let rewritten = FaststartAdapter::new().rewrite(&input, &output).unwrap();
        let out = std::fs::read(&output).unwrap_or_default();
        (rewritten, out)
    }

    #[test]
    fn test_moves_moov_and_shifts_stco() {
        let (file, offsets) = tail_moov_file(b"stco");
        let (rewritten, out) = rewrite_bytes(&file);
        assert!(rewritten);
        assert_eq!(out.len(), file.len());

        let moov_pos = out.windows(4).position(|w| w == b"moov").unwrap();
        let mdat_pos = out.windows(4).position(|w| w == b"mdat").unwrap();
        assert!(moov_pos < mdat_pos);

        let new_offsets = read_offsets(&out, b"stco");
        let moov_size = file.len() - file.windows(4).position(|w| w == b"moov").unwrap() + 4;
        for (old, new) in offsets.iter().zip(&new_offsets) {
            assert_eq!(*new, old + moov_size as u64);
            assert_eq!(file[*old as usize], out[*new as usize]);
        }
    }

    #[test]
    fn test_shifts_co64() {
        let (file, offsets) = tail_moov_file(b"co64");
        let (rewritten, out) = rewrite_bytes(&file);
        assert!(rewritten);
        let new_offsets = read_offsets(&out, b"co64");
        for (old, new) in offsets.iter().zip(&new_offsets) {
            assert_eq!(file[*old as usize], out[*new as usize]);
        }
    }

    #[test]
    fn test_already_streamable_is_copied() {
        let ftyp = mp4_box(b"ftyp", b"isom");
        let moov = moov_with(offsets_box(b"stco", &[100]));
        let mdat = mp4_box(b"mdat", &[7u8; 16]);
        let file = [ftyp, moov, mdat].concat();

        let (rewritten, out) = rewrite_bytes(&file);
        assert!(rewritten);
        assert_eq!(out, file);
    }

    #[test]
    fn test_missing_moov_is_not_rewritten() {
        let file = [mp4_box(b"ftyp", b"isom"), mp4_box(b"mdat", &[1u8; 8])].concat();
        let (rewritten, _) = rewrite_bytes(&file);
        assert!(!rewritten);
    }

    #[test]
    fn test_offset_overflow_is_rejected() {
        let mut moov = moov_with(offsets_box(b"stco", &[u64::from(u32::MAX) - 4]));
        let delta = moov.len() as u64;
        assert!(shift_chunk_offsets(&mut moov, 0, u64::MAX, delta).is_err());
    }

    #[test]
    fn test_truncated_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bad.mp4");
        let mut bytes = mp4_box(b"ftyp", b"isom");
        bytes.extend_from_slice(&[0, 0, 0x10, 0, b'm', b'd', b'a', b't']);
        std::fs::write(&input, bytes).unwrap();
        assert!(FaststartAdapter::new().rewrite(&input, &dir.path().join("o.mp4")).is_err());
    }

    #[test]
    fn test_huge_64bit_box_size_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("huge.mp4");
        let mut bytes = mp4_box(b"ftyp", b"isomavc1");
        bytes.extend_from_slice(&[0, 0, 0, 1, b'm', b'd', b'a', b't']);
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        std::fs::write(&input, bytes).unwrap();
        assert!(FaststartAdapter::new().rewrite(&input, &dir.path().join("o.mp4")).is_err());
    }

    #[test]
    fn test_huge_64bit_child_box_is_rejected() {
        let mut child = vec![0, 0, 0, 1, b't', b'r', b'a', b'k'];
        child.extend_from_slice(&(u64::MAX - 4).to_be_bytes());
        let mut moov = mp4_box(b"moov", &[mp4_box(b"mvhd", &[0u8; 20]), child].concat());
        assert!(shift_chunk_offsets(&mut moov, 0, u64::MAX, 8).is_err());
    }
}
