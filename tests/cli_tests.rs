use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Test utilities for running the binary in isolation
mod test_utils {
    use super::*;

    pub fn vidpress(dir: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("vidpress").unwrap();
        cmd.current_dir(dir.path())
            .env_remove("VIDPRESS_LOG_LEVEL")
            .env_remove("VIDPRESS_JSON_LOGS")
            .env_remove("VIDPRESS_MAX_CONCURRENT_JOBS")
            .env_remove("VIDPRESS_MIN_SOURCE_BITRATE");
        cmd
    }

    pub fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    /// ftyp, mdat, moov with one `stco` entry pointing at the mdat payload
    pub fn tail_indexed_mp4() -> Vec<u8> {
        let ftyp = boxed(b"ftyp", b"isom\0\0\0\0");
        let mdat = boxed(b"mdat", b"DATA");
        let payload_offset = (ftyp.len() + 8) as u32;

        let mut stco_payload = vec![0u8; 4];
        stco_payload.extend_from_slice(&1u32.to_be_bytes());
        stco_payload.extend_from_slice(&payload_offset.to_be_bytes());

        let mut chunk = boxed(b"stco", &stco_payload);
        for kind in [b"stbl", b"minf", b"mdia", b"trak", b"moov"] {
            chunk = boxed(kind, &chunk);
        }

        [ftyp, mdat, chunk].concat()
    }
}

use test_utils::*;

#[test]
fn test_plan_from_metadata_flags_as_json() {
    let dir = tempfile::tempdir().unwrap();
    vidpress(&dir)
        .args([
            "plan",
            "--width",
            "3840",
            "--height",
            "2160",
            "--bitrate",
            "8000000",
            "--duration-ms",
            "60000",
            "--quality",
            "medium",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bitrate\": 2400000"))
        .stdout(predicate::str::contains("\"width\": 1920"))
        .stdout(predicate::str::contains("\"height\": 1080"));
}

#[test]
fn test_plan_text_output_with_window() {
    let dir = tempfile::tempdir().unwrap();
    vidpress(&dir)
        .args([
            "plan", "--width", "1280", "--height", "720", "--bitrate", "5000000", "--duration-ms", "30000",
            "--start", "5", "--end", "15", "--resize", "keep",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Encoding Plan"))
        .stdout(predicate::str::contains("Target: 1280x720"))
        .stdout(predicate::str::contains("Bitrate: 3000000 bps"))
        .stdout(predicate::str::contains("(10s)"));
}

#[test]
fn test_plan_rejects_low_bitrate_source() {
    let dir = tempfile::tempdir().unwrap();
    vidpress(&dir)
        .args(["plan", "--width", "640", "--height", "360", "--bitrate", "1500000", "--duration-ms", "10000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("smaller than what is needed"));
}

#[test]
fn test_plan_low_bitrate_allowed_without_check() {
    let dir = tempfile::tempdir().unwrap();
    vidpress(&dir)
        .args([
            "plan", "--width", "640", "--height", "360", "--bitrate", "1500000", "--duration-ms", "10000",
            "--no-min-bitrate-check", "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bitrate\": 900000"));
}

#[test]
fn test_plan_without_input_or_metadata_fails() {
    let dir = tempfile::tempdir().unwrap();
    vidpress(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}

#[test]
fn test_faststart_moves_index_ahead_of_media() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("recorded.mp4");
    let output = dir.path().join("streamable.mp4");
    let original = tail_indexed_mp4();
    std::fs::write(&input, &original).unwrap();

    vidpress(&dir)
        .args(["faststart", "--input", "recorded.mp4", "--output", "streamable.mp4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("streamable.mp4"));

    let rewritten = std::fs::read(&output).unwrap();
    assert_eq!(rewritten.len(), original.len());
    assert_eq!(&rewritten[20..24], b"moov");

    // moov is 60 bytes, so the chunk now starts 60 bytes later
    let moov_size = u32::from_be_bytes(rewritten[16..20].try_into().unwrap()) as usize;
    let stco_entry = 16 + moov_size - 4;
    let offset = u32::from_be_bytes(rewritten[stco_entry..stco_entry + 4].try_into().unwrap()) as usize;
    assert_eq!(offset, 24 + moov_size);
    assert_eq!(&rewritten[offset..offset + 4], b"DATA");
}

#[test]
fn test_faststart_without_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("raw.mp4"), boxed(b"mdat", b"DATA")).unwrap();

    vidpress(&dir)
        .args(["faststart", "--input", "raw.mp4", "--output", "out.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be prepared for streaming"));
}

#[test]
fn test_config_reflects_file_and_env_layers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("vidpress.toml"),
        "[compressor]\nmin_source_bitrate = 1000000\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    vidpress(&dir)
        .arg("config")
        .env("VIDPRESS_LOG_LEVEL", "error")
        .assert()
        .success()
        .stdout(predicate::str::contains("min_source_bitrate = 1000000"))
        .stdout(predicate::str::contains("level = \"error\""));
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("vidpress.toml"), "[compressor]\nturbo = true\n").unwrap();

    vidpress(&dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
