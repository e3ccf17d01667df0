use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_FILE: &str = "feeledger.sqlite3";
const DB_ENTRY: &str = "db/feeledger.sqlite3";
pub const BUNDLE_FORMAT: &str = "feeledger-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub db_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
}

fn sha256_file(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let bytes = std::io::copy(&mut f, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.to_string_lossy()))?;
    Ok((format!("{:x}", hasher.finalize()), bytes))
}

/// Writes the workspace database into a zip bundle with a checksummed manifest.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let (db_sha256, db_bytes) = sha256_file(&db_path)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "db": {
            "entry": DB_ENTRY,
            "sha256": db_sha256,
            "bytes": db_bytes,
        },
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        db_bytes,
    })
}

/// Restores a bundle (or a bare sqlite file) into `workspace_path`.
///
/// The database is staged next to the live one and only swapped in once it
/// checks out: a bundle's checksum must match its manifest, and a bare file
/// must carry the sqlite header.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);

    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    if !is_zip_file(in_path)? {
        if !is_sqlite_file(in_path)? {
            return Err(anyhow!(
                "{} is neither a workspace bundle nor a sqlite database",
                in_path.to_string_lossy()
            ));
        }
        std::fs::copy(in_path, &tmp_dst).with_context(|| {
            format!(
                "failed to copy sqlite file from {} to {}",
                in_path.to_string_lossy(),
                tmp_dst.to_string_lossy()
            )
        })?;
        let (db_sha256, _) = sha256_file(&tmp_dst)?;
        replace_database(&tmp_dst, &dst)?;
        return Ok(ImportSummary {
            bundle_format_detected: RAW_SQLITE_FORMAT.to_string(),
            db_sha256,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("db")
        .and_then(|d| d.get("sha256"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing db.sha256"))?
        .to_ascii_lowercase();

    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    let (actual_sha, _) = sha256_file(&tmp_dst)?;
    if actual_sha != expected_sha {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(anyhow!(
            "database checksum mismatch: manifest {} but bundle holds {}",
            expected_sha,
            actual_sha
        ));
    }

    replace_database(&tmp_dst, &dst)?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        db_sha256: actual_sha,
    })
}

fn replace_database(staged: &Path, dst: &Path) -> anyhow::Result<()> {
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(staged, dst).with_context(|| {
        format!(
            "failed to move imported database to {}",
            dst.to_string_lossy()
        )
    })
}

fn read_signature<const N: usize>(path: &Path) -> anyhow::Result<Option<[u8; N]>> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; N];
    match f.read_exact(&mut sig) {
        Ok(()) => Ok(Some(sig)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e).context("failed to read file signature"),
    }
}

fn is_sqlite_file(path: &Path) -> anyhow::Result<bool> {
    Ok(read_signature::<16>(path)?.is_some_and(|sig| &sig == SQLITE_HEADER))
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    Ok(read_signature::<4>(path)?.is_some_and(|sig| sig == [0x50, 0x4B, 0x03, 0x04]))
}
