use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DOCUMENTS_PREFIX: &str = "documents/";
pub const BUNDLE_FORMAT: &str = "facultyd-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored: Vec<String>,
    pub removed: Vec<String>,
}

/// Path of `doc` inside the workspace, with forward slashes.
fn relative_name(workspace_path: &Path, doc: &Path) -> anyhow::Result<String> {
    let rel = doc.strip_prefix(workspace_path).map_err(|_| {
        anyhow!(
            "document {} is outside the workspace",
            doc.to_string_lossy()
        )
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}

/// Only plain relative names may be restored; anything that could climb out
/// of the workspace is refused.
fn safe_relative(name: &str) -> anyhow::Result<PathBuf> {
    let p = PathBuf::from(name);
    if name.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(anyhow!("unsafe document name in bundle: {}", name));
    }
    Ok(p)
}

/// Zips the listed workspace documents. Documents that were never written
/// (an untouched counters file, say) are left out.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    documents: &[PathBuf],
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let present: Vec<&PathBuf> = documents.iter().filter(|p| p.is_file()).collect();
    if present.is_empty() {
        return Err(anyhow!(
            "workspace has no documents to back up: {}",
            workspace_path.to_string_lossy()
        ));
    }
    let mut names = Vec::with_capacity(present.len());
    for doc in &present {
        names.push(relative_name(workspace_path, doc)?);
    }

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
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "documents": names,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (doc, name) in present.iter().zip(&names) {
        zip.start_file(format!("{DOCUMENTS_PREFIX}{name}"), opts)
            .with_context(|| format!("failed to start entry for {}", name))?;
        let mut f = File::open(doc)
            .with_context(|| format!("failed to open document {}", doc.to_string_lossy()))?;
        std::io::copy(&mut f, &mut zip)
            .with_context(|| format!("failed to write entry for {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: names.len() + 1,
        documents: names,
    })
}

/// Restores every document named in the manifest. Each one is extracted to
/// a sibling temp file first and then renamed over the live copy. Any file in
/// `owned` that the bundle does not carry is deleted afterwards, so the
/// workspace ends up holding exactly the backed-up state.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
    owned: &[PathBuf],
) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a workspace bundle: {}",
            in_path.to_string_lossy()
        ));
    }
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

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
    let names: Vec<String> = manifest
        .get("documents")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    // Validate everything before touching the workspace.
    let mut targets = Vec::with_capacity(names.len());
    for name in &names {
        let rel = safe_relative(name)?;
        archive
            .by_name(&format!("{DOCUMENTS_PREFIX}{name}"))
            .with_context(|| format!("bundle missing document {}", name))?;
        targets.push(workspace_path.join(rel));
    }

    for (name, dst) in names.iter().zip(&targets) {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        let mut tmp_name = dst.as_os_str().to_owned();
        tmp_name.push(".importing");
        let tmp_dst = PathBuf::from(tmp_name);
        if tmp_dst.exists() {
            let _ = std::fs::remove_file(&tmp_dst);
        }

        let mut out = File::create(&tmp_dst).with_context(|| {
            format!("failed to create temp file {}", tmp_dst.to_string_lossy())
        })?;
        {
            let mut entry = archive
                .by_name(&format!("{DOCUMENTS_PREFIX}{name}"))
                .with_context(|| format!("bundle missing document {}", name))?;
            std::io::copy(&mut entry, &mut out)
                .with_context(|| format!("failed to extract {}", name))?;
        }
        out.flush()
            .with_context(|| format!("failed to flush {}", tmp_dst.to_string_lossy()))?;
        drop(out);

        std::fs::rename(&tmp_dst, dst).with_context(|| {
            format!("failed to move extracted document to {}", dst.to_string_lossy())
        })?;
    }

    let mut removed = Vec::new();
    for stale in owned.iter().filter(|p| !targets.contains(p)) {
        if !stale.is_file() {
            continue;
        }
        std::fs::remove_file(stale).with_context(|| {
            format!("failed to remove stale document {}", stale.to_string_lossy())
        })?;
        removed.push(relative_name(workspace_path, stale)?);
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        restored: names,
        removed,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
