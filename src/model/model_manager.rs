use crate::{
    error::{Result, StemError},
    io::{
        crypto::{digest_matches, verify_sha256},
        net::{download_with_progress, http_client},
        paths::models_cache_dir,
    },
    model::registry::resolve_manifest_url,
    types::ModelManifest,
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ModelHandle {
    pub manifest: ModelManifest,
    pub local_path: PathBuf,
}

/// Fetches the manifest for `model_name` and makes sure a checksum-verified
/// copy of its artifact sits in the model cache.
pub fn ensure_model(model_name: &str, manifest_url_override: Option<&str>) -> Result<ModelHandle> {
    let cache_dir = models_cache_dir()?;
    ensure_model_in(&cache_dir, model_name, manifest_url_override)
}

pub fn ensure_model_in(
    cache_dir: &Path,
    model_name: &str,
    manifest_url_override: Option<&str>,
) -> Result<ModelHandle> {
    let manifest_url = match manifest_url_override {
        Some(url) => url.to_string(),
        None => resolve_manifest_url(model_name)?,
    };

    let client = http_client()?;
    debug!(%manifest_url, "fetching model manifest");
    let manifest: ModelManifest = client
        .get(&manifest_url)
        .send()
        .and_then(|res| res.error_for_status())
        .and_then(|res| res.json())
        .map_err(|e| StemError::Manifest(format!("fetching {manifest_url}: {e}")))?;

    let a = manifest
        .resolve_primary_artifact()
        .map_err(StemError::Manifest)?;

    fs::create_dir_all(cache_dir)?;
    let ext = a
        .file
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_default();
    let short = a.sha256.get(..8).unwrap_or(&a.sha256);
    let file_name = format!("{}-{short}{ext}", manifest.name);
    let local_path = cache_dir.join(file_name);

    if matches!(verify_sha256(&local_path, &a.sha256), Ok(true)) {
        debug!(path = %local_path.display(), "model cache hit");
    } else {
        info!(model = %manifest.name, url = %a.url, "downloading model");
        let part = download_with_progress(&client, &a.url, &local_path)?;
        if !digest_matches(&part.sha256, &a.sha256) {
            warn!(expected = %a.sha256, got = %part.sha256, "model checksum mismatch");
            part.discard();
            return Err(StemError::Checksum {
                path: local_path.display().to_string(),
            });
        }
        if a.size_bytes > 0 && part.size != a.size_bytes {
            warn!(
                path = %local_path.display(),
                expected = a.size_bytes,
                got = part.size,
                "model size differs from manifest"
            );
        }
        part.persist(&local_path)?;
    }

    Ok(ModelHandle {
        manifest,
        local_path,
    })
}
