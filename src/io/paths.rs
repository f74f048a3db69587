use crate::error::{Result, StemError};
use directories::ProjectDirs;
use std::{env, path::PathBuf};

/// Where downloaded models live. `STEM_SPLITTER_CACHE_DIR` overrides the
/// platform cache directory.
pub fn models_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("STEM_SPLITTER_CACHE_DIR") {
        return Ok(PathBuf::from(dir).join("models"));
    }
    let proj = ProjectDirs::from("dev", "StemSplitter", "stem-splitter-web")
        .ok_or(StemError::CacheDirUnavailable)?;
    let mut p = PathBuf::from(proj.cache_dir());
    p.push("models");
    Ok(p)
}
