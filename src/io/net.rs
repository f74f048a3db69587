use crate::{
    error::Result,
    io::{crypto::HashingWriter, progress::emit_download_progress},
};
use reqwest::blocking::Client;
use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .build()?)
}

/// A finished download still sitting at its `.part` path.
#[derive(Debug)]
pub struct PartialFile {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

impl PartialFile {
    /// Moves the download into place, replacing whatever was at `dest`.
    pub fn persist(self, dest: &Path) -> Result<()> {
        if dest.exists() {
            fs::remove_file(dest).ok();
        }
        fs::rename(&self.path, dest)?;
        Ok(())
    }

    pub fn discard(self) {
        fs::remove_file(&self.path).ok();
    }
}

/// Streams `url` into `<dest>.part`, hashing on the way. The caller decides
/// whether to [`PartialFile::persist`] or [`PartialFile::discard`] it, so a
/// bad or interrupted download never shows up at `dest`.
pub fn download_with_progress(client: &Client, url: &str, dest: &Path) -> Result<PartialFile> {
    let part = dest.with_extension("part");

    let res = stream_to(client, url, &part);
    if res.is_err() {
        fs::remove_file(&part).ok();
    }
    let (size, sha256) = res?;
    debug!(url, size, path = %part.display(), "download complete");

    Ok(PartialFile {
        path: part,
        size,
        sha256,
    })
}

fn stream_to(client: &Client, url: &str, part: &Path) -> Result<(u64, String)> {
    let mut resp = client.get(url).send()?.error_for_status()?;
    let total = resp.content_length().unwrap_or(0);
    emit_download_progress(0, total);

    let mut out = HashingWriter::new(BufWriter::new(File::create(part)?));
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        emit_download_progress(out.written(), total);
    }

    let size = out.written();
    let (_, sha256) = out.finish()?;
    emit_download_progress(total.max(size), total.max(size));
    Ok((size, sha256))
}
