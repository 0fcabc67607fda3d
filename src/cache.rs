//! Content-addressed disk cache for transformed images.
//!
//! Transforms are deterministic in their canonical URL, so the output of a
//! transform can be stored under a hash of that URL and served again without
//! refetching or re-encoding the source.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The key is the SHA-256 of the canonical URL's UTF-8 bytes, as 64 lowercase
//! hex characters ([`derive_key`]). Two request URLs that decode to the same
//! descriptor re-encode to the same canonical URL and therefore share a key.
//! There is no salting and no manifest: the key *is* the location.
//!
//! ## Storage
//!
//! Each entry is a pair of files in a two-character shard directory:
//!
//! ```text
//! <root>/<key[0..2]>/<key[2..]>.bin    transformed body
//! <root>/<key[0..2]>/<key[2..]>.json   {"contentType": "...", "contentLength": N}
//! ```
//!
//! Both files are written to uniquely named temp files first and renamed into
//! place, so a reader never observes a half-written file. Atomicity is per
//! file: a racing writer may rename its body between another writer's body and
//! metadata. `contentLength` lets [`FileCache::read`] detect that torn pair and
//! report a miss instead of serving a body under the wrong content type.
//!
//! ## Missing and corrupt entries
//!
//! A missing body or metadata file is a miss, not an error. Metadata that does
//! not parse, or parses without a `contentType`, is also a miss. Any other I/O
//! failure propagates.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

/// Default cache root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".transform-cache";

const BODY_EXTENSION: &str = "bin";
const META_EXTENSION: &str = "json";

/// SHA-256 of the canonical URL, lowercase hex.
pub fn derive_key(canonical_url: &str) -> String {
    format!("{:x}", Sha256::digest(canonical_url.as_bytes()))
}

/// Metadata stored next to a cached body.
///
/// Unknown fields are carried through untouched so older and newer writers
/// can share a cache directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CacheMetadata {
    /// Metadata describing `body` served as `content_type`.
    pub fn for_body(content_type: impl Into<String>, body: &[u8]) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: Some(body.len() as u64),
            extra: serde_json::Map::new(),
        }
    }
}

/// A cached transform result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub body: Bytes,
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    pub fn content_type(&self) -> &str {
        &self.metadata.content_type
    }
}

/// Where the two artifacts of one key live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    pub dir: PathBuf,
    pub body: PathBuf,
    pub meta: PathBuf,
}

/// Whether a response came from the cache. Surfaced as `X-Transform-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-level sharded file cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact locations for `key`. Rejects anything that is not a derived key.
    pub fn paths(&self, key: &str) -> io::Result<CachePaths> {
        check_key(key)?;
        let (shard, rest) = key.split_at(2);
        let dir = self.root.join(shard);
        Ok(CachePaths {
            body: dir.join(format!("{rest}.{BODY_EXTENSION}")),
            meta: dir.join(format!("{rest}.{META_EXTENSION}")),
            dir,
        })
    }

    /// Look up an entry. `Ok(None)` when absent, corrupt, or torn.
    pub async fn read(&self, key: &str) -> io::Result<Option<CacheEntry>> {
        let paths = self.paths(key)?;
        let (body, meta) = match tokio::try_join!(fs::read(&paths.body), fs::read(&paths.meta)) {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&meta) {
            Ok(m) => m,
            Err(e) => {
                debug!("Ignoring unreadable cache metadata {}: {}", paths.meta.display(), e);
                return Ok(None);
            }
        };
        if let Some(expected) = metadata.content_length
            && expected != body.len() as u64
        {
            debug!(
                "Cache entry {} is torn ({} bytes, metadata says {})",
                key,
                body.len(),
                expected
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            body: Bytes::from(body),
            metadata,
        }))
    }

    /// Publish an entry: temp files first, then rename each into place.
    pub async fn write(&self, key: &str, body: &[u8], metadata: &CacheMetadata) -> io::Result<()> {
        let paths = self.paths(key)?;
        fs::create_dir_all(&paths.dir).await?;
        let meta_json = serde_json::to_vec(metadata)?;

        let body_tmp = temp_path(&paths.body);
        let meta_tmp = temp_path(&paths.meta);
        let result = async {
            tokio::try_join!(fs::write(&body_tmp, body), fs::write(&meta_tmp, &meta_json))?;
            fs::rename(&body_tmp, &paths.body).await?;
            fs::rename(&meta_tmp, &paths.meta).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&body_tmp).await;
            let _ = fs::remove_file(&meta_tmp).await;
        }
        result
    }
}

fn check_key(key: &str) -> io::Result<()> {
    let valid = key.len() == 64
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a cache key: {key:?}"),
        ))
    }
}

/// `<final>.<pid>-<nanos>-<random hex>.tmp`, unique per writer.
fn temp_path(final_path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name = final_path.as_os_str().to_owned();
    name.push(format!(
        ".{}-{}-{:08x}.tmp",
        std::process::id(),
        nanos,
        rand::random::<u32>()
    ));
    PathBuf::from(name)
}
