//! Retrieval of pretrained components.
//!
//! An extractor source is either a URL or a local path. URLs are downloaded
//! once into the cache directory and reused afterwards; local paths are used
//! in place.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use grain_core::{Error, Result};
use tracing::{debug, info};

/// Where a pretrained component comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorReference {
    Url(String),
    Local(PathBuf),
}

impl ExtractorReference {
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ExtractorReference::Url(trimmed.to_string())
        } else {
            ExtractorReference::Local(PathBuf::from(trimmed))
        }
    }
}

impl std::fmt::Display for ExtractorReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractorReference::Url(url) => f.write_str(url),
            ExtractorReference::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Download cache for pretrained records
#[derive(Debug, Clone)]
pub struct PretrainedHub {
    cache_dir: PathBuf,
}

impl PretrainedHub {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location used for a URL
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let stem = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
            .map(|name| name.split('.').next().unwrap_or(name))
            .filter(|name| !name.is_empty())
            .unwrap_or("extractor");
        let stem: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        self.cache_dir.join(format!("{:016x}-{stem}.mpk", fnv1a(url.as_bytes())))
    }

    /// Resolves a reference to a local file, downloading it if needed
    pub fn fetch(&self, reference: &ExtractorReference) -> Result<PathBuf> {
        match reference {
            ExtractorReference::Local(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(Error::Retrieval(format!(
                        "Pretrained extractor not found at {}",
                        path.display()
                    )))
                }
            }
            ExtractorReference::Url(url) => {
                let target = self.cache_path(url);
                if target.is_file() {
                    debug!("Using cached extractor {}", target.display());
                    return Ok(target);
                }
                self.download(url, &target)?;
                Ok(target)
            }
        }
    }

    fn download(&self, url: &str, target: &Path) -> Result<()> {
        info!("Downloading pretrained extractor from {}", url);
        fs::create_dir_all(&self.cache_dir)?;

        let response = reqwest::blocking::get(url)
            .map_err(|e| Error::Retrieval(format!("Failed to download {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Retrieval(format!("Failed to download {url}: {e}")))?;

        let bytes = response
            .bytes()
            .map_err(|e| Error::Retrieval(format!("Failed to read response from {url}: {e}")))?;

        // Written under a temporary name so an interrupted download is never picked up
        let partial = target.with_extension("part");
        let mut file = File::create(&partial)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&partial, target)?;

        info!("Cached {} bytes at {}", bytes.len(), target.display());
        Ok(())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            ExtractorReference::parse("https://host/models/mobilenet.mpk"),
            ExtractorReference::Url("https://host/models/mobilenet.mpk".to_string())
        );
        assert_eq!(
            ExtractorReference::parse("models/mobilenet.mpk"),
            ExtractorReference::Local(PathBuf::from("models/mobilenet.mpk"))
        );
    }

    #[test]
    fn test_cache_path_is_stable() {
        let hub = PretrainedHub::new("/cache");
        let a = hub.cache_path("https://host/feature_vector/4.mpk?x=1");
        let b = hub.cache_path("https://host/feature_vector/4.mpk?x=1");
        let c = hub.cache_path("https://host/feature_vector/5.mpk");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().unwrap(), "mpk");
        assert!(a.starts_with("/cache"));
    }

    #[test]
    fn test_fetch_local() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("extractor.mpk");
        fs::write(&path, b"weights").unwrap();

        let hub = PretrainedHub::new(temp_dir.path().join("cache"));
        assert_eq!(hub.fetch(&ExtractorReference::Local(path.clone())).unwrap(), path);
    }

    #[test]
    fn test_fetch_missing_local() {
        let hub = PretrainedHub::new("/tmp");
        let result = hub.fetch(&ExtractorReference::parse("/nonexistent/extractor.mpk"));
        assert!(matches!(result, Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_fetch_uses_cache() {
        let temp_dir = TempDir::new().unwrap();
        let hub = PretrainedHub::new(temp_dir.path());
        let url = "http://127.0.0.1:9/mobilenet.mpk";
        let cached = hub.cache_path(url);
        fs::write(&cached, b"weights").unwrap();

        assert_eq!(hub.fetch(&ExtractorReference::parse(url)).unwrap(), cached);
    }

    #[test]
    fn test_fetch_unreachable_url() {
        let temp_dir = TempDir::new().unwrap();
        let hub = PretrainedHub::new(temp_dir.path());
        let result = hub.fetch(&ExtractorReference::parse("http://127.0.0.1:9/mobilenet.mpk"));

        assert!(matches!(result, Err(Error::Retrieval(_))));
        assert!(fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
