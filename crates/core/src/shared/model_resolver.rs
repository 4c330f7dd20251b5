use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("model {0} is not cached and has no download source")]
    NotAvailable(String),
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where a model file can come from.
#[derive(Clone, Copy, Debug)]
pub struct ModelSource<'a> {
    pub name: &'a str,
    pub url: Option<&'a str>,
}

/// Resolve a model file, checking local locations before downloading.
///
/// Resolution order:
/// 1. Explicit path (must exist; never falls through)
/// 2. `search_dir/<name>`
/// 3. User cache directory
/// 4. Download from `source.url` into the cache
pub fn resolve(
    source: ModelSource<'_>,
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::Missing(path.to_path_buf()))
        };
    }

    if let Some(dir) = search_dir {
        let local = dir.join(source.name);
        if local.exists() {
            return Ok(local);
        }
    }

    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(source.name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    let url = source
        .url
        .ok_or_else(|| ModelResolveError::NotAvailable(source.name.to_string()))?;
    fs::create_dir_all(&cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {} from {url}", source.name);
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Like [`resolve`] but yields `None` for a model that is neither on disk nor
/// downloadable, so optional models can be skipped.
pub fn resolve_optional(
    source: ModelSource<'_>,
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ModelResolveError> {
    match resolve(source, explicit, search_dir, None) {
        Ok(path) => Ok(Some(path)),
        Err(ModelResolveError::NotAvailable(name)) => {
            log::info!("Optional model {name} not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceTrack/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceTrack/models/` or `~/.cache/FaceTrack/models/`
/// - Windows: `%LOCALAPPDATA%/FaceTrack/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceTrack").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceTrack").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = stream_to(url, &temp_path, progress).and_then(|()| {
        fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
            path: dest.to_path_buf(),
            source: e,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn stream_to(
    url: &str,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |source: std::io::Error| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NO_URL: ModelSource<'static> = ModelSource {
        name: "facetrack_test_model_that_does_not_exist.onnx",
        url: None,
    };

    #[test]
    fn test_explicit_path_is_returned() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.onnx");
        fs::write(&path, b"model").unwrap();

        let resolved = resolve(NO_URL, Some(&path), None, None).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.onnx");

        let err = resolve(NO_URL, Some(&path), None, None).unwrap_err();
        assert!(matches!(err, ModelResolveError::Missing(p) if p == path));
    }

    #[test]
    fn test_search_dir_is_checked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(NO_URL.name);
        fs::write(&path, b"model").unwrap();

        let resolved = resolve(NO_URL, None, Some(tmp.path()), None).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_unavailable_without_url() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(NO_URL, None, Some(tmp.path()), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::NotAvailable(_)));
    }

    #[test]
    fn test_optional_unavailable_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(resolve_optional(NO_URL, None, Some(tmp.path()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("FaceTrack"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
