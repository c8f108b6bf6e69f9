//! Deterministic build-context archives
//!
//! The context tree is walked in lexical order and written as a gzip-compressed
//! tar with pinned mtimes and zeroed ownership, so identical trees always
//! produce identical bytes.

use super::ignore::{clean_slash_path, IgnoreMatcher, IgnoreSource};
use crate::warnings::Warnings;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use walkdir::{DirEntry, WalkDir};

/// Modification time written for every entry (1980-01-01T00:00:00Z)
pub const SOURCE_DATE_EPOCH: u64 = 315_532_800;

pub const MIB: u64 = 1024 * 1024;
pub const DEFAULT_FILE_LIMIT: usize = 100;
pub const DEFAULT_SOFT_SIZE_LIMIT: u64 = 10 * MIB;
pub const DEFAULT_HARD_SIZE_LIMIT: u64 = 100 * MIB;

pub const CONTENT_TYPE: &str = "application/gzip";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("build context {path} is not a directory")]
    InvalidContext { path: PathBuf },

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("build context is too large; compressed size exceeds {limit} bytes (use a .dockerignore file)")]
    SizeLimit { limit: u64 },

    #[error("the dockerfile {dockerfile:?} was not found in the build context {}", root.display())]
    DockerfileNotFound { dockerfile: String, root: PathBuf },

    #[error("build context packaging cancelled")]
    Cancelled,
}

/// Thresholds applied while writing an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Regular-file count above which a single advisory is emitted
    pub max_files: usize,
    /// Compressed size above which a single advisory is emitted
    pub soft_size: u64,
    /// Compressed size above which packaging fails
    pub hard_size: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_FILE_LIMIT,
            soft_size: DEFAULT_SOFT_SIZE_LIMIT,
            hard_size: DEFAULT_HARD_SIZE_LIMIT,
        }
    }
}

/// A finished archive and what went into it
#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Bytes,
    pub file_count: usize,
    pub dockerfile: String,
    pub ignore_source: IgnoreSource,
}

pub struct ArchiveBuilder {
    root: PathBuf,
    dockerfile: String,
    limits: ArchiveLimits,
    cancel: CancellationToken,
    service: Option<String>,
}

impl ArchiveBuilder {
    pub fn new(root: impl Into<PathBuf>, dockerfile: &str) -> Self {
        Self {
            root: root.into(),
            dockerfile: clean_slash_path(dockerfile),
            limits: ArchiveLimits::default(),
            cancel: CancellationToken::new(),
            service: None,
        }
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attributes advisories to `service` instead of reporting them globally
    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn build(&self, warnings: &mut Warnings) -> Result<Archive, ArchiveError> {
        if !self.root.is_dir() {
            return Err(ArchiveError::InvalidContext {
                path: self.root.clone(),
            });
        }
        let matcher = IgnoreMatcher::resolve(&self.root, &self.dockerfile)?;
        if matcher.source() == &IgnoreSource::BuiltIn {
            debug!(root = %self.root.display(), "Using built-in ignore patterns");
        }

        let encoder = GzEncoder::new(LimitedWriter::new(self.limits.hard_size), Compression::default());
        let mut tar = tar::Builder::new(encoder);

        let mut file_count = 0usize;
        let mut soft_warned = false;
        let mut saw_dockerfile = false;

        let mut walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            if self.cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                ArchiveError::Io { path, source }
            })?;
            if entry.depth() == 0 {
                continue;
            }

            let rel = relative_slash_path(&self.root, entry.path());
            let file_type = entry.file_type();

            if matcher.matches(&rel) {
                if file_type.is_dir() {
                    if matcher.contains_exempt(&rel) {
                        trace!(path = %rel, "Descending into ignored directory");
                        continue;
                    }
                    debug!(path = %rel, "Ignoring directory");
                    walker.skip_current_dir();
                } else {
                    debug!(path = %rel, "Ignoring file");
                }
                continue;
            }

            if rel == matcher.dockerfile() && !file_type.is_dir() {
                saw_dockerfile = true;
            }

            if file_type.is_file() {
                file_count += 1;
                if file_count == self.limits.max_files + 1 {
                    self.warn(
                        warnings,
                        format!(
                            "the build context contains more than {} files; use a .dockerignore file to exclude unneeded files",
                            self.limits.max_files
                        ),
                    );
                }
            }

            self.append(&mut tar, &entry, &rel)?;

            let written = tar.get_ref().get_ref().len() as u64;
            if !soft_warned && written > self.limits.soft_size {
                soft_warned = true;
                self.warn(
                    warnings,
                    format!(
                        "the build context is more than {} MiB; use a .dockerignore file to exclude unneeded files",
                        self.limits.soft_size / MIB
                    ),
                );
            }
        }

        if !saw_dockerfile {
            return Err(ArchiveError::DockerfileNotFound {
                dockerfile: matcher.dockerfile().to_string(),
                root: self.root.clone(),
            });
        }

        // Finish in place so the sink is still reachable if the trailer overflows it
        if let Err(e) = tar.finish() {
            let exceeded = tar.get_ref().get_ref().exceeded;
            return Err(self.classify(e, exceeded, None));
        }
        let mut encoder = tar.into_inner().map_err(|e| self.classify(e, false, None))?;
        if let Err(e) = encoder.try_finish() {
            let exceeded = encoder.get_ref().exceeded;
            return Err(self.classify(e, exceeded, None));
        }
        let writer = encoder.finish().map_err(|e| self.classify(e, false, None))?;

        info!(
            root = %self.root.display(),
            files = file_count,
            bytes = writer.len(),
            "Build context archived"
        );

        Ok(Archive {
            bytes: Bytes::from(writer.into_inner()),
            file_count,
            dockerfile: matcher.dockerfile().to_string(),
            ignore_source: matcher.source().clone(),
        })
    }

    fn append(
        &self,
        tar: &mut tar::Builder<GzEncoder<LimitedWriter>>,
        entry: &DirEntry,
        rel: &str,
    ) -> Result<(), ArchiveError> {
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| ArchiveError::Io {
            path: path.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("failed to read metadata")),
        })?;
        let file_type = entry.file_type();

        let mut header = tar::Header::new_ustar();
        header.set_mtime(SOURCE_DATE_EPOCH);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(permission_bits(&metadata));

        let result = if file_type.is_dir() {
            trace!(path = %rel, "Adding directory");
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            tar.append_data(&mut header, format!("{}/", rel), io::empty())
        } else if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|source| ArchiveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            trace!(path = %rel, target = %target.display(), "Adding symlink");
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            tar.append_link(&mut header, rel, &target)
        } else if file_type.is_file() {
            trace!(path = %rel, size = metadata.len(), "Adding file");
            let file = File::open(path).map_err(|source| ArchiveError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(metadata.len());
            let reader = CancelAwareReader {
                inner: file,
                cancel: self.cancel.clone(),
            };
            tar.append_data(&mut header, rel, reader)
        } else {
            debug!(path = %rel, "Skipping special file");
            return Ok(());
        };

        result.map_err(|e| {
            let exceeded = tar.get_ref().get_ref().exceeded;
            self.classify(e, exceeded, Some(path))
        })
    }

    /// Maps a write failure onto the archive error it stands for. `exceeded` is the
    /// sink's own record of hitting the hard limit, whatever the error says.
    fn classify(&self, error: io::Error, exceeded: bool, path: Option<&Path>) -> ArchiveError {
        if exceeded {
            ArchiveError::SizeLimit {
                limit: self.limits.hard_size,
            }
        } else if self.cancel.is_cancelled() {
            ArchiveError::Cancelled
        } else {
            ArchiveError::Io {
                path: path.unwrap_or(&self.root).to_path_buf(),
                source: error,
            }
        }
    }

    fn warn(&self, warnings: &mut Warnings, message: String) {
        match &self.service {
            Some(service) => warnings.service(service, message),
            None => warnings.global(message),
        }
    }
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// In-memory sink that refuses to grow past `limit` bytes
struct LimitedWriter {
    buf: Vec<u8>,
    limit: u64,
    exceeded: bool,
}

impl LimitedWriter {
    fn new(limit: u64) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            exceeded: false,
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for LimitedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() as u64 + data.len() as u64 > self.limit {
            self.exceeded = true;
            return Err(io::Error::other("build context size limit exceeded"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fails the next read once the token is cancelled
struct CancelAwareReader<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R: Read> Read for CancelAwareReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("build context packaging cancelled"));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    fn context(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = temp_dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_entries_are_sorted_and_pinned() {
        let dir = context(&[("Dockerfile", "FROM scratch"), ("b.txt", "b"), ("a/z.txt", "z")]);
        let mut warnings = Warnings::new();
        let archive = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .build(&mut warnings)
            .unwrap();

        assert_eq!(entry_names(&archive.bytes), vec!["Dockerfile", "a/", "a/z.txt", "b.txt"]);
        assert_eq!(archive.file_count, 3);
        assert!(warnings.is_empty());

        let mut tar = tar::Archive::new(GzDecoder::new(&archive.bytes[..]));
        for entry in tar.entries().unwrap() {
            let header = entry.unwrap().header().clone();
            assert_eq!(header.mtime().unwrap(), SOURCE_DATE_EPOCH);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
        }
    }

    #[test]
    fn test_missing_dockerfile() {
        let dir = context(&[("app.py", "print()")]);
        let result = ArchiveBuilder::new(dir.path(), "Dockerfile").build(&mut Warnings::new());
        match result.unwrap_err() {
            ArchiveError::DockerfileNotFound { dockerfile, .. } => assert_eq!(dockerfile, "Dockerfile"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ignored_directory_is_pruned() {
        let dir = context(&[
            ("Dockerfile", "FROM scratch"),
            (".dockerignore", "build\n"),
            ("build/out.bin", "x"),
            ("src/main.rs", "fn main() {}"),
        ]);
        let archive = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .build(&mut Warnings::new())
            .unwrap();
        let names = entry_names(&archive.bytes);
        assert!(names.iter().all(|n| !n.starts_with("build")));
        assert!(names.contains(&"src/main.rs".to_string()));
        assert!(names.contains(&".dockerignore".to_string()));
    }

    #[test]
    fn test_nested_dockerfile_survives_wildcard() {
        let dir = context(&[
            (".dockerignore", "**\n"),
            ("docker/Dockerfile", "FROM scratch"),
            ("docker/other", "x"),
        ]);
        let archive = ArchiveBuilder::new(dir.path(), "docker/Dockerfile")
            .build(&mut Warnings::new())
            .unwrap();
        assert_eq!(
            entry_names(&archive.bytes),
            vec![".dockerignore", "docker/Dockerfile"]
        );
    }

    #[test]
    fn test_file_count_warns_once() {
        let dir = context(&[("Dockerfile", "FROM scratch"), ("a", "1"), ("b", "2"), ("c", "3")]);
        let limits = ArchiveLimits {
            max_files: 2,
            ..ArchiveLimits::default()
        };
        let mut warnings = Warnings::new();
        ArchiveBuilder::new(dir.path(), "Dockerfile")
            .with_limits(limits)
            .for_service("web")
            .build(&mut warnings)
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings.count_containing(".dockerignore"), 1);
        assert_eq!(warnings.iter().next().unwrap().service.as_deref(), Some("web"));
    }

    #[test]
    fn test_hard_limit_is_fatal() {
        let mut seed = 0x2545_f491_4f6c_dd1du64;
        let noise: String = (0..200_000)
            .map(|_| {
                seed = seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                char::from(b'a' + ((seed >> 33) % 26) as u8)
            })
            .collect();
        let dir = context(&[("Dockerfile", "FROM scratch"), ("big.txt", &noise)]);
        let limits = ArchiveLimits {
            max_files: 100,
            soft_size: 512,
            hard_size: 1024,
        };
        let result = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .with_limits(limits)
            .build(&mut Warnings::new());
        assert!(matches!(result, Err(ArchiveError::SizeLimit { limit: 1024 })));
    }

    #[test]
    fn test_limit_hit_while_finishing() {
        let dir = context(&[("Dockerfile", "FROM scratch")]);
        let limits = ArchiveLimits {
            max_files: 100,
            soft_size: 8,
            hard_size: 16,
        };
        let result = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .with_limits(limits)
            .build(&mut Warnings::new());
        assert!(matches!(result, Err(ArchiveError::SizeLimit { limit: 16 })));
    }

    #[test]
    fn test_limit_classified_by_sink_state() {
        let builder = ArchiveBuilder::new("/ctx", "Dockerfile");
        let reworded = io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer");
        assert!(matches!(
            builder.classify(reworded, true, None),
            ArchiveError::SizeLimit { .. }
        ));

        // Same text as the sink's own error, but the sink never overflowed
        let lookalike = io::Error::other("build context size limit exceeded");
        assert!(matches!(
            builder.classify(lookalike, false, None),
            ArchiveError::Io { .. }
        ));
    }

    #[test]
    fn test_cancelled_before_walk() {
        let dir = context(&[("Dockerfile", "FROM scratch")]);
        let token = CancellationToken::new();
        token.cancel();
        let result = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .with_cancellation(token)
            .build(&mut Warnings::new());
        assert!(matches!(result, Err(ArchiveError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = context(&[("Dockerfile", "FROM scratch"), ("target.txt", "data")]);
        std::os::unix::fs::symlink("target.txt", dir.path().join("link")).unwrap();
        let archive = ArchiveBuilder::new(dir.path(), "Dockerfile")
            .build(&mut Warnings::new())
            .unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(&archive.bytes[..]));
        let link = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| e.path().unwrap().to_string_lossy() == "link")
            .unwrap();
        assert_eq!(link.header().entry_type(), tar::EntryType::Symlink);
        assert_eq!(
            link.link_name().unwrap().unwrap().to_string_lossy(),
            "target.txt"
        );
        assert_eq!(archive.file_count, 2);
    }
}
