//! `.dockerignore` resolution and matching
//!
//! Patterns follow Docker's semantics: they are anchored at the context root,
//! `*` and `?` never cross a `/`, `**` spans any number of directories, a
//! leading `!` re-includes, and the last matching pattern wins. A path is
//! excluded when it or any of its parent directories is excluded.

use super::archive::ArchiveError;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const DOCKERIGNORE: &str = ".dockerignore";

/// Patterns used when the context has no ignore file of its own.
///
/// Our own binary and state directory are only ignored at the root so that
/// subdirectories with the same name are still shipped.
pub const DEFAULT_DOCKERIGNORE: &str = "# Default .dockerignore file for shipbox
**/__pycache__
**/.direnv
**/.DS_Store
**/.envrc
**/.git
**/.github
**/.idea
**/.next
**/.vscode
**/.pytest_cache
**/.mypy_cache
**/compose.*.yaml
**/compose.*.yml
**/compose.yaml
**/compose.yml
**/docker-compose.*.yaml
**/docker-compose.*.yml
**/docker-compose.yaml
**/docker-compose.yml
**/node_modules
**/Thumbs.db
**/*.swp
**/package-lock.json
**/yarn.lock
**/pnpm-lock.yaml
Dockerfile
*.Dockerfile
shipbox
shipbox.exe
.shipbox";

/// Where the active ignore patterns came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreSource {
    /// `<dockerfile>.dockerignore`
    DockerfileSpecific(String),
    /// `.dockerignore` at the context root
    Root,
    /// [`DEFAULT_DOCKERIGNORE`]
    BuiltIn,
}

impl IgnoreSource {
    /// Slash path of the ignore file relative to the context root, if any
    pub fn file_name(&self) -> Option<&str> {
        match self {
            IgnoreSource::DockerfileSpecific(name) => Some(name),
            IgnoreSource::Root => Some(DOCKERIGNORE),
            IgnoreSource::BuiltIn => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Pattern {
    text: String,
    regex: Regex,
    exclusion: bool,
}

impl Pattern {
    fn new(line: &str) -> Result<Self, ArchiveError> {
        let (exclusion, text) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim().to_string()),
            None => (false, line.to_string()),
        };
        let regex = Regex::new(&pattern_to_regex(&text)).map_err(|source| {
            ArchiveError::InvalidPattern {
                pattern: line.to_string(),
                source,
            }
        })?;
        Ok(Self {
            text,
            regex,
            exclusion,
        })
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
    source: IgnoreSource,
    dockerfile: String,
}

impl IgnoreMatcher {
    /// Resolves the ignore file for `dockerfile` inside `root`.
    ///
    /// Precedence: `<dockerfile>.dockerignore`, then `.dockerignore`, then the
    /// built-in default list.
    pub fn resolve(root: &Path, dockerfile: &str) -> Result<Self, ArchiveError> {
        let dockerfile = clean_slash_path(dockerfile);
        let specific = format!("{}{}", dockerfile, DOCKERIGNORE);

        let candidates = [
            (IgnoreSource::DockerfileSpecific(specific.clone()), specific),
            (IgnoreSource::Root, DOCKERIGNORE.to_string()),
        ];
        for (source, name) in candidates {
            let path = root.join(&name);
            match fs::read_to_string(&path) {
                Ok(content) => {
                    debug!(file = %name, "Reading ignore patterns");
                    return Self::from_content(&content, &dockerfile, source);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(ArchiveError::Io { path, source }),
            }
        }

        debug!("No ignore file found; using built-in defaults");
        Self::from_content(DEFAULT_DOCKERIGNORE, &dockerfile, IgnoreSource::BuiltIn)
    }

    pub fn from_content(
        content: &str,
        dockerfile: &str,
        source: IgnoreSource,
    ) -> Result<Self, ArchiveError> {
        let patterns = parse_ignore_file(content)
            .iter()
            .map(|line| Pattern::new(line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            source,
            dockerfile: clean_slash_path(dockerfile),
        })
    }

    pub fn source(&self) -> &IgnoreSource {
        &self.source
    }

    /// Cleaned slash path of the dockerfile this matcher was resolved for
    pub fn dockerfile(&self) -> &str {
        &self.dockerfile
    }

    pub fn patterns(&self) -> impl Iterator<Item = String> + '_ {
        self.patterns.iter().map(|p| {
            if p.exclusion {
                format!("!{}", p.text)
            } else {
                p.text.clone()
            }
        })
    }

    /// True when `path` must always be archived, whatever the patterns say
    pub fn is_exempt(&self, path: &str) -> bool {
        path == self.dockerfile || self.source.file_name() == Some(path)
    }

    /// True when `dir` contains the dockerfile or the ignore file, so the walk
    /// has to descend into it even if it is excluded.
    pub fn contains_exempt(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        self.dockerfile.starts_with(&prefix)
            || self
                .source
                .file_name()
                .is_some_and(|name| name.starts_with(&prefix))
    }

    /// Whether `path` (relative, `/`-separated) is excluded from the archive
    pub fn matches(&self, path: &str) -> bool {
        !self.is_exempt(path) && self.pattern_matches(path)
    }

    /// Raw pattern evaluation: the path or one of its parents is excluded
    pub fn pattern_matches(&self, path: &str) -> bool {
        let parents: Vec<&str> = match path.rfind('/') {
            Some(i) => path[..i].split('/').collect(),
            None => Vec::new(),
        };

        let mut matched = false;
        for pattern in &self.patterns {
            // An inclusion cannot change an excluded path, nor an exclusion an included one
            if pattern.exclusion != matched {
                continue;
            }
            let mut hit = pattern.matches(path);
            if !hit {
                for i in 1..=parents.len() {
                    if pattern.matches(&parents[..i].join("/")) {
                        hit = true;
                        break;
                    }
                }
            }
            if hit {
                matched = !pattern.exclusion;
            }
        }
        matched
    }
}

/// Splits an ignore file into cleaned patterns, skipping comments and blank lines.
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut patterns = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (invert, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let mut cleaned = clean_slash_path(body);
        if cleaned.is_empty() {
            cleaned = ".".to_string();
        }
        if invert {
            patterns.push(format!("!{}", cleaned));
        } else {
            patterns.push(cleaned);
        }
    }
    patterns
}

/// Normalizes a path to forward slashes without `.`, empty or leading
/// separators, resolving `..` lexically.
pub fn clean_slash_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn pattern_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                    }
                    if chars.peek().is_none() {
                        re.push_str(".*");
                    } else {
                        re.push_str("(.*/)?");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            '\\' => match chars.next() {
                Some(next) => re.push_str(&regex::escape(&next.to_string())),
                None => re.push_str(r"\\"),
            },
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') || chars.peek() == Some(&'^') {
                    chars.next();
                    re.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' || c == '[' {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yare::parameterized;

    fn matcher(content: &str) -> IgnoreMatcher {
        IgnoreMatcher::from_content(content, "Dockerfile", IgnoreSource::Root).unwrap()
    }

    #[test]
    fn test_parse_ignore_file_skips_comments_and_blanks() {
        let patterns = parse_ignore_file("# comment\n\n  node_modules  \n!keep.txt\n/abs/path/\n./rel\n");
        assert_eq!(patterns, vec!["node_modules", "!keep.txt", "abs/path", "rel"]);
    }

    #[parameterized(
        root_file = { "*.log", "app.log", true },
        star_no_separator = { "*.log", "logs/app.log", false },
        parent_dir = { "build", "build/out/bin", true },
        anchored = { "shipbox", "tools/shipbox", false },
        double_star = { "**/node_modules", "a/b/node_modules/x.js", true },
        double_star_root = { "**/node_modules", "node_modules", true },
        trailing_double_star = { "docs/**", "docs/a/b.md", true },
        question = { "file?.txt", "file1.txt", true },
        class = { "file[0-9].txt", "filea.txt", false },
        negated_class = { "file[!0-9].txt", "filea.txt", true },
        dot_literal = { "a.b", "axb", false },
    )]
    fn test_pattern_matches(pattern: &str, path: &str, expected: bool) {
        assert_eq!(matcher(pattern).pattern_matches(path), expected);
    }

    #[test]
    fn test_exclusion_reincludes() {
        let m = matcher("*.md\n!README.md");
        assert!(m.matches("CHANGELOG.md"));
        assert!(!m.matches("README.md"));
    }

    #[test]
    fn test_last_pattern_wins() {
        let m = matcher("!README.md\n*.md");
        assert!(m.matches("README.md"));
    }

    #[test]
    fn test_dockerfile_and_ignore_file_are_exempt() {
        let m = matcher("**");
        assert!(!m.matches("Dockerfile"));
        assert!(!m.matches(".dockerignore"));
        assert!(m.matches("src/main.rs"));
        assert!(m.pattern_matches("Dockerfile"));
    }

    #[test]
    fn test_contains_exempt_for_nested_dockerfile() {
        let m = IgnoreMatcher::from_content("**", "./docker/app/Dockerfile", IgnoreSource::BuiltIn)
            .unwrap();
        assert_eq!(m.dockerfile(), "docker/app/Dockerfile");
        assert!(m.contains_exempt("docker"));
        assert!(m.contains_exempt("docker/app"));
        assert!(!m.contains_exempt("doc"));
    }

    #[test]
    fn test_builtin_defaults() {
        let m = IgnoreMatcher::from_content(DEFAULT_DOCKERIGNORE, "Dockerfile", IgnoreSource::BuiltIn)
            .unwrap();
        assert!(m.matches("node_modules/app.js"));
        assert!(m.matches("web/node_modules/lib/index.js"));
        assert!(m.matches(".git/HEAD"));
        assert!(m.matches("shipbox"));
        assert!(!m.matches("cmd/shipbox/main.rs"));
        assert!(!m.matches("Dockerfile"));
        assert!(!m.matches("src/index.js"));
    }

    #[test]
    fn test_resolve_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let m = IgnoreMatcher::resolve(root, "Dockerfile").unwrap();
        assert_eq!(m.source(), &IgnoreSource::BuiltIn);

        fs::write(root.join(".dockerignore"), "*.tmp\n").unwrap();
        let m = IgnoreMatcher::resolve(root, "Dockerfile").unwrap();
        assert_eq!(m.source(), &IgnoreSource::Root);
        assert_eq!(m.patterns().collect::<Vec<_>>(), vec!["*.tmp"]);

        fs::write(root.join("Dockerfile.dockerignore"), "*.log\n").unwrap();
        let m = IgnoreMatcher::resolve(root, "Dockerfile").unwrap();
        assert_eq!(
            m.source(),
            &IgnoreSource::DockerfileSpecific("Dockerfile.dockerignore".to_string())
        );
        assert!(m.matches("x.log"));
        assert!(!m.matches("x.tmp"));
    }

    #[test]
    fn test_clean_slash_path() {
        assert_eq!(clean_slash_path("./a//b/"), "a/b");
        assert_eq!(clean_slash_path("a/../b"), "b");
        assert_eq!(clean_slash_path("/abs"), "abs");
        assert_eq!(clean_slash_path("../x"), "../x");
    }
}
