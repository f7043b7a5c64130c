//! Secret scanning for staged files.
//!
//! Used by the `git commit` command check: staged files are scanned for
//! credential-shaped strings before an agent is allowed to commit them.
//! False positives are silenced with path patterns in `.secretsignore`.

use crate::error::Result;
use crate::git::Git;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const SECRETS_IGNORE_FILE: &str = ".secretsignore";

/// Files larger than this are not scanned.
const MAX_SCAN_BYTES: u64 = 1024 * 1024;

const SKIPPED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "pdf", "zip", "gz", "tar", "woff", "woff2",
    "ttf", "lock",
];

const DEFAULT_IGNORES: &[&str] = &[".env.example", ".secretsignore", "package-lock.json"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMatch {
    pub file_path: String,
    pub line_number: usize,
    pub pattern_name: String,
    pub matched_text: String,
}

struct SecretPattern {
    name: &'static str,
    regex: Regex,
}

static SECRET_PATTERNS: OnceLock<Vec<SecretPattern>> = OnceLock::new();

fn secret_patterns() -> &'static [SecretPattern] {
    SECRET_PATTERNS.get_or_init(|| {
        [
            ("Anthropic API key", r"sk-ant-[a-zA-Z0-9\-_]{20,}"),
            ("OpenAI API key", r"sk-(?:proj-)?[a-zA-Z0-9]{20,}"),
            ("Google API key", r"AIza[a-zA-Z0-9\-_]{35}"),
            ("AWS access key", r"AKIA[A-Z0-9]{16}"),
            (
                "AWS secret key",
                r#"(?i)aws[_-]?secret[_-]?access[_-]?key['"]?\s*[:=]\s*['"]?[A-Za-z0-9/+=]{40}"#,
            ),
            (
                "Generic API key",
                r#"(?i)(?:api[_-]?key|apikey)['"]?\s*[:=]\s*['"][a-zA-Z0-9_\-]{20,}['"]"#,
            ),
            (
                "Generic token",
                r#"(?i)(?:access[_-]?token|auth[_-]?token)['"]?\s*[:=]\s*['"][a-zA-Z0-9_.=\-]{20,}['"]"#,
            ),
            (
                "Hardcoded password",
                r#"(?i)(?:password|passwd|secret)['"]?\s*[:=]\s*['"][^\s'"]{8,}['"]"#,
            ),
            ("Bearer token", r"(?i)bearer\s+[a-zA-Z0-9_.=\-]{20,}"),
            (
                "Private key",
                r"-----BEGIN\s+(?:RSA\s+|EC\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
            ),
            ("GitHub token", r"gh[pousr]_[A-Za-z0-9_]{36,}"),
            (
                "Slack token",
                r"xox[baprs]-[0-9]{10,}-[0-9]{10,}-[a-zA-Z0-9]{24,}",
            ),
            (
                "Database URL with credentials",
                r"(?i)(?:postgres|postgresql|mysql|mongodb(?:\+srv)?)://[^\s:@/]+:[^\s@/]+@",
            ),
        ]
        .into_iter()
        .map(|(name, pattern)| SecretPattern {
            name,
            regex: Regex::new(pattern).unwrap(),
        })
        .collect()
    })
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Scan one file's content line by line.
pub fn scan_content(file_path: &str, content: &str) -> Vec<SecretMatch> {
    let mut matches = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for pattern in secret_patterns() {
            if let Some(m) = pattern.regex.find(line) {
                matches.push(SecretMatch {
                    file_path: file_path.to_string(),
                    line_number: idx + 1,
                    pattern_name: pattern.name.to_string(),
                    matched_text: m.as_str().to_string(),
                });
            }
        }
    }
    matches
}

/// Scan the given project-relative paths under `root`.
///
/// Ignored, binary, oversized and unreadable files are skipped.
pub fn scan_files(files: &[String], root: &Path) -> Vec<SecretMatch> {
    let ignores = load_ignore_patterns(root);
    let mut matches = Vec::new();
    for file in files {
        if is_ignored(file, &ignores) || has_skipped_extension(file) {
            continue;
        }
        let path = root.join(file);
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() || meta.len() > MAX_SCAN_BYTES {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        matches.extend(scan_content(file, &content));
    }
    matches
}

/// Staged files of the repository at `root`.
pub fn get_staged_files(root: &Path) -> Result<Vec<String>> {
    Git::new(root).staged_files()
}

/// Keep the first `visible_chars` characters and mask the rest.
pub fn mask_secret(text: &str, visible_chars: usize) -> String {
    let count = text.chars().count();
    if count <= visible_chars {
        return text.to_string();
    }
    let visible: String = text.chars().take(visible_chars).collect();
    format!("{visible}***")
}

// ---------------------------------------------------------------------------
// .secretsignore
// ---------------------------------------------------------------------------

/// Path patterns from `.secretsignore`; blank lines and `#` comments skipped.
pub fn load_ignore_patterns(root: &Path) -> Vec<String> {
    let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();
    if let Ok(content) = std::fs::read_to_string(root.join(SECRETS_IGNORE_FILE)) {
        patterns.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    patterns
}

/// A pattern matches a path by prefix (`tests/fixtures/`), by suffix
/// (`*.snap`) or by exact file name.
fn is_ignored(file: &str, patterns: &[String]) -> bool {
    let name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    patterns.iter().any(|p| {
        if let Some(suffix) = p.strip_prefix('*') {
            file.ends_with(suffix)
        } else {
            file.starts_with(p.as_str()) || name == *p
        }
    })
}

fn has_skipped_extension(file: &str) -> bool {
    Path::new(file)
        .extension()
        .map(|e| SKIPPED_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
