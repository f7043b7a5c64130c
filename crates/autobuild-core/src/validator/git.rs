use super::{CommandValidator, Decision};
use crate::error::Result;
use crate::secret_scan::{self, SecretMatch};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Characters of a matched secret shown in rejection messages.
const MASK_VISIBLE_CHARS: usize = 12;

/// Global git options whose value is the following token.
const GLOBAL_OPTIONS_WITH_VALUE: &[&str] =
    &["-C", "-c", "--git-dir", "--work-tree", "--namespace", "--config-env"];

/// The git subcommand, past any global options (`git -C dir commit`).
fn subcommand(tokens: &[String]) -> Option<&str> {
    let mut rest = tokens.iter().skip(1);
    while let Some(token) = rest.next() {
        if GLOBAL_OPTIONS_WITH_VALUE.contains(&token.as_str()) {
            rest.next();
        } else if !token.starts_with('-') {
            return Some(token);
        }
    }
    None
}

/// Source of staged files and their secret matches.
pub trait SecretScanner: Send + Sync {
    fn staged_files(&self) -> Result<Vec<String>>;
    fn scan(&self, files: &[String]) -> Vec<SecretMatch>;
}

/// Scans the staged files of the repository at `root`.
pub struct RepoSecretScanner {
    root: PathBuf,
}

impl RepoSecretScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretScanner for RepoSecretScanner {
    fn staged_files(&self) -> Result<Vec<String>> {
        secret_scan::get_staged_files(&self.root)
    }

    fn scan(&self, files: &[String]) -> Vec<SecretMatch> {
        secret_scan::scan_files(files, &self.root)
    }
}

/// `git commit`: refuse while staged files contain secrets. Other git
/// subcommands pass through.
pub struct GitCommitValidator {
    scanner: Box<dyn SecretScanner>,
}

impl GitCommitValidator {
    pub fn new(scanner: Box<dyn SecretScanner>) -> Self {
        Self { scanner }
    }
}

impl CommandValidator for GitCommitValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        if subcommand(tokens) != Some("commit") {
            return Decision::allow();
        }
        let staged = match self.scanner.staged_files() {
            Ok(files) => files,
            Err(e) => {
                // A broken scanner never blocks a build.
                tracing::debug!(error = %e, "secret scan unavailable, allowing commit");
                return Decision::allow();
            }
        };
        if staged.is_empty() {
            return Decision::allow();
        }
        let matches = self.scanner.scan(&staged);
        if matches.is_empty() {
            return Decision::allow();
        }
        Decision::deny(secrets_report(&matches))
    }
}

fn secrets_report(matches: &[SecretMatch]) -> String {
    let mut by_file: BTreeMap<&str, Vec<&SecretMatch>> = BTreeMap::new();
    for m in matches {
        by_file.entry(m.file_path.as_str()).or_default().push(m);
    }

    let mut lines = vec![
        "SECRETS DETECTED - COMMIT BLOCKED".to_string(),
        String::new(),
        "The following potential secrets were found in staged files:".to_string(),
        String::new(),
    ];
    for (file, file_matches) in by_file {
        lines.push(format!("File: {file}"));
        for m in file_matches {
            lines.push(format!("  Line {}: {}", m.line_number, m.pattern_name));
            lines.push(format!(
                "    Found: {}",
                secret_scan::mask_secret(&m.matched_text, MASK_VISIBLE_CHARS)
            ));
        }
        lines.push(String::new());
    }
    lines.extend(
        [
            "ACTION REQUIRED:",
            "",
            "1. Move secrets to environment variables:",
            "   - Add the secret value to .env (create if needed)",
            "   - Read it in code with std::env::var(\"VAR_NAME\"), os.environ.get('VAR_NAME') or process.env.VAR_NAME",
            "   - Add the variable name (not value) to .env.example",
            "",
            "2. If this is a FALSE POSITIVE (test data, example, mock):",
            "   - Add the file pattern to .secretsignore",
            "   - Example: echo 'tests/fixtures/' >> .secretsignore",
            "",
            "After fixing, stage the changes with 'git add .' and retry the commit.",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutobuildError;
    use crate::validator::tokenize;

    struct FakeScanner {
        staged: Option<Vec<String>>,
        matches: Vec<SecretMatch>,
    }

    impl SecretScanner for FakeScanner {
        fn staged_files(&self) -> Result<Vec<String>> {
            self.staged
                .clone()
                .ok_or_else(|| AutobuildError::Agent("no git".into()))
        }
        fn scan(&self, _files: &[String]) -> Vec<SecretMatch> {
            self.matches.clone()
        }
    }

    fn validator(staged: Option<Vec<String>>, matches: Vec<SecretMatch>) -> GitCommitValidator {
        GitCommitValidator::new(Box::new(FakeScanner { staged, matches }))
    }

    fn leaked() -> SecretMatch {
        SecretMatch {
            file_path: "src/config.py".into(),
            line_number: 7,
            pattern_name: "OpenAI API key".into(),
            matched_text: "sk-abcdefghijklmnopqrstuvwxyz".into(),
        }
    }

    #[test]
    fn non_commit_subcommands_pass() {
        let v = validator(Some(vec!["a".into()]), vec![leaked()]);
        assert!(v.validate(&tokenize("git push origin main").unwrap()).allowed);
        assert!(v.validate(&tokenize("git add .").unwrap()).allowed);
    }

    #[test]
    fn commit_with_secret_is_blocked_with_instructions() {
        let v = validator(Some(vec!["src/config.py".into()]), vec![leaked()]);
        let d = v.validate(&tokenize("git commit -m 'wip'").unwrap());
        assert!(!d.allowed);
        assert!(d.reason.starts_with("SECRETS DETECTED - COMMIT BLOCKED"));
        assert!(d.reason.contains("File: src/config.py"));
        assert!(d.reason.contains("Line 7: OpenAI API key"));
        assert!(d.reason.contains("Found: sk-abcdefghi***"));
        assert!(!d.reason.contains("jklmnopqrstuvwxyz"));
        assert!(d.reason.contains(".secretsignore"));
    }

    #[test]
    fn global_options_do_not_hide_commit() {
        let v = validator(Some(vec!["src/config.py".into()]), vec![leaked()]);
        for cmd in [
            "git -C /repo commit -m x",
            "git -c user.name=bot commit -m x",
            "git --git-dir .git --work-tree . commit",
            "git --git-dir=.git --no-pager commit -m x",
        ] {
            assert!(!v.validate(&tokenize(cmd).unwrap()).allowed, "{cmd}");
        }
        assert!(v.validate(&tokenize("git -C commit status").unwrap()).allowed);
        assert!(v.validate(&tokenize("git --version").unwrap()).allowed);
    }

    #[test]
    fn clean_or_empty_stage_passes() {
        let v = validator(Some(vec!["README.md".into()]), vec![]);
        assert!(v.validate(&tokenize("git commit -m x").unwrap()).allowed);
        let v = validator(Some(vec![]), vec![leaked()]);
        assert!(v.validate(&tokenize("git commit").unwrap()).allowed);
    }

    #[test]
    fn unavailable_scanner_allows() {
        let v = validator(None, vec![leaked()]);
        assert!(v.validate(&tokenize("git commit -m x").unwrap()).allowed);
    }
}
