use super::{CommandValidator, Decision};
use regex::Regex;
use std::sync::OnceLock;

const SAFE_CHMOD_MODES: &[&str] = &[
    "+x", "a+x", "u+x", "g+x", "o+x", "ug+x", "755", "644", "700", "600", "775", "664",
];

static EXEC_MODE_RE: OnceLock<Regex> = OnceLock::new();

fn exec_mode_re() -> &'static Regex {
    EXEC_MODE_RE.get_or_init(|| Regex::new(r"^[ugoa]*\+x$").unwrap())
}

static DANGEROUS_RM_RE: OnceLock<Vec<Regex>> = OnceLock::new();

fn dangerous_rm_targets() -> &'static [Regex] {
    DANGEROUS_RM_RE.get_or_init(|| {
        [
            r"^/$",
            r"^\.\.$",
            r"^~$",
            r"^\*$",
            r"^/\*$",
            r"^\.\./",
            r"^/home$",
            r"^/usr$",
            r"^/etc$",
            r"^/var$",
            r"^/bin$",
            r"^/lib$",
            r"^/opt$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// `chmod`: executable bits and a few common safe modes only.
pub struct ChmodValidator;

impl CommandValidator for ChmodValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let mut mode: Option<&str> = None;
        let mut files = 0usize;
        for token in &tokens[1..] {
            match token.as_str() {
                "-R" | "--recursive" => {}
                t if t.starts_with('-') => {
                    return Decision::deny(format!("chmod flag '{t}' is not allowed"));
                }
                t if mode.is_none() => mode = Some(t),
                _ => files += 1,
            }
        }
        let Some(mode) = mode else {
            return Decision::deny("chmod requires a mode");
        };
        if files == 0 {
            return Decision::deny("chmod requires at least one file");
        }
        if !SAFE_CHMOD_MODES.contains(&mode) && !exec_mode_re().is_match(mode) {
            return Decision::deny(format!(
                "chmod only allowed with executable modes (+x, 755, etc.), got: {mode}"
            ));
        }
        Decision::allow()
    }
}

/// `rm`: any flags, but never the filesystem root, home or system directories.
pub struct RmValidator;

impl CommandValidator for RmValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        for target in tokens[1..].iter().filter(|t| !t.starts_with('-')) {
            if dangerous_rm_targets().iter().any(|re| re.is_match(target)) {
                return Decision::deny(format!("rm target '{target}' is not allowed for safety"));
            }
        }
        Decision::allow()
    }
}

/// `init.sh`: only the project's own `./init.sh`.
pub struct InitScriptValidator;

impl CommandValidator for InitScriptValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let script = tokens[0].as_str();
        if script == "./init.sh" || script.ends_with("/init.sh") {
            return Decision::allow();
        }
        Decision::deny(format!("Only ./init.sh is allowed, got: {script}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::tokenize;

    fn check(v: &dyn CommandValidator, cmd: &str) -> Decision {
        v.validate(&tokenize(cmd).unwrap())
    }

    #[test]
    fn chmod_accepts_executable_modes() {
        assert!(check(&ChmodValidator, "chmod +x run.sh").allowed);
        assert!(check(&ChmodValidator, "chmod -R 755 scripts").allowed);
        assert!(check(&ChmodValidator, "chmod ugo+x a b").allowed);
    }

    #[test]
    fn chmod_rejects_unsafe_forms() {
        let d = check(&ChmodValidator, "chmod 777 app");
        assert!(!d.allowed);
        assert!(d.reason.contains("got: 777"));
        assert!(!check(&ChmodValidator, "chmod -v +x a").allowed);
        assert!(!check(&ChmodValidator, "chmod +x").allowed);
        assert!(!check(&ChmodValidator, "chmod").allowed);
    }

    #[test]
    fn rm_blocks_dangerous_targets() {
        assert!(!check(&RmValidator, "rm -rf /").allowed);
        assert!(!check(&RmValidator, "rm -rf ~").allowed);
        assert!(!check(&RmValidator, "rm -rf ../other").allowed);
        assert!(!check(&RmValidator, "rm -r /etc").allowed);
        assert!(!check(&RmValidator, "rm *").allowed);
    }

    #[test]
    fn rm_allows_project_paths() {
        assert_eq!(check(&RmValidator, "rm -rf ./build"), Decision::allow());
        assert!(check(&RmValidator, "rm -f /etc-backup/x").allowed);
        assert!(check(&RmValidator, "rm node_modules/.cache -rf").allowed);
    }

    #[test]
    fn init_script_must_be_local() {
        assert!(check(&InitScriptValidator, "./init.sh").allowed);
        assert!(check(&InitScriptValidator, "/repo/init.sh --fast").allowed);
        assert!(!check(&InitScriptValidator, "init.sh").allowed);
    }
}
