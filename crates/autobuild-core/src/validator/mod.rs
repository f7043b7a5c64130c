//! Shell command checks for agent-issued commands.
//!
//! A command is tokenized with POSIX shell-word rules and split into
//! segments at `&&`, `||`, `;`, `|` and `&`. The program of each segment is
//! mapped to a [`CommandKind`]; programs without a kind are allowed. Each
//! kind resolves to one [`CommandValidator`] whose verdict is final.
//! Rejection is a value ([`Decision`]), never an error.

mod database;
mod filesystem;
mod git;
mod process;

pub use database::{
    DropdbValidator, DropuserValidator, MongoValidator, MysqlValidator, MysqladminValidator,
    PsqlValidator, RedisCliValidator,
};
pub use filesystem::{ChmodValidator, InitScriptValidator, RmValidator};
pub use git::{GitCommitValidator, RepoSecretScanner, SecretScanner};
pub use process::{KillValidator, PkillValidator};

use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandValidator / CommandKind
// ---------------------------------------------------------------------------

/// Deep inspection of one command segment. `tokens[0]` is the program.
pub trait CommandValidator: Send + Sync {
    fn validate(&self, tokens: &[String]) -> Decision;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Pkill,
    Killall,
    Kill,
    Chmod,
    Rm,
    InitScript,
    Git,
    Dropdb,
    Dropuser,
    Psql,
    Mysql,
    RedisCli,
    Mongosh,
    Mysqladmin,
}

impl CommandKind {
    /// Kind for a program token; the basename is used, so `/bin/rm` is `Rm`.
    pub fn from_program(program: &str) -> Option<Self> {
        let name = program.rsplit('/').next().unwrap_or(program);
        Some(match name {
            "pkill" => CommandKind::Pkill,
            "killall" => CommandKind::Killall,
            "kill" => CommandKind::Kill,
            "chmod" => CommandKind::Chmod,
            "rm" => CommandKind::Rm,
            "init.sh" => CommandKind::InitScript,
            "git" => CommandKind::Git,
            "dropdb" => CommandKind::Dropdb,
            "dropuser" => CommandKind::Dropuser,
            "psql" => CommandKind::Psql,
            "mysql" | "mariadb" => CommandKind::Mysql,
            "redis-cli" => CommandKind::RedisCli,
            "mongosh" | "mongo" => CommandKind::Mongosh,
            "mysqladmin" => CommandKind::Mysqladmin,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Pkill => "pkill",
            CommandKind::Killall => "killall",
            CommandKind::Kill => "kill",
            CommandKind::Chmod => "chmod",
            CommandKind::Rm => "rm",
            CommandKind::InitScript => "init.sh",
            CommandKind::Git => "git",
            CommandKind::Dropdb => "dropdb",
            CommandKind::Dropuser => "dropuser",
            CommandKind::Psql => "psql",
            CommandKind::Mysql => "mysql",
            CommandKind::RedisCli => "redis-cli",
            CommandKind::Mongosh => "mongosh",
            CommandKind::Mysqladmin => "mysqladmin",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static PKILL: PkillValidator = PkillValidator;
static KILL: KillValidator = KillValidator;
static CHMOD: ChmodValidator = ChmodValidator;
static RM: RmValidator = RmValidator;
static INIT_SCRIPT: InitScriptValidator = InitScriptValidator;
static DROPDB: DropdbValidator = DropdbValidator;
static DROPUSER: DropuserValidator = DropuserValidator;
static PSQL: PsqlValidator = PsqlValidator;
static MYSQL: MysqlValidator = MysqlValidator;
static REDIS_CLI: RedisCliValidator = RedisCliValidator;
static MONGO: MongoValidator = MongoValidator;
static MYSQLADMIN: MysqladminValidator = MysqladminValidator;

// ---------------------------------------------------------------------------
// CommandGate
// ---------------------------------------------------------------------------

/// The validator table for one project, built once.
pub struct CommandGate {
    git: GitCommitValidator,
}

impl CommandGate {
    /// Gate whose `git commit` check scans the repository at `root`.
    pub fn new(root: &Path) -> Self {
        Self::with_scanner(Box::new(RepoSecretScanner::new(root)))
    }

    pub fn with_scanner(scanner: Box<dyn SecretScanner>) -> Self {
        Self {
            git: GitCommitValidator::new(scanner),
        }
    }

    pub fn validator(&self, kind: CommandKind) -> &dyn CommandValidator {
        match kind {
            CommandKind::Pkill | CommandKind::Killall => &PKILL,
            CommandKind::Kill => &KILL,
            CommandKind::Chmod => &CHMOD,
            CommandKind::Rm => &RM,
            CommandKind::InitScript => &INIT_SCRIPT,
            CommandKind::Git => &self.git,
            CommandKind::Dropdb => &DROPDB,
            CommandKind::Dropuser => &DROPUSER,
            CommandKind::Psql => &PSQL,
            CommandKind::Mysql => &MYSQL,
            CommandKind::RedisCli => &REDIS_CLI,
            CommandKind::Mongosh => &MONGO,
            CommandKind::Mysqladmin => &MYSQLADMIN,
        }
    }

    /// Decide whether `command` may run. Every segment must pass.
    pub fn validate(&self, command: &str) -> Decision {
        let Some(tokens) = tokenize(command) else {
            return Decision::deny(format!("Could not parse command: {command}"));
        };
        for segment in split_segments(&tokens) {
            let Some(kind) = CommandKind::from_program(&segment[0]) else {
                continue;
            };
            let decision = self.validator(kind).validate(segment);
            if !decision.allowed {
                tracing::info!(kind = %kind, reason = %decision.reason, "command rejected");
                return decision;
            }
        }
        Decision::allow()
    }
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

const OPERATORS: &[&str] = &["&&", "||", ";", "|", "&"];

/// POSIX shell-word split. `None` on unbalanced quotes or escapes.
pub fn tokenize(command: &str) -> Option<Vec<String>> {
    let raw = shlex::split(command)?;
    let mut tokens = Vec::with_capacity(raw.len());
    for token in raw {
        // `pkill node;` arrives as `node;`. Quoted text with spaces is left
        // intact so SQL such as `DELETE FROM t;` keeps its terminator.
        if token.len() > 1 && token.ends_with(';') && !token.contains(char::is_whitespace) {
            tokens.push(token[..token.len() - 1].to_string());
            tokens.push(";".to_string());
        } else {
            tokens.push(token);
        }
    }
    Some(tokens)
}

/// Split on operator tokens and drop leading `VAR=value` assignments.
fn split_segments(tokens: &[String]) -> Vec<&[String]> {
    tokens
        .split(|t| OPERATORS.contains(&t.as_str()))
        .map(|seg| {
            let skip = seg.iter().take_while(|t| is_env_assignment(t)).count();
            &seg[skip..]
        })
        .filter(|seg| !seg.is_empty())
        .collect()
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .enumerate()
                    .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        }
        None => false,
    }
}

/// Non-flag arguments after the program.
pub(crate) fn positional(tokens: &[String]) -> impl Iterator<Item = &String> {
    tokens.iter().skip(1).filter(|t| !t.starts_with('-'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret_scan::SecretMatch;

    struct NoSecrets;

    impl SecretScanner for NoSecrets {
        fn staged_files(&self) -> crate::Result<Vec<String>> {
            Ok(vec![])
        }
        fn scan(&self, _files: &[String]) -> Vec<SecretMatch> {
            vec![]
        }
    }

    fn gate() -> CommandGate {
        CommandGate::with_scanner(Box::new(NoSecrets))
    }

    #[test]
    fn unknown_programs_are_allowed() {
        assert!(gate().validate("ls -la").allowed);
        assert!(gate().validate("cargo test --workspace").allowed);
    }

    #[test]
    fn unparsable_command_fails_closed() {
        let d = gate().validate("echo 'unterminated");
        assert!(!d.allowed);
        assert!(d.reason.starts_with("Could not parse command"));
    }

    #[test]
    fn every_segment_is_checked() {
        assert!(!gate().validate("cd build && rm -rf /").allowed);
        assert!(!gate().validate("pkill node; rm -rf ~").allowed);
        assert!(gate().validate("npm run build && rm -rf ./dist").allowed);
    }

    #[test]
    fn env_assignments_are_skipped() {
        assert!(!gate().validate("FOO=1 rm -rf /").allowed);
    }

    #[test]
    fn program_basename_is_used() {
        assert_eq!(CommandKind::from_program("/bin/rm"), Some(CommandKind::Rm));
        assert_eq!(
            CommandKind::from_program("./init.sh"),
            Some(CommandKind::InitScript)
        );
        assert_eq!(CommandKind::from_program("mariadb"), Some(CommandKind::Mysql));
        assert_eq!(CommandKind::from_program("ls"), None);
    }

    #[test]
    fn trailing_semicolon_is_split_only_for_bare_words() {
        let t = tokenize("pkill node;").unwrap();
        assert_eq!(t, vec!["pkill", "node", ";"]);
        let t = tokenize("psql -c 'DELETE FROM users;'").unwrap();
        assert_eq!(t[2], "DELETE FROM users;");
    }
}
