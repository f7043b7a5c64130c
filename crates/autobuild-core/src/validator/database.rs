use super::{CommandValidator, Decision};
use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static DESTRUCTIVE_SQL: OnceLock<Vec<Regex>> = OnceLock::new();

fn destructive_sql() -> &'static [Regex] {
    DESTRUCTIVE_SQL.get_or_init(|| {
        [
            r"(?i)\bDROP\s+(DATABASE|SCHEMA|TABLE|INDEX|VIEW|FUNCTION|PROCEDURE|TRIGGER)\b",
            r"(?i)\bTRUNCATE\s+(TABLE\s+)?\w+",
            // DELETE without a WHERE clause
            r"(?i)\bDELETE\s+FROM\s+\w+\s*(;|$)",
            r"(?i)\bDROP\s+ALL\b",
            r"(?i)\bDESTROY\b",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

static DESTRUCTIVE_MONGO: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn destructive_mongo() -> &'static [(&'static str, Regex)] {
    DESTRUCTIVE_MONGO.get_or_init(|| {
        [
            ("dropDatabase()", r"(?i)\.dropDatabase\s*\("),
            ("drop()", r"(?i)\.drop\s*\("),
            ("deleteMany({})", r"(?i)\.deleteMany\s*\(\s*\{\s*\}\s*\)"),
            ("remove({})", r"(?i)\.remove\s*\(\s*\{\s*\}\s*\)"),
            ("dropAllUsers()", r"(?i)db\.dropAllUsers\s*\("),
            ("dropAllRoles()", r"(?i)db\.dropAllRoles\s*\("),
        ]
        .into_iter()
        .map(|(name, p)| (name, Regex::new(p).unwrap()))
        .collect()
    })
}

const SAFE_DATABASE_PREFIXES: &[&str] = &[
    "test", "dev", "local", "tmp", "temp", "scratch", "sandbox", "mock",
];
const SAFE_DATABASE_SUFFIXES: &[&str] = &["_test", "_dev", "_local", "_tmp", "_temp", "_mock"];

const SAFE_USER_PREFIXES: &[&str] = &["test", "dev", "tmp", "temp", "mock"];
const SAFE_USER_SUFFIXES: &[&str] = &["_test", "_dev"];

/// Connection flags of the postgres client tools that take a value.
const PG_VALUE_FLAGS: &[&str] = &[
    "-h",
    "--host",
    "-p",
    "--port",
    "-U",
    "--username",
    "--maintenance-db",
];

const REDIS_VALUE_FLAGS: &[&str] = &["-h", "-p", "-a", "-n", "--pass", "--user", "-u"];

const DANGEROUS_REDIS_COMMANDS: &[&str] = &[
    "FLUSHALL",
    "FLUSHDB",
    "DEBUG",
    "SHUTDOWN",
    "SLAVEOF",
    "REPLICAOF",
    "CONFIG",
    "BGSAVE",
    "BGREWRITEAOF",
    "CLUSTER",
];

const DANGEROUS_MYSQLADMIN_OPS: &[&str] = &["drop", "shutdown", "kill"];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The matched destructive statement, upper-cased.
pub fn destructive_sql_match(sql: &str) -> Option<String> {
    let upper = sql.to_uppercase();
    destructive_sql()
        .iter()
        .find_map(|re| re.find(&upper).map(|m| m.as_str().to_string()))
}

fn has_safe_name(name: &str, prefixes: &[&str], suffixes: &[&str]) -> bool {
    let lower = name.to_lowercase();
    prefixes.iter().any(|p| lower.starts_with(p)) || suffixes.iter().any(|s| lower.ends_with(s))
}

/// Last non-flag token, skipping the value of flags listed in `value_flags`.
fn target_name<'a>(tokens: &'a [String], value_flags: &[&str]) -> Option<&'a str> {
    let mut target = None;
    let mut iter = tokens[1..].iter();
    while let Some(token) = iter.next() {
        if value_flags.contains(&token.as_str()) {
            iter.next();
            continue;
        }
        if token.starts_with('-') {
            continue;
        }
        target = Some(token.as_str());
    }
    target
}

/// Inline statement passed with one of `flags` (`-c SQL`, `-cSQL`, `--execute SQL`).
fn inline_statement<'a>(tokens: &'a [String], flags: &[&str]) -> Option<&'a str> {
    for (i, token) in tokens.iter().enumerate() {
        for flag in flags {
            if token == flag {
                return tokens.get(i + 1).map(String::as_str);
            }
            if flag.len() == 2 && token.len() > 2 && token.starts_with(flag) {
                return Some(&token[2..]);
            }
        }
    }
    None
}

fn check_sql(program: &str, sql: Option<&str>) -> Decision {
    if let Some(matched) = sql.and_then(destructive_sql_match) {
        return Decision::deny(format!(
            "{program} command contains destructive SQL: '{matched}'. \
             DROP/TRUNCATE/DELETE operations require manual confirmation."
        ));
    }
    Decision::allow()
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// `dropdb`: test and dev databases only.
pub struct DropdbValidator;

impl CommandValidator for DropdbValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let Some(name) = target_name(tokens, PG_VALUE_FLAGS) else {
            return Decision::deny("dropdb requires a database name");
        };
        if has_safe_name(name, SAFE_DATABASE_PREFIXES, SAFE_DATABASE_SUFFIXES) {
            return Decision::allow();
        }
        Decision::deny(format!(
            "dropdb '{name}' blocked for safety. Only test/dev databases can be dropped \
             autonomously. Safe patterns: test*, *_test, dev*, *_dev, local*, *_local, tmp*, \
             *_tmp, temp*, *_temp, scratch*, sandbox*, mock*, *_mock"
        ))
    }
}

/// `dropuser`: test and dev roles only.
pub struct DropuserValidator;

impl CommandValidator for DropuserValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let Some(name) = target_name(tokens, PG_VALUE_FLAGS) else {
            return Decision::deny("dropuser requires a username");
        };
        if has_safe_name(name, SAFE_USER_PREFIXES, SAFE_USER_SUFFIXES) {
            return Decision::allow();
        }
        Decision::deny(format!(
            "dropuser '{name}' blocked for safety. Only test/dev users can be dropped \
             autonomously. Safe patterns: test*, *_test, dev*, *_dev, tmp*, temp*, mock*"
        ))
    }
}

pub struct PsqlValidator;

impl CommandValidator for PsqlValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        check_sql("psql", inline_statement(tokens, &["-c", "--command"]))
    }
}

/// `mysql` and `mariadb`.
pub struct MysqlValidator;

impl CommandValidator for MysqlValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        check_sql("mysql", inline_statement(tokens, &["-e", "--execute"]))
    }
}

pub struct RedisCliValidator;

impl CommandValidator for RedisCliValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let mut iter = tokens[1..].iter();
        while let Some(token) = iter.next() {
            if REDIS_VALUE_FLAGS.contains(&token.as_str()) {
                iter.next();
                continue;
            }
            if token.starts_with('-') {
                continue;
            }
            let cmd = token.to_uppercase();
            if DANGEROUS_REDIS_COMMANDS.contains(&cmd.as_str()) {
                return Decision::deny(format!(
                    "redis-cli command '{cmd}' is blocked for safety. \
                     Destructive Redis operations require manual confirmation."
                ));
            }
            break;
        }
        Decision::allow()
    }
}

/// `mongosh` and the legacy `mongo` shell.
pub struct MongoValidator;

impl CommandValidator for MongoValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let Some(script) = inline_statement(tokens, &["--eval"]) else {
            return Decision::allow();
        };
        if let Some((name, _)) = destructive_mongo().iter().find(|(_, re)| re.is_match(script)) {
            return Decision::deny(format!(
                "mongosh command contains destructive operation '{name}'. \
                 Database drop/delete operations require manual confirmation."
            ));
        }
        Decision::allow()
    }
}

pub struct MysqladminValidator;

impl CommandValidator for MysqladminValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        if let Some(op) = tokens[1..]
            .iter()
            .find(|t| DANGEROUS_MYSQLADMIN_OPS.contains(&t.to_lowercase().as_str()))
        {
            return Decision::deny(format!(
                "mysqladmin '{op}' is blocked for safety. \
                 Destructive operations require manual confirmation."
            ));
        }
        Decision::allow()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
