use super::{positional, CommandValidator, Decision};

/// Process names an agent may signal: toolchains, dev servers, local databases.
pub const DEV_PROCESS_NAMES: &[&str] = &[
    "node",
    "npm",
    "npx",
    "yarn",
    "pnpm",
    "bun",
    "deno",
    "vite",
    "next",
    "nuxt",
    "webpack",
    "esbuild",
    "rollup",
    "tsx",
    "ts-node",
    "python",
    "python3",
    "flask",
    "uvicorn",
    "gunicorn",
    "django",
    "celery",
    "streamlit",
    "gradio",
    "pytest",
    "mypy",
    "ruff",
    "cargo",
    "rustc",
    "go",
    "ruby",
    "rails",
    "php",
    "postgres",
    "mysql",
    "mongod",
    "redis-server",
];

/// `pkill` and `killall`: only dev processes.
pub struct PkillValidator;

impl CommandValidator for PkillValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        let program = tokens[0].as_str();
        let Some(last) = positional(tokens).last() else {
            return Decision::deny(format!("{program} requires a process name"));
        };
        // `-f "node server.js"` matches a full command line; judge its first word.
        let target = last.split_whitespace().next().unwrap_or(last.as_str());
        if DEV_PROCESS_NAMES.contains(&target) {
            return Decision::allow();
        }
        let mut names: Vec<&str> = DEV_PROCESS_NAMES.to_vec();
        names.sort_unstable();
        Decision::deny(format!(
            "{program} only allowed for dev processes: {}...",
            names[..10].join(", ")
        ))
    }
}

/// `kill`: any specific PID, never every process.
pub struct KillValidator;

impl CommandValidator for KillValidator {
    fn validate(&self, tokens: &[String]) -> Decision {
        if tokens[1..]
            .iter()
            .any(|t| matches!(t.as_str(), "-1" | "0" | "-0"))
        {
            return Decision::deny("kill -1 and kill 0 are not allowed (affects all processes)");
        }
        Decision::allow()
    }
}
