//! Agent prompt library.
//!
//! Built-in prompts ship with the binary. A file with the same name in the
//! configured prompts directory (default `.auto-claude/prompts/`) replaces
//! the built-in, so projects can tune agents without rebuilding.

use crate::error::{AutobuildError, Result};
use std::path::{Path, PathBuf};

pub const COMPLEXITY_ASSESSOR: &str = "complexity_assessor.md";
pub const SPEC_QUICK: &str = "spec_quick.md";
pub const SPEC_RESEARCHER: &str = "spec_researcher.md";
pub const SPEC_WRITER: &str = "spec_writer.md";
pub const SPEC_CRITIC: &str = "spec_critic.md";
pub const PLANNER: &str = "planner.md";
pub const VALIDATION_FIXER: &str = "validation_fixer.md";
pub const CODER: &str = "coder.md";
pub const QA_REVIEWER: &str = "qa_reviewer.md";
pub const QA_FIXER: &str = "qa_fixer.md";
pub const FOLLOWUP_PLANNER: &str = "followup_planner.md";

#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Raw prompt text: project override first, then the built-in.
    pub fn load(&self, name: &str) -> Result<String> {
        let override_path = self.dir.join(name);
        if override_path.is_file() {
            return Ok(std::fs::read_to_string(override_path)?);
        }
        builtin(name)
            .map(str::to_string)
            .ok_or_else(|| AutobuildError::PromptNotFound(name.to_string()))
    }

    /// Prompt followed by the spec/project locations and any extra context.
    pub fn compose(
        &self,
        name: &str,
        spec_dir: &Path,
        project_dir: &Path,
        additional_context: &str,
    ) -> Result<String> {
        let mut prompt = self.load(name)?;
        prompt.push_str(&format!(
            "\n\n---\n\n**Spec Directory**: {}\n**Project Directory**: {}\n",
            spec_dir.display(),
            project_dir.display()
        ));
        if !additional_context.is_empty() {
            prompt.push_str(&format!("\n{additional_context}\n"));
        }
        Ok(prompt)
    }
}

pub fn builtin(name: &str) -> Option<&'static str> {
    Some(match name {
        COMPLEXITY_ASSESSOR => COMPLEXITY_ASSESSOR_PROMPT,
        SPEC_QUICK => SPEC_QUICK_PROMPT,
        SPEC_RESEARCHER => SPEC_RESEARCHER_PROMPT,
        SPEC_WRITER => SPEC_WRITER_PROMPT,
        SPEC_CRITIC => SPEC_CRITIC_PROMPT,
        PLANNER => PLANNER_PROMPT,
        VALIDATION_FIXER => VALIDATION_FIXER_PROMPT,
        CODER => CODER_PROMPT,
        QA_REVIEWER => QA_REVIEWER_PROMPT,
        QA_FIXER => QA_FIXER_PROMPT,
        FOLLOWUP_PLANNER => FOLLOWUP_PLANNER_PROMPT,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Built-in prompts
// ---------------------------------------------------------------------------

const COMPLEXITY_ASSESSOR_PROMPT: &str = r#"# Complexity Assessor

You decide how much process a task needs before implementation starts.

Read `requirements.json` and `project_index.json` in the spec directory, then
look at the parts of the codebase the task touches.

Write `complexity_assessment.json` in the spec directory:

```json
{
  "complexity": "simple | standard | complex",
  "confidence": 0.0,
  "reasoning": "one or two sentences",
  "flags": { "needs_research": false, "needs_self_critique": false }
}
```

- simple: one or two files, no new dependencies, obvious change.
- standard: several files or one service, known patterns.
- complex: multiple services, external integrations, infrastructure or data
  migrations. Set `needs_research` when unfamiliar libraries or APIs are
  involved.

Do not modify any other file.
"#;

const SPEC_QUICK_PROMPT: &str = r#"# Quick Spec

The task is small. Produce a short but complete `spec.md` in the spec
directory with these sections:

## Overview
## Workflow Type
## Task Scope
## Files to Modify
## Success Criteria

Then write `implementation_plan.json` with a single phase containing one
chunk per file to change. Every chunk needs `id`, `description` and
`"status": "pending"`.

Do not implement the change.
"#;

const SPEC_RESEARCHER_PROMPT: &str = r#"# Integration Researcher

Read `requirements.json`. For every external library, service or API the task
relies on, verify how it is actually used: package names, versions, required
configuration and the calls involved. Prefer the project's existing usage and
official documentation over memory.

Write `research.json` in the spec directory:

```json
{
  "integrations_researched": [
    { "name": "", "package": "", "version": "", "findings": [], "gotchas": [] }
  ],
  "created_at": "ISO-8601 timestamp"
}
```
"#;

const SPEC_WRITER_PROMPT: &str = r#"# Spec Writer

Using `requirements.json`, `context.json`, `project_index.json` and
`research.json` (when present) in the spec directory, write `spec.md`.

Required sections:

## Overview
## Workflow Type
## Task Scope
## Success Criteria

Recommended sections: Files to Modify, Files to Reference, Requirements,
Patterns to Follow, QA Acceptance Criteria.

Be concrete: name files, functions and commands. Do not implement anything.
"#;

const SPEC_CRITIC_PROMPT: &str = r#"# Spec Critic

Review `spec.md` against `requirements.json`, `context.json` and
`research.json`. Look for wrong package names, APIs that do not exist,
missing requirements, unverifiable success criteria and scope creep.

Fix every issue directly in `spec.md`, then write `critique_report.json`:

```json
{
  "issues_found": [ { "severity": "high|medium|low", "description": "" } ],
  "issues_fixed": true,
  "no_issues_found": false,
  "critique_summary": ""
}
```
"#;

const PLANNER_PROMPT: &str = r#"# Implementation Planner

Turn `spec.md` into `implementation_plan.json` in the spec directory:

```json
{
  "feature": "short name",
  "workflow_type": "feature",
  "phases": [
    {
      "phase": 1,
      "name": "Backend",
      "type": "implementation",
      "depends_on": [],
      "chunks": [
        { "id": "1.1", "description": "", "service": "",
          "files_to_modify": [], "files_to_create": [], "status": "pending" }
      ]
    }
  ]
}
```

Each chunk must be completable in one focused session. Chunk ids are unique.
`depends_on` lists phase numbers that must finish first.
"#;

const VALIDATION_FIXER_PROMPT: &str = r#"# Validation Fixer

The spec artifacts failed structural validation. The errors and suggested
fixes are listed below. Edit the files in the spec directory so that every
error is resolved. Change only what the errors require.
"#;

const CODER_PROMPT: &str = r#"# Coder

Implement the next pending chunk of `implementation_plan.json`.

1. Read `spec.md` and the plan. Pick the first chunk whose status is not
   `completed`; set it to `in_progress`.
2. Implement it following the patterns in the files the spec references.
3. Verify the change (build, tests or the command the chunk describes).
4. Set the chunk status to `completed` and commit with a message naming the
   chunk id.

Continue with the next chunk while you have budget. Never mark a chunk
completed without verifying it.
"#;

const QA_REVIEWER_PROMPT: &str = r#"# QA Reviewer

Validate the implementation against `spec.md` and its success criteria.
Run the project's tests and any checks the spec lists. Inspect the changed
files for bugs, missing error handling and unmet requirements.

Write your verdict into `qa_signoff` in `implementation_plan.json`:

```json
"qa_signoff": {
  "status": "approved | rejected",
  "qa_session": 1,
  "issues_found": [ { "title": "", "type": "critical|major|minor",
                      "file": "", "line": 0, "description": "" } ],
  "timestamp": "ISO-8601 timestamp"
}
```

Also write a readable `qa_report.md`. When rejecting, write
`QA_FIX_REQUEST.md` with the exact fixes required.
"#;

const QA_FIXER_PROMPT: &str = r#"# QA Fixer

Read `QA_FIX_REQUEST.md` and `qa_report.md`. Fix every listed issue, verify
each fix, and commit. Do not change `qa_signoff` yourself; set
`"status": "fixes_applied"` in `qa_signoff` when you are done so the reviewer
runs again.
"#;

const FOLLOWUP_PLANNER_PROMPT: &str = r#"# Follow-up Planner

The build for this spec is complete. `FOLLOWUP_REQUEST.md` describes
additional work. Append new phases (numbered after the existing ones) with
pending chunks to `implementation_plan.json`. Never modify or remove
completed chunks. Update `spec.md` with a "Follow-up" section describing the
new scope.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn override_wins_over_builtin() {
        let dir = TempDir::new().unwrap();
        let lib = PromptLibrary::new(dir.path());
        assert!(lib.load(PLANNER).unwrap().contains("Implementation Planner"));
        std::fs::write(dir.path().join(PLANNER), "custom planner").unwrap();
        assert_eq!(lib.load(PLANNER).unwrap(), "custom planner");
    }

    #[test]
    fn compose_appends_locations_and_context() {
        let lib = PromptLibrary::new("/nonexistent");
        let p = lib
            .compose(SPEC_QUICK, Path::new("/p/specs/001"), Path::new("/p"), "**Task**: x")
            .unwrap();
        assert!(p.contains("**Spec Directory**: /p/specs/001"));
        assert!(p.ends_with("**Task**: x\n"));
        assert!(matches!(
            lib.load("missing.md"),
            Err(AutobuildError::PromptNotFound(_))
        ));
    }
}
