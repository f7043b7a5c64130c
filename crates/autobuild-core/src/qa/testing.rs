//! Test framework detection and the manual test plan fallback.

use crate::error::Result;
use crate::review::extract_section;
use crate::{io, paths};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Files whose presence in the project root means a test runner is set up.
const TEST_CONFIG_FILES: &[&str] = &[
    "pytest.ini",
    "pyproject.toml",
    "setup.cfg",
    "jest.config.js",
    "jest.config.ts",
    "vitest.config.js",
    "vitest.config.ts",
    "karma.conf.js",
    "cypress.config.js",
    "cypress.config.ts",
    "playwright.config.js",
    "playwright.config.ts",
    ".rspec",
    "spec/spec_helper.rb",
];

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec"];

/// Directory walks stop here; test files live near the top.
const MAX_SCAN_DEPTH: usize = 4;

const DEFAULT_CRITERIA: &[&str] = &[
    "Core functionality works as expected",
    "No errors in logs or console",
    "Existing features are unaffected",
];

/// Parsed `test_discovery.json`, if present and valid.
pub fn check_test_discovery(spec_dir: &Path) -> Option<Value> {
    io::read_json_lenient(&spec_dir.join(paths::TEST_DISCOVERY_JSON))
}

/// True when nothing suggests the project has automated tests. A discovery
/// file, when present, is authoritative.
pub fn is_no_test_project(spec_dir: &Path, project_dir: &Path) -> bool {
    if let Some(discovery) = check_test_discovery(spec_dir) {
        return discovery
            .get("frameworks")
            .and_then(Value::as_array)
            .map_or(true, |f| f.is_empty());
    }
    if TEST_CONFIG_FILES
        .iter()
        .any(|f| project_dir.join(f).is_file())
    {
        return false;
    }
    !TEST_DIRS
        .iter()
        .any(|d| contains_test_file(&project_dir.join(d), 0))
}

fn is_test_file(name: &str) -> bool {
    (name.starts_with("test_") && name.ends_with(".py"))
        || name.ends_with("_test.py")
        || name.ends_with("_test.go")
        || [".spec.", ".test."].iter().any(|marker| {
            name.contains(marker)
                && [".js", ".jsx", ".ts", ".tsx"].iter().any(|ext| name.ends_with(ext))
        })
        || name.ends_with("_spec.rb")
}

fn contains_test_file(dir: &Path, depth: usize) -> bool {
    if depth > MAX_SCAN_DEPTH {
        return false;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        if path.is_dir() {
            contains_test_file(&path, depth + 1)
        } else {
            is_test_file(&entry.file_name().to_string_lossy())
        }
    })
}

/// Acceptance criteria bullets from `spec.md`, or a default checklist.
fn acceptance_criteria(spec_dir: &Path) -> Vec<String> {
    let content = std::fs::read_to_string(spec_dir.join(paths::SPEC_MD)).unwrap_or_default();
    let found: Vec<String> = ["## Acceptance Criteria", "## QA Acceptance Criteria", "## Success Criteria"]
        .iter()
        .map(|h| extract_section(&content, h))
        .find(|s| !s.is_empty())
        .map(|section| {
            section
                .lines()
                .filter_map(|l| {
                    let l = l.trim();
                    l.strip_prefix("- [ ]")
                        .or_else(|| l.strip_prefix("- "))
                        .or_else(|| l.strip_prefix("* "))
                })
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if found.is_empty() {
        DEFAULT_CRITERIA.iter().map(|s| s.to_string()).collect()
    } else {
        found
    }
}

/// Write `MANUAL_TEST_PLAN.md` for projects without automated tests.
pub fn create_manual_test_plan(spec_dir: &Path, spec_name: &str) -> Result<PathBuf> {
    let criteria = acceptance_criteria(spec_dir)
        .iter()
        .map(|c| format!("- [ ] {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    let content = format!(
        r#"# Manual Test Plan - {spec_name}

**Generated**: {generated}
**Reason**: No automated test framework detected

## Overview

This project has no automated tests. Verify the implementation by hand
using the checklist below before approving the build.

## Pre-Test Setup

- [ ] Dependencies installed
- [ ] Environment variables and configuration in place
- [ ] Application starts without errors

## Acceptance Criteria

{criteria}

## Functional Tests

### Happy Path
- [ ] Primary use case works correctly
- [ ] Expected output is produced

### Edge Cases
- [ ] Empty input handling
- [ ] Invalid input handling
- [ ] Boundary values

### Error Handling
- [ ] Errors show a clear message
- [ ] The application recovers without a restart

## Non-Functional Tests

### Performance
- [ ] Response time is acceptable
- [ ] No memory growth during repeated use

### Security
- [ ] Input is validated
- [ ] No secrets in code or logs

## Browser/Environment Testing

- [ ] Primary target environment
- [ ] Secondary environments, if supported

## Sign-off

- [ ] All checks above pass
- Tested by: ____________
- Date: ____________
"#,
        generated = chrono::Utc::now().to_rfc3339(),
    );

    let path = spec_dir.join(paths::MANUAL_TEST_PLAN_MD);
    io::atomic_write(&path, content.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        spec: PathBuf,
        project: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = TempDir::new().unwrap();
        let spec = root.path().join("spec");
        let project = root.path().join("project");
        std::fs::create_dir_all(&spec).unwrap();
        std::fs::create_dir_all(&project).unwrap();
        Dirs {
            _root: root,
            spec,
            project,
        }
    }

    #[test]
    fn discovery_file_is_read_leniently() {
        let d = dirs();
        assert!(check_test_discovery(&d.spec).is_none());
        std::fs::write(d.spec.join(paths::TEST_DISCOVERY_JSON), "invalid json{").unwrap();
        assert!(check_test_discovery(&d.spec).is_none());
        std::fs::write(d.spec.join(paths::TEST_DISCOVERY_JSON), "{}").unwrap();
        assert_eq!(check_test_discovery(&d.spec), Some(serde_json::json!({})));
    }

    #[test]
    fn empty_project_has_no_tests() {
        let d = dirs();
        assert!(is_no_test_project(&d.spec, &d.project));
    }

    #[test]
    fn config_files_mark_test_projects() {
        for file in ["pytest.ini", "jest.config.ts", "playwright.config.ts", ".rspec"] {
            let d = dirs();
            std::fs::write(d.project.join(file), "").unwrap();
            assert!(!is_no_test_project(&d.spec, &d.project), "{file}");
        }
    }

    #[test]
    fn test_files_in_test_dirs() {
        for (dir, file, has_tests) in [
            ("tests", "test_app.py", true),
            ("tests", "app_test.py", true),
            ("__tests__", "app.spec.js", true),
            ("test", "app.test.ts", true),
            ("tests", "conftest.py", false),
        ] {
            let d = dirs();
            std::fs::create_dir_all(d.project.join(dir)).unwrap();
            std::fs::write(d.project.join(dir).join(file), "").unwrap();
            assert_eq!(!is_no_test_project(&d.spec, &d.project), has_tests, "{dir}/{file}");
        }
    }

    #[test]
    fn discovery_file_wins() {
        let d = dirs();
        std::fs::write(d.project.join("pytest.ini"), "").unwrap();
        std::fs::write(d.spec.join(paths::TEST_DISCOVERY_JSON), r#"{"frameworks": []}"#).unwrap();
        assert!(is_no_test_project(&d.spec, &d.project));

        let d = dirs();
        std::fs::write(
            d.spec.join(paths::TEST_DISCOVERY_JSON),
            r#"{"frameworks": [{"name": "pytest"}]}"#,
        )
        .unwrap();
        assert!(!is_no_test_project(&d.spec, &d.project));
    }

    #[test]
    fn manual_plan_uses_acceptance_criteria() {
        let d = dirs();
        std::fs::write(
            d.spec.join(paths::SPEC_MD),
            "# Spec\n\n## Acceptance Criteria\n- Feature does X\n- Feature handles Y\n\n## Implementation\nDetails.\n",
        )
        .unwrap();
        let path = create_manual_test_plan(&d.spec, "my-feature").unwrap();
        assert_eq!(path.file_name().unwrap(), paths::MANUAL_TEST_PLAN_MD);
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("# Manual Test Plan - my-feature"));
        assert!(text.contains("- [ ] Feature does X"));
        assert!(text.contains("- [ ] Feature handles Y"));
        assert!(!text.contains("Core functionality works as expected"));
        for section in ["## Overview", "## Functional Tests", "## Non-Functional Tests", "## Sign-off"] {
            assert!(text.contains(section), "{section}");
        }
        assert!(text.contains("**Reason**: No automated test framework detected"));
    }

    #[test]
    fn manual_plan_defaults_without_spec() {
        let d = dirs();
        let text = std::fs::read_to_string(create_manual_test_plan(&d.spec, "x").unwrap()).unwrap();
        assert!(text.contains("- [ ] Core functionality works as expected"));
    }
}
