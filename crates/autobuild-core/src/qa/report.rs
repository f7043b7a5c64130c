//! QA iteration history and recurring-issue detection.

use crate::error::Result;
use crate::plan::{ImplementationPlan, IterationStatus, QaIssue, QaIterationRecord, QaStats};
use crate::{io, paths};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const RECURRING_ISSUE_THRESHOLD: usize = 3;
pub const ISSUE_SIMILARITY_THRESHOLD: f64 = 0.8;

const ISSUE_PREFIXES: &[&str] = &["error:", "issue:", "bug:", "fix:"];
const MOST_COMMON_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Append one iteration to `qa_iteration_history` and refresh `qa_stats`.
/// Creates the plan file when it does not exist yet.
pub fn record_iteration(
    spec_dir: &Path,
    iteration: u32,
    status: IterationStatus,
    issues: &[QaIssue],
    duration_seconds: Option<f64>,
) -> Result<()> {
    let mut plan = ImplementationPlan::load(spec_dir).unwrap_or_default();
    plan.qa_iteration_history.push(QaIterationRecord {
        iteration,
        status,
        issues: issues.to_vec(),
        duration_seconds: duration_seconds.map(|d| (d * 100.0).round() / 100.0),
        timestamp: chrono::Utc::now().to_rfc3339(),
    });

    let mut issues_by_type = BTreeMap::new();
    for issue in plan.qa_iteration_history.iter().flat_map(|r| r.issues.iter()) {
        let kind = issue.issue_type.as_deref().unwrap_or("unknown").to_string();
        *issues_by_type.entry(kind).or_insert(0) += 1;
    }
    plan.qa_stats = Some(QaStats {
        total_iterations: plan.qa_iteration_history.len() as u32,
        last_iteration: iteration,
        last_status: status.as_str().to_string(),
        issues_by_type,
    });
    plan.save(spec_dir)
}

pub fn iteration_history(spec_dir: &Path) -> Vec<QaIterationRecord> {
    ImplementationPlan::load(spec_dir)
        .map(|p| p.qa_iteration_history)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// `title|file|line`, lower-cased, with leading diagnostic prefixes such as
/// `Error:` removed from the title.
pub fn normalize_issue_key(issue: &QaIssue) -> String {
    let mut title = issue.title.trim().to_lowercase();
    for prefix in ISSUE_PREFIXES {
        if let Some(rest) = title.strip_prefix(prefix) {
            title = rest.trim().to_string();
        }
    }
    let file = issue.file.as_deref().unwrap_or("").trim().to_lowercase();
    let line = issue.line.as_ref().map(|l| l.to_string()).unwrap_or_default();
    format!("{title}|{file}|{line}")
}

pub fn issue_similarity(a: &QaIssue, b: &QaIssue) -> f64 {
    similarity_ratio(&normalize_issue_key(a), &normalize_issue_key(b))
}

/// Ratcliff/Obershelp ratio `2*M / T`, where `M` counts characters in the
/// recursively found longest common blocks. Two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_match(a, b);
    if k == 0 {
        return 0;
    }
    k + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + k..], &b[j + k..])
}

/// Earliest longest common substring as `(start_a, start_b, len)`.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let k = prev[j] + 1;
                row[j + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = row;
    }
    best
}

// ---------------------------------------------------------------------------
// Recurrence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringIssue {
    #[serde(flatten)]
    pub issue: QaIssue,
    pub occurrence_count: usize,
}

/// Current issues that, counted together with every similar issue in
/// `history`, occur at least `threshold` times. Similar means strictly
/// above `similarity`.
pub fn has_recurring_issues(
    current: &[QaIssue],
    history: &[QaIterationRecord],
    threshold: usize,
    similarity: f64,
) -> Vec<RecurringIssue> {
    if current.is_empty() || history.is_empty() {
        return Vec::new();
    }
    let past: Vec<&QaIssue> = history.iter().flat_map(|r| r.issues.iter()).collect();
    current
        .iter()
        .filter_map(|issue| {
            let seen = past
                .iter()
                .filter(|p| issue_similarity(issue, p) > similarity)
                .count();
            let occurrence_count = seen + 1;
            (occurrence_count >= threshold).then(|| RecurringIssue {
                issue: issue.clone(),
                occurrence_count,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IssueSummary {
    pub total_issues: usize,
    pub unique_issues: usize,
    pub most_common: Vec<CommonIssue>,
    pub iterations_approved: usize,
    pub iterations_rejected: usize,
    pub fix_success_rate: f64,
}

/// Aggregate view of the whole history; similar issues are grouped under
/// the first one seen.
pub fn recurring_issue_summary(history: &[QaIterationRecord], similarity: f64) -> IssueSummary {
    let approved = history
        .iter()
        .filter(|r| r.status == IterationStatus::Approved)
        .count();
    let rejected = history
        .iter()
        .filter(|r| r.status == IterationStatus::Rejected)
        .count();
    let fix_success_rate = if approved + rejected == 0 {
        0.0
    } else {
        approved as f64 / (approved + rejected) as f64
    };

    let mut groups: Vec<(&QaIssue, usize)> = Vec::new();
    let mut total_issues = 0;
    for issue in history.iter().flat_map(|r| r.issues.iter()) {
        total_issues += 1;
        match groups
            .iter_mut()
            .find(|(rep, _)| issue_similarity(rep, issue) > similarity)
        {
            Some((_, count)) => *count += 1,
            None => groups.push((issue, 1)),
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    groups.sort_by(|a, b| b.1.cmp(&a.1));

    IssueSummary {
        total_issues,
        unique_issues: groups.len(),
        most_common: groups
            .iter()
            .take(MOST_COMMON_LIMIT)
            .map(|(issue, occurrences)| CommonIssue {
                title: issue.title.clone(),
                file: issue.file.clone(),
                occurrences: *occurrences,
            })
            .collect(),
        iterations_approved: approved,
        iterations_rejected: rejected,
        fix_success_rate,
    }
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// Write `QA_ESCALATION.md` describing why the loop handed over to a human.
/// Nothing else in the spec directory is touched.
pub fn escalate_to_human(
    spec_dir: &Path,
    recurring: &[RecurringIssue],
    iteration: u32,
    similarity: f64,
) -> Result<PathBuf> {
    let history = iteration_history(spec_dir);
    let summary = recurring_issue_summary(&history, similarity);

    let mut out = String::from("# QA Escalation - Human Intervention Required\n\n");
    out.push_str(&format!(
        "**Generated**: {}\n**Iteration**: {iteration}\n",
        chrono::Utc::now().to_rfc3339()
    ));
    out.push_str(&format!(
        "**Reason**: {}\n\n",
        if recurring.is_empty() {
            "QA reached its iteration limit without approval".to_string()
        } else {
            format!("{} issue(s) keep recurring after fixes", recurring.len())
        }
    ));

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "- Total iterations: {}\n- Total issues found: {}\n- Unique issues: {}\n- Fix success rate: {:.0}%\n\n",
        history.len(),
        summary.total_issues,
        summary.unique_issues,
        summary.fix_success_rate * 100.0
    ));

    if !recurring.is_empty() {
        out.push_str("## Recurring Issues\n\n");
        for (n, r) in recurring.iter().enumerate() {
            out.push_str(&format!("### {}. {}\n\n", n + 1, r.issue.title));
            if let Some(file) = &r.issue.file {
                let line = r.issue.line.as_ref().map(|l| format!(":{l}")).unwrap_or_default();
                out.push_str(&format!("- **File**: {file}{line}\n"));
            }
            if let Some(kind) = &r.issue.issue_type {
                out.push_str(&format!("- **Type**: {kind}\n"));
            }
            out.push_str(&format!("- **Occurrences**: {}\n", r.occurrence_count));
            if let Some(desc) = &r.issue.description {
                out.push_str(&format!("\n{desc}\n"));
            }
            out.push('\n');
        }
    }

    if !summary.most_common.is_empty() {
        out.push_str("## Most Common Issues\n\n");
        for c in &summary.most_common {
            let file = c.file.as_deref().map(|f| format!(" ({f})")).unwrap_or_default();
            out.push_str(&format!("- {}{file}: {} occurrence(s)\n", c.title, c.occurrences));
        }
        out.push('\n');
    }

    out.push_str(
        "## Next Steps\n\n\
         1. Review the issues above and the latest `qa_report.md`.\n\
         2. Fix the root cause manually or clarify the spec.\n\
         3. Clear `qa_signoff` in `implementation_plan.json` and rerun `autobuild qa run`.\n",
    );

    let path = spec_dir.join(paths::QA_ESCALATION_MD);
    io::atomic_write(&path, out.as_bytes())?;
    tracing::warn!(path = %path.display(), iteration, "QA escalated to human review");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LineRef;
    use tempfile::TempDir;

    fn issue(title: &str, file: Option<&str>) -> QaIssue {
        QaIssue {
            title: title.into(),
            file: file.map(String::from),
            ..QaIssue::default()
        }
    }

    fn record(status: IterationStatus, issues: Vec<QaIssue>) -> QaIterationRecord {
        QaIterationRecord {
            iteration: 1,
            status,
            issues,
            duration_seconds: None,
            timestamp: String::new(),
        }
    }

    fn rejected(issues: Vec<QaIssue>) -> QaIterationRecord {
        record(IterationStatus::Rejected, issues)
    }

    #[test]
    fn record_iteration_appends_and_updates_stats() {
        let dir = TempDir::new().unwrap();
        let mut err = issue("Null check", Some("a.rs"));
        err.issue_type = Some("error".into());
        let mut warn = issue("Naming", None);
        warn.issue_type = Some("warning".into());

        record_iteration(dir.path(), 1, IterationStatus::Rejected, &[err.clone(), warn], Some(12.345))
            .unwrap();
        record_iteration(dir.path(), 2, IterationStatus::Rejected, &[err, issue("x", None)], None)
            .unwrap();

        let plan = ImplementationPlan::load(dir.path()).unwrap();
        assert_eq!(plan.qa_iteration_history.len(), 2);
        assert_eq!(plan.qa_iteration_history[0].duration_seconds, Some(12.35));
        assert!(plan.qa_iteration_history[1].duration_seconds.is_none());
        assert!(plan.qa_iteration_history[0].timestamp.contains('T'));
        let stats = plan.qa_stats.unwrap();
        assert_eq!(stats.total_iterations, 2);
        assert_eq!(stats.last_iteration, 2);
        assert_eq!(stats.last_status, "rejected");
        assert_eq!(stats.issues_by_type["error"], 2);
        assert_eq!(stats.issues_by_type["warning"], 1);
        assert_eq!(stats.issues_by_type["unknown"], 1);
    }

    #[test]
    fn history_is_empty_without_plan() {
        let dir = TempDir::new().unwrap();
        assert!(iteration_history(dir.path()).is_empty());
    }

    #[test]
    fn normalize_strips_prefixes_and_case() {
        let mut i = issue("Error: Something Wrong", Some("APP.PY"));
        i.line = Some(LineRef::Number(42));
        assert_eq!(normalize_issue_key(&i), "something wrong|app.py|42");
        assert!(normalize_issue_key(&issue("Bug: Memory leak", None)).starts_with("memory leak"));
        assert_eq!(normalize_issue_key(&QaIssue::default()), "||");
    }

    #[test]
    fn similarity_ratio_matches_ratcliff_obershelp() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        // "abcd" vs "bcde": one block "bcd" → 2*3/8
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);

        let mut a = issue("Type error in function foo", Some("utils.py"));
        a.line = Some(LineRef::Number(10));
        let mut b = a.clone();
        b.line = Some(LineRef::Number(12));
        assert!(issue_similarity(&a, &b) > ISSUE_SIMILARITY_THRESHOLD);
        assert!(
            issue_similarity(
                &issue("Database connection failed", Some("db.py")),
                &issue("Frontend rendering error", Some("ui.js"))
            ) < 0.5
        );
    }

    #[test]
    fn recurrence_counts_current_plus_history() {
        let same = || issue("Same error", Some("app.py"));
        let history = vec![rejected(vec![same()]), rejected(vec![same()])];
        let found = has_recurring_issues(&[same()], &history, 3, 0.8);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].occurrence_count, 3);

        assert!(has_recurring_issues(&[same()], &history[..1], 3, 0.8).is_empty());
        assert_eq!(has_recurring_issues(&[same()], &history[..1], 2, 0.8).len(), 1);
        assert!(has_recurring_issues(&[], &history, 3, 0.8).is_empty());
        assert!(has_recurring_issues(&[same()], &[], 3, 0.8).is_empty());
        assert!(has_recurring_issues(
            &[issue("New issue", None)],
            &[rejected(vec![issue("Old issue 1", None)])],
            2,
            0.8
        )
        .is_empty());
    }

    #[test]
    fn similarity_at_threshold_is_not_a_repeat() {
        let current = issue("Missing index on orders", Some("db.py"));
        let past = issue("Missing index on users", Some("db.py"));
        let exact = issue_similarity(&current, &past);
        assert!(exact > 0.5 && exact < 1.0);
        let history = vec![rejected(vec![past.clone()])];
        assert!(has_recurring_issues(&[current.clone()], &history, 2, exact).is_empty());
        assert_eq!(has_recurring_issues(&[current.clone()], &history, 2, exact - 0.01).len(), 1);

        let both = vec![rejected(vec![current, past])];
        assert_eq!(recurring_issue_summary(&both, exact).unique_issues, 2);
        assert_eq!(recurring_issue_summary(&both, exact - 0.01).unique_issues, 1);
    }

    #[test]
    fn summary_groups_and_ranks() {
        let history = vec![
            rejected(vec![issue("Common", None), issue("Rare", None)]),
            rejected(vec![issue("Common", None)]),
            record(IterationStatus::Approved, vec![issue("Common", None)]),
            record(IterationStatus::Approved, vec![]),
        ];
        let s = recurring_issue_summary(&history, 0.8);
        assert_eq!(s.total_issues, 4);
        assert_eq!(s.unique_issues, 2);
        assert_eq!(s.most_common[0].title, "Common");
        assert_eq!(s.most_common[0].occurrences, 3);
        assert_eq!(s.iterations_rejected, 2);
        assert_eq!(s.iterations_approved, 2);
        assert_eq!(s.fix_success_rate, 0.5);

        let many: Vec<QaIssue> = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf"]
            .iter()
            .map(|t| issue(t, None))
            .collect();
        let s = recurring_issue_summary(&[rejected(many)], 0.8);
        assert_eq!(s.unique_issues, 7);
        assert_eq!(s.most_common.len(), 5);

        assert_eq!(recurring_issue_summary(&[], 0.8), IssueSummary::default());
    }

    #[test]
    fn escalation_lists_recurring_issues() {
        let dir = TempDir::new().unwrap();
        let i = issue("Missing auth check", Some("api.rs"));
        for n in 1..=3 {
            record_iteration(dir.path(), n, IterationStatus::Rejected, &[i.clone()], None).unwrap();
        }
        let recurring = vec![RecurringIssue {
            issue: i,
            occurrence_count: 3,
        }];
        let path = escalate_to_human(dir.path(), &recurring, 3, 0.8).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("**Iteration**: 3"));
        assert!(text.contains("### 1. Missing auth check"));
        assert!(text.contains("- **File**: api.rs"));
        assert!(text.contains("- Total iterations: 3"));
    }
}
