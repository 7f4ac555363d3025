//! Sequential runner for a planned set of checks against one page.
//!
//! Every check borrows its own page from the [`PageSource`] and hands it back
//! on completion, on error and on cancellation alike.
use crate::affordance::{ThemeToggle, audit_link_scope, check_theme_toggle};
use crate::api::MediaWikiApi;
use crate::consistency::ConsistencyChecker;
use crate::rendered::RenderedTarget;
use concord_common::{ApiContent, CheckError, LinkCheckPolicy, LinkScope, SectionScope};
use concord_drivers::{PageDriver, PageSource};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum PlannedCheck {
    Section {
        title: String,
        scope: SectionScope,
        content: ApiContent,
    },
    Links {
        scope: LinkScope,
        policy: LinkCheckPolicy,
    },
    Theme(ThemeToggle),
}

impl PlannedCheck {
    /// Name used in the report, e.g. `section:History` or `links:#footer`.
    pub fn name(&self) -> String {
        match self {
            PlannedCheck::Section { title, .. } => format!("section:{title}"),
            PlannedCheck::Links { scope, .. } => format!("links:{scope}"),
            PlannedCheck::Theme(_) => "theme".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuitePlan {
    pub target: RenderedTarget,
    pub checks: Vec<PlannedCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed { reason: String },
    Errored { kind: String, message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl SuiteReport {
    /// `true` only when every check passed. Cancelled checks count as not passed.
    pub fn passed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.verdict, Verdict::Passed))
    }
}

/// Run `plan` check by check.
///
/// Once `cancel` fires, the running check is abandoned (its page is still
/// released) and the remaining checks are reported as cancelled without
/// opening a page.
pub async fn run_suite<S: PageSource>(
    source: &S,
    api: &MediaWikiApi,
    plan: &SuitePlan,
    cancel: &CancellationToken,
) -> SuiteReport {
    let mut report = SuiteReport::default();

    for check in &plan.checks {
        let name = check.name();
        if cancel.is_cancelled() {
            report.outcomes.push(CheckOutcome {
                name,
                verdict: Verdict::Cancelled,
            });
            continue;
        }

        let page = match source.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(target: "concord.suite", check = %name, error = %e, "failed to open page");
                report.outcomes.push(CheckOutcome {
                    name,
                    verdict: errored(&CheckError::Driver(e)),
                });
                continue;
            }
        };

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => Verdict::Cancelled,
            v = execute(&page, api, &plan.target, check) => v,
        };

        if let Err(e) = source.release_page(page).await {
            warn!(target: "concord.suite", check = %name, error = %e, "failed to release page");
        }

        info!(target: "concord.suite", check = %name, ?verdict, "check finished");
        report.outcomes.push(CheckOutcome { name, verdict });
    }
    report
}

async fn execute<D: PageDriver>(
    page: &D,
    api: &MediaWikiApi,
    target: &RenderedTarget,
    check: &PlannedCheck,
) -> Verdict {
    match check {
        PlannedCheck::Section {
            title,
            scope,
            content,
        } => {
            let checker = ConsistencyChecker::new(page, target, api)
                .with_scope(*scope)
                .with_content(*content);
            match checker.check_section_consistency(title).await {
                Ok(r) if r.equal => Verdict::Passed,
                Ok(r) => Verdict::Failed {
                    reason: format!(
                        "unique word counts differ: rendered {} vs api {}",
                        r.rendered_words, r.api_words
                    ),
                },
                Err(e) => errored(&e),
            }
        }
        PlannedCheck::Links { scope, policy } => {
            match audit_link_scope(page, target, scope, *policy).await {
                Ok(audit) if audit.is_valid() => Verdict::Passed,
                Ok(audit) => {
                    let positions: Vec<String> = audit
                        .violations
                        .iter()
                        .map(|v| v.position.to_string())
                        .collect();
                    Verdict::Failed {
                        reason: format!(
                            "{} of {} links have no destination (positions {})",
                            audit.violations.len(),
                            audit.checked,
                            positions.join(", ")
                        ),
                    }
                }
                Err(e) => errored(&e),
            }
        }
        PlannedCheck::Theme(toggle) => {
            match check_theme_toggle(page, &target.page_url, toggle).await {
                Ok(t) if t.toggled() => Verdict::Passed,
                Ok(t) => Verdict::Failed {
                    reason: format!("theme marker stayed {}", t.after),
                },
                Err(e) => errored(&e),
            }
        }
    }
}

fn errored(err: &CheckError) -> Verdict {
    Verdict::Errored {
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_names() {
        let section = PlannedCheck::Section {
            title: "History".into(),
            scope: SectionScope::Subtree,
            content: ApiContent::Text,
        };
        assert_eq!(section.name(), "section:History");
        let links = PlannedCheck::Links {
            scope: LinkScope::Container("#footer".into()),
            policy: LinkCheckPolicy::FailFast,
        };
        assert_eq!(links.name(), "links:#footer");
        let tools = PlannedCheck::Links {
            scope: LinkScope::Section("Microsoft development tools".into()),
            policy: LinkCheckPolicy::CollectAll,
        };
        assert_eq!(tools.name(), "links:section:Microsoft development tools");
    }

    #[test]
    fn report_passes_only_when_all_pass() {
        let mut report = SuiteReport::default();
        assert!(report.passed());
        report.outcomes.push(CheckOutcome {
            name: "a".into(),
            verdict: Verdict::Passed,
        });
        assert!(report.passed());
        report.outcomes.push(CheckOutcome {
            name: "b".into(),
            verdict: Verdict::Cancelled,
        });
        assert!(!report.passed());
    }

    #[test]
    fn outcome_serializes_flat() {
        let outcome = CheckOutcome {
            name: "theme".into(),
            verdict: Verdict::Failed {
                reason: "theme marker stayed false".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "theme",
                "verdict": "failed",
                "reason": "theme marker stayed false"
            })
        );
    }
}
