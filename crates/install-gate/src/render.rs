//! Human-readable rendering of the findings shown before the prompt.

use policy_engine::UxDecision;
use risk_scanner::MISSING_ISSUE;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFinding {
    pub issue_type: String,
    pub severity: Option<String>,
    pub decision: UxDecision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageFindings {
    pub pkgid: String,
    pub existing: Option<String>,
    pub findings: Vec<ClassifiedFinding>,
}

const TRANSLATIONS: &[(&str, &str)] = &[
    (MISSING_ISSUE, "No data found"),
    ("malware", "Known malware"),
    ("criticalCVE", "Critical CVE"),
    ("cve", "High CVE"),
    ("didYouMean", "Possible typosquat attack"),
    ("troll", "Protestware or potentially unwanted behavior"),
    ("installScripts", "Install scripts"),
    ("hasNativeCode", "Native code"),
    ("networkAccess", "Network access"),
    ("shellAccess", "Shell access"),
    ("filesystemAccess", "Filesystem access"),
    ("envVars", "Environment variable access"),
    ("obfuscatedFile", "Obfuscated code"),
    ("obfuscatedRequire", "Obfuscated require"),
    ("gitDependency", "Git dependency"),
    ("httpDependency", "HTTP dependency"),
    ("unpublished", "Unpublished package"),
    ("deprecated", "Deprecated"),
    ("newAuthor", "New author"),
    ("unmaintained", "Unmaintained"),
    ("unstableOwnership", "Unstable ownership"),
    ("telemetry", "Telemetry"),
];

/// Title for a finding type, or the raw key when it has none.
pub fn issue_title(issue_type: &str) -> &str {
    TRANSLATIONS
        .iter()
        .find(|(key, _)| *key == issue_type)
        .map(|(_, title)| *title)
        .unwrap_or(issue_type)
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// One block per package, blocking findings first.
pub fn render_report(packages: &[PackageFindings], color: bool) -> String {
    let mut out = String::new();
    for package in packages {
        let header = match &package.existing {
            Some(existing) => format!("{} (was {existing})", package.pkgid),
            None => package.pkgid.clone(),
        };
        out.push_str(&paint(&header, "1", color));
        out.push('\n');

        let mut findings: Vec<&ClassifiedFinding> = package.findings.iter().collect();
        findings.sort_by_key(|finding| !finding.decision.block);
        for finding in findings {
            let (marker, code) = if finding.decision.block {
                ("✖", "31")
            } else {
                ("⚠", "33")
            };
            out.push_str("  ");
            out.push_str(&paint(marker, code, color));
            out.push(' ');
            out.push_str(issue_title(&finding.issue_type));
            if let Some(severity) = &finding.severity {
                out.push_str(&format!(" ({severity})"));
            }
            out.push('\n');
        }
    }
    out
}
