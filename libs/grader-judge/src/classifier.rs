//! Failure Classifier
//!
//! Buckets the failures recorded in a report into categories and attaches
//! one fixed remediation hint per category. Reads verdicts only.

use grader_common::types::{
    CompileVerdict, Diagnostic, FailureCategory, JudgingReport, Verdict,
};
use std::collections::BTreeSet;

/// Category of a failing fixture verdict, None for a pass
pub fn category_of(verdict: Verdict) -> Option<FailureCategory> {
    match verdict {
        Verdict::Pass => None,
        Verdict::WrongAnswer => Some(FailureCategory::Logic),
        Verdict::Timeout => Some(FailureCategory::Timeout),
        Verdict::RuntimeError => Some(FailureCategory::Runtime),
    }
}

pub fn hint_for(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::Compilation => {
            "The program did not build. Check that the expected source files are present \
             and fix the first compiler error reported; later errors often follow from it."
        }
        FailureCategory::Timeout => {
            "The program ran past the time limit. Look for loops whose exit condition is \
             never reached, reads that wait for input that never arrives, or an algorithm \
             too slow for the input size."
        }
        FailureCategory::Logic => {
            "The program ran but printed the wrong output. Compare your output with the \
             expected output line by line and test edge cases such as empty input, zero \
             and the largest allowed values."
        }
        FailureCategory::Runtime => {
            "The program crashed or exited with an error status. Run it under a debugger \
             or with sanitizers enabled and check array bounds, null pointers and the \
             value returned from main."
        }
    }
}

/// Categories observed in a report, in a stable order
pub fn categories(report: &JudgingReport) -> BTreeSet<FailureCategory> {
    let mut found: BTreeSet<FailureCategory> = report
        .results()
        .filter_map(|r| category_of(r.verdict))
        .collect();
    if report
        .targets
        .iter()
        .any(|t| t.compile != CompileVerdict::Success)
    {
        found.insert(FailureCategory::Compilation);
    }
    found
}

/// Fill in the report's failure categories and hints
pub fn classify(report: &mut JudgingReport) {
    let found = categories(report);
    report.diagnostics = found
        .iter()
        .map(|&category| Diagnostic {
            category,
            hint: hint_for(category).to_string(),
        })
        .collect();
    report.failure_categories = found;
}
