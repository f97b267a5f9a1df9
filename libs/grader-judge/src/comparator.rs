/// Output Comparator - Tolerant Stdout Matching
///
/// **Core Responsibility:**
/// Decide whether a program's captured stdout matches a fixture's expected
/// output.
///
/// **Tolerant Rules (default):**
/// - `\r\n` and lone `\r` are treated as `\n`
/// - Leading and trailing whitespace of every line is ignored
/// - Letters compare case-insensitively
/// - Trailing blank lines are ignored
///
/// **Strict Rules:**
/// - Byte-exact comparison
///
/// The side-by-side diff is informational only and never changes a verdict.
use grader_common::config::ComparisonMode;
use grader_common::types::Verdict;

const DIFF_COLUMN_WIDTH: usize = 38;

/// Normalize output into comparable lines for tolerant mode
fn normalize_lines(output: &str) -> Vec<String> {
    let mut lines: Vec<String> = split_lines(output)
        .into_iter()
        .map(|line| line.trim().to_lowercase())
        .collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Split on `\r\n`, lone `\r` and `\n` alike
fn split_lines(output: &str) -> Vec<&str> {
    output
        .split("\r\n")
        .flat_map(|chunk| chunk.split(['\r', '\n']))
        .collect()
}

/// Compare actual output against expected output under the given mode
pub fn outputs_match(actual: &str, expected: &str, mode: ComparisonMode) -> bool {
    match mode {
        ComparisonMode::Strict => actual.as_bytes() == expected.as_bytes(),
        ComparisonMode::Tolerant => normalize_lines(actual) == normalize_lines(expected),
    }
}

/// Verdict for a run that exited normally
pub fn compare(actual: &str, expected: &str, mode: ComparisonMode) -> Verdict {
    if outputs_match(actual, expected, mode) {
        Verdict::Pass
    } else {
        Verdict::WrongAnswer
    }
}

/// Aligned two-column diff of the first `max_lines` differing lines
///
/// Lines are compared under the same tolerant normalization used for
/// verdicts, so a diff never lists lines the comparator considers equal.
pub fn side_by_side_diff(expected: &str, actual: &str, max_lines: usize) -> String {
    let expected_raw = split_lines(expected);
    let actual_raw = split_lines(actual);
    let expected_norm = normalize_lines(expected);
    let actual_norm = normalize_lines(actual);
    let rows = expected_norm.len().max(actual_norm.len());

    let mut out = format!(
        "{:>5} | {:<width$} | {}\n",
        "line",
        "expected",
        "actual",
        width = DIFF_COLUMN_WIDTH
    );
    let mut shown = 0;
    let mut differing = 0;
    for i in 0..rows {
        if expected_norm.get(i) == actual_norm.get(i) {
            continue;
        }
        differing += 1;
        if shown == max_lines {
            continue;
        }
        shown += 1;
        out.push_str(&format!(
            "{:>5} | {:<width$} | {}\n",
            i + 1,
            cell(expected_raw.get(i).copied()),
            cell(actual_raw.get(i).copied()),
            width = DIFF_COLUMN_WIDTH
        ));
    }
    if differing > shown {
        out.push_str(&format!("... {} more differing line(s)\n", differing - shown));
    }
    out
}

fn cell(line: Option<&str>) -> String {
    match line {
        None => "<missing>".to_string(),
        Some(text) if text.chars().count() > DIFF_COLUMN_WIDTH => {
            let mut clipped: String = text.chars().take(DIFF_COLUMN_WIDTH - 3).collect();
            clipped.push_str("...");
            clipped
        }
        Some(text) => text.to_string(),
    }
}
