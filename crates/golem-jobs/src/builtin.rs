//! Names of the tags every iteration publishes before any user tag.

pub const GOLEM_OUTPUTS: &str = "golem_outputs";
pub const GOLEM_INPUTS: &str = "golem_inputs";

/// Instants published with `_date`, `_iso`, `_silk`, `_basic` and calendar parts.
pub const TIME_PREFIXES: [&str; 4] = ["golem_bin", "golem_start", "golem_end", "golem_next_bin"];

pub const TIME_FORMS: [&str; 4] = ["date", "iso", "silk", "basic"];

pub const DATE_PARTS: [&str; 7] = [
    "year",
    "month",
    "day",
    "hour",
    "minute",
    "second",
    "microsecond",
];

pub const SCALARS: [&str; 9] = [
    "golem_name",
    "golem_suite",
    "golem_repository",
    "golem_home",
    "golem_span",
    "golem_interval",
    "golem_span_iso",
    "golem_interval_iso",
    "golem_precision",
];

/// Every reserved name, in publication order.
pub fn names() -> Vec<String> {
    let mut out: Vec<String> = SCALARS.iter().map(|s| s.to_string()).collect();
    for prefix in TIME_PREFIXES {
        for form in TIME_FORMS {
            out.push(format!("{prefix}_{form}"));
        }
        for part in DATE_PARTS {
            out.push(format!("{prefix}_{part}"));
        }
    }
    out.push(GOLEM_OUTPUTS.to_string());
    out.push(GOLEM_INPUTS.to_string());
    out
}

pub fn is_builtin(name: &str) -> bool {
    names().iter().any(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_include_time_forms() {
        assert!(is_builtin("golem_bin_iso"));
        assert!(is_builtin("golem_next_bin_basic"));
        assert!(is_builtin("golem_end_microsecond"));
        assert!(is_builtin("golem_outputs"));
        assert!(!is_builtin("sensor"));
    }
}
