//! Snapshot comparison.
//!
//! A [`Snapshot`] is an immutable observation of one node's state at one
//! instant: an arbitrarily nested tree of maps, sequences and scalars.
//! Snapshots are produced by node queries and compared structurally, never
//! by identity.
//!
//! Comparison has two modes:
//!
//! - [`MatchMode::Exact`]: key sets, sequence lengths and values must all
//!   match.
//! - [`MatchMode::Subset`]: the expected tree is a partial expectation —
//!   every expected key/element must be present and equal, and the observed
//!   tree may carry more. This is the mode used for steady-state checks,
//!   where the full node state is too volatile to pin down.
//!
//! Scalars are compared by exact value equality with no coercion: the
//! string `"1"` never equals the number `1`, and the integer `1` never
//! equals the float `1.0`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// An immutable structured observation of node state.
///
/// Maps with unique keys, ordered sequences, strings, numbers, booleans
/// and null — exactly the JSON data model, so `serde_json::Value` is the
/// representation.
pub type Snapshot = serde_json::Value;

/// How an expected snapshot is matched against an observed one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Key sets, sequence lengths and values must match exactly.
    Exact,
    /// Expected is a partial expectation; observed may carry extra keys
    /// and trailing sequence elements.
    #[default]
    Subset,
}

/// One difference between an expected and an observed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DiffKind {
    /// Values at this path differ (covers scalar mismatches and
    /// container-vs-scalar type mismatches).
    Value { expected: Snapshot, observed: Snapshot },
    /// Expected key absent from the observed map.
    MissingKey { expected: Snapshot },
    /// Observed key absent from the expected map. Only a failure in
    /// `Exact` mode; recorded for context in `Subset` mode.
    ExtraKey { observed: Snapshot },
    /// Expected sequence element past the end of the observed sequence.
    MissingElement { expected: Snapshot },
    /// Observed sequence element past the end of the expected sequence.
    /// Only a failure in `Exact` mode.
    ExtraElement { observed: Snapshot },
}

impl DiffKind {
    /// Whether this entry fails the comparison under the given mode.
    fn is_failure(&self, mode: MatchMode) -> bool {
        match self {
            DiffKind::Value { .. } | DiffKind::MissingKey { .. } | DiffKind::MissingElement { .. } => true,
            DiffKind::ExtraKey { .. } | DiffKind::ExtraElement { .. } => mode == MatchMode::Exact,
        }
    }
}

/// A single located difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    /// Dotted path from the snapshot root, e.g. `routes[0].nexthops[1].ip`.
    pub path: String,
    #[serde(flatten)]
    pub kind: DiffKind,
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { self.path.as_str() };
        match &self.kind {
            DiffKind::Value { expected, observed } => {
                write!(f, "{}: expected {}, got {}", path, expected, observed)
            }
            DiffKind::MissingKey { expected } => {
                write!(f, "{}: missing key (expected {})", path, expected)
            }
            DiffKind::ExtraKey { observed } => write!(f, "{}: extra key ({})", path, observed),
            DiffKind::MissingElement { expected } => {
                write!(f, "{}: missing element (expected {})", path, expected)
            }
            DiffKind::ExtraElement { observed } => {
                write!(f, "{}: extra element ({})", path, observed)
            }
        }
    }
}

/// Structured description of where two snapshots differ.
///
/// Entries appear in tree-walk order and locate every path where values
/// differ, are missing, or are extra. Extra entries are present even when
/// they are not failures for the mode in effect, so a mismatch report
/// shows the full picture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffTree {
    pub entries: Vec<DiffEntry>,
}

impl DiffTree {
    /// Number of recorded differences, failing or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for DiffTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Compare an observed snapshot against an expected one.
///
/// Returns `None` on match, `Some(DiffTree)` otherwise. Map key order is
/// irrelevant; sequences are compared element-wise in order. The
/// comparison is pure and total: a missing key is a diff entry, not an
/// error.
#[must_use]
pub fn compare(expected: &Snapshot, observed: &Snapshot, mode: MatchMode) -> Option<DiffTree> {
    let mut entries = Vec::new();
    walk(expected, observed, mode, &mut String::new(), &mut entries);

    if entries.iter().any(|e| e.kind.is_failure(mode)) {
        Some(DiffTree { entries })
    } else {
        None
    }
}

/// Deserialize a snapshot into a typed value, for callers that want to
/// inspect observed state beyond structural comparison.
pub fn from_snapshot<T: DeserializeOwned>(snapshot: Snapshot) -> Result<T, serde_json::Error> {
    serde_json::from_value(snapshot)
}

fn walk(
    expected: &Snapshot,
    observed: &Snapshot,
    mode: MatchMode,
    path: &mut String,
    entries: &mut Vec<DiffEntry>,
) {
    use serde_json::Value;

    match (expected, observed) {
        (Value::Object(exp), Value::Object(obs)) => {
            for (key, exp_val) in exp {
                let len = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
                match obs.get(key) {
                    Some(obs_val) => walk(exp_val, obs_val, mode, path, entries),
                    None => entries.push(DiffEntry {
                        path: path.clone(),
                        kind: DiffKind::MissingKey { expected: exp_val.clone() },
                    }),
                }
                path.truncate(len);
            }
            for (key, obs_val) in obs {
                if exp.contains_key(key) {
                    continue;
                }
                let len = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
                entries.push(DiffEntry {
                    path: path.clone(),
                    kind: DiffKind::ExtraKey { observed: obs_val.clone() },
                });
                path.truncate(len);
            }
        }
        (Value::Array(exp), Value::Array(obs)) => {
            let common = exp.len().min(obs.len());
            for i in 0..common {
                let len = path.len();
                path.push_str(&format!("[{}]", i));
                walk(&exp[i], &obs[i], mode, path, entries);
                path.truncate(len);
            }
            for (i, exp_val) in exp.iter().enumerate().skip(common) {
                entries.push(DiffEntry {
                    path: format!("{}[{}]", path, i),
                    kind: DiffKind::MissingElement { expected: exp_val.clone() },
                });
            }
            for (i, obs_val) in obs.iter().enumerate().skip(common) {
                entries.push(DiffEntry {
                    path: format!("{}[{}]", path, i),
                    kind: DiffKind::ExtraElement { observed: obs_val.clone() },
                });
            }
        }
        // Scalars, and any container-vs-scalar or container-vs-container
        // type mismatch: strict value equality, no coercion.
        (exp, obs) => {
            if exp != obs {
                entries.push(DiffEntry {
                    path: path.clone(),
                    kind: DiffKind::Value { expected: exp.clone(), observed: obs.clone() },
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_values_match_exactly() {
        let v = json!({
            "adjacency": "up",
            "neighbors": [{"id": "r2", "metric": 10}],
            "holdTime": 30,
            "overloaded": false,
            "area": null,
        });
        assert_eq!(compare(&v, &v, MatchMode::Exact), None);
        assert_eq!(compare(&v, &v, MatchMode::Subset), None);
    }

    #[test]
    fn extra_keys_pass_subset_but_fail_exact() {
        let expected = json!({"adjacency": "up"});
        let observed = json!({"adjacency": "up", "uptime": 1234});

        assert_eq!(compare(&expected, &observed, MatchMode::Subset), None);

        let diff = compare(&expected, &observed, MatchMode::Exact).unwrap();
        assert_eq!(diff.len(), 1);
        assert!(matches!(diff.entries[0].kind, DiffKind::ExtraKey { .. }));
        assert_eq!(diff.entries[0].path, "uptime");
    }

    #[test]
    fn missing_key_fails_both_modes() {
        let expected = json!({"adjacency": "up", "level": 2});
        let observed = json!({"adjacency": "up"});

        for mode in [MatchMode::Exact, MatchMode::Subset] {
            let diff = compare(&expected, &observed, mode).unwrap();
            assert!(diff.entries.iter().any(|e| e.path == "level"
                && matches!(e.kind, DiffKind::MissingKey { .. })));
        }
    }

    #[test]
    fn scalar_mismatch_reports_path_and_values() {
        let expected = json!({"locator": {"enabled": false}});
        let observed = json!({"locator": {"enabled": true}});

        let diff = compare(&expected, &observed, MatchMode::Subset).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries[0].path, "locator.enabled");
        let rendered = diff.to_string();
        assert!(rendered.contains("expected false, got true"), "{rendered}");
    }

    #[test]
    fn no_type_coercion_between_scalars() {
        // String "1" never equals number 1.
        assert!(compare(&json!("1"), &json!(1), MatchMode::Subset).is_some());
        // Integer 1 never equals float 1.0.
        assert!(compare(&json!(1), &json!(1.0), MatchMode::Subset).is_some());
        // Boolean is not number.
        assert!(compare(&json!(true), &json!(1), MatchMode::Subset).is_some());
        // Null only equals null.
        assert!(compare(&json!(null), &json!(0), MatchMode::Subset).is_some());
        assert!(compare(&json!(null), &json!(null), MatchMode::Exact).is_none());
    }

    #[test]
    fn sequences_compare_elementwise_in_order() {
        let expected = json!([1, 2, 3]);
        let observed = json!([1, 3, 2]);

        let diff = compare(&expected, &observed, MatchMode::Exact).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.entries[0].path, "[1]");
        assert_eq!(diff.entries[1].path, "[2]");
    }

    #[test]
    fn longer_observed_sequence_passes_subset_only() {
        let expected = json!({"routes": [{"prefix": "fc00:0:1::/48"}]});
        let observed = json!({"routes": [{"prefix": "fc00:0:1::/48"}, {"prefix": "fc00:0:2::/48"}]});

        assert_eq!(compare(&expected, &observed, MatchMode::Subset), None);

        let diff = compare(&expected, &observed, MatchMode::Exact).unwrap();
        assert_eq!(diff.entries[0].path, "routes[1]");
        assert!(matches!(diff.entries[0].kind, DiffKind::ExtraElement { .. }));
    }

    #[test]
    fn shorter_observed_sequence_fails_both_modes() {
        let expected = json!([1, 2]);
        let observed = json!([1]);

        for mode in [MatchMode::Exact, MatchMode::Subset] {
            let diff = compare(&expected, &observed, mode).unwrap();
            assert!(matches!(diff.entries[0].kind, DiffKind::MissingElement { .. }));
        }
    }

    #[test]
    fn container_type_mismatch_is_a_value_diff() {
        let expected = json!({"neighbors": []});
        let observed = json!({"neighbors": "none"});

        let diff = compare(&expected, &observed, MatchMode::Subset).unwrap();
        assert_eq!(diff.entries[0].path, "neighbors");
        assert!(matches!(diff.entries[0].kind, DiffKind::Value { .. }));
    }

    #[test]
    fn subset_failure_still_reports_extras_for_context() {
        let expected = json!({"state": "up", "metric": 10});
        let observed = json!({"state": "down", "metric": 10, "uptime": 5});

        let diff = compare(&expected, &observed, MatchMode::Subset).unwrap();
        // The failing entry plus the informational extra key.
        assert!(diff.entries.iter().any(|e| e.path == "state"));
        assert!(diff
            .entries
            .iter()
            .any(|e| e.path == "uptime" && matches!(e.kind, DiffKind::ExtraKey { .. })));
    }

    #[test]
    fn root_scalar_mismatch_renders_root_marker() {
        let diff = compare(&json!(1), &json!(2), MatchMode::Exact).unwrap();
        assert!(diff.to_string().starts_with("(root):"));
    }
}
