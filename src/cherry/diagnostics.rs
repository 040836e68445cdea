//! Conflict reports from `git am` output

const CONFLICT_MARKER: &str = "Merge conflict in ";
const HASH_MISMATCH_MARKER: &str = "sha1 information is lacking or useless";

/// Files a patch could not be applied to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyDiagnostics {
    /// Files with merge conflicts, in output order
    pub conflicts: Vec<String>,
    /// Files whose blob hashes were missing from the patch
    pub hash_mismatches: Vec<String>,
}

impl ApplyDiagnostics {
    /// Scan apply output line by line
    pub fn parse(output: &str) -> Self {
        let mut diagnostics = Self::default();
        for line in output.lines() {
            if let Some(idx) = line.find(CONFLICT_MARKER) {
                diagnostics
                    .conflicts
                    .push(line[idx + CONFLICT_MARKER.len()..].to_string());
            }
            if let Some(file) = hash_mismatch_file(line) {
                diagnostics.hash_mismatches.push(file.to_string());
            }
        }
        diagnostics
    }

    /// Whether nothing was recognised
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty() && self.hash_mismatches.is_empty()
    }

    /// Human-readable report; empty when nothing was recognised
    pub fn message(&self) -> String {
        let mut message = String::new();
        if !self.conflicts.is_empty() {
            message.push_str("Conflict files:\n");
            message.push_str(&self.conflicts.join("\n"));
            message.push('\n');
        }
        if !self.hash_mismatches.is_empty() {
            message.push_str(HASH_MISMATCH_MARKER);
            message.push('\n');
            message.push_str(&self.hash_mismatches.join("\n"));
            message.push('\n');
        }
        message
    }
}

/// `... sha1 information is lacking or useless (<file>) ...` -> `<file>`
fn hash_mismatch_file(line: &str) -> Option<&str> {
    let start = line.find(HASH_MISMATCH_MARKER)? + HASH_MISMATCH_MARKER.len();
    let rest = line[start..].strip_prefix(" (")?;
    // Greedy: the file name runs to the last closing parenthesis
    let end = rest.rfind(')')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_in_order() {
        let output = "Applying: fix\n\
                      CONFLICT (content): Merge conflict in a.go\n\
                      CONFLICT (content): Merge conflict in b.go\n\
                      error: Failed to merge in the changes.";
        let d = ApplyDiagnostics::parse(output);
        assert_eq!(d.conflicts, vec!["a.go", "b.go"]);
        assert!(d.hash_mismatches.is_empty());
        assert_eq!(d.message(), "Conflict files:\na.go\nb.go\n");
    }

    #[test]
    fn test_hash_mismatch() {
        let output = "error: sha1 information is lacking or useless (store/tikv/txn.go).\n\
                      error: could not build fake ancestor";
        let d = ApplyDiagnostics::parse(output);
        assert!(d.conflicts.is_empty());
        assert_eq!(d.hash_mismatches, vec!["store/tikv/txn.go"]);
        assert_eq!(
            d.message(),
            "sha1 information is lacking or useless\nstore/tikv/txn.go\n"
        );
    }

    #[test]
    fn test_both_sections() {
        let output = "Merge conflict in x.rs\nsha1 information is lacking or useless (y.rs).";
        let d = ApplyDiagnostics::parse(output);
        assert_eq!(
            d.message(),
            "Conflict files:\nx.rs\nsha1 information is lacking or useless\ny.rs\n"
        );
    }

    #[test]
    fn test_unrecognised_output_is_empty() {
        let d = ApplyDiagnostics::parse("fatal: something else\n");
        assert!(d.is_empty());
        assert_eq!(d.message(), "");
    }
}
