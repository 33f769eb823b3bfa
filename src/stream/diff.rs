/// Incremental suffix of `current` past the previously recorded byte length.
///
/// The upstream re-sends the full generated text on every event; the delta
/// is whatever lies beyond `prev_len`. A delta is produced only when
/// `current` is strictly longer. A shorter or equal snapshot yields `None`,
/// with no negative-length correction. `prev_len` must also fall on a char
/// boundary of `current`; when it does not (the snapshot was rewritten, not
/// extended), no delta is produced either.
#[must_use]
pub fn snapshot_delta(prev_len: usize, current: &str) -> Option<&str> {
    if current.len() <= prev_len {
        return None;
    }
    current.get(prev_len..)
}

#[cfg(test)]
mod tests {
    use super::snapshot_delta;

    #[test]
    fn test_growth_yields_suffix() {
        assert_eq!(snapshot_delta(0, "A"), Some("A"));
        assert_eq!(snapshot_delta(1, "AB"), Some("B"));
        assert_eq!(snapshot_delta(2, "ABC"), Some("C"));
    }

    #[test]
    fn test_equal_or_shorter_yields_nothing() {
        assert_eq!(snapshot_delta(3, "ABC"), None);
        assert_eq!(snapshot_delta(3, "AB"), None);
        assert_eq!(snapshot_delta(3, ""), None);
    }

    #[test]
    fn test_empty_snapshot_never_yields() {
        assert_eq!(snapshot_delta(0, ""), None);
    }

    #[test]
    fn test_non_boundary_prev_len_yields_nothing() {
        // 'é' is two bytes; an offset inside it is not a valid split point.
        assert_eq!(snapshot_delta(1, "éx"), None);
    }

    #[test]
    fn test_multibyte_growth() {
        let first = "caf";
        let second = "café";
        let delta = snapshot_delta(first.len(), second).unwrap();
        assert_eq!(delta, "é");
    }

    #[test]
    fn test_concatenated_deltas_equal_final_snapshot() {
        let snapshots = ["A", "A c", "A cat", "A cat sits.", "A cat sits."];
        let mut prev_len = 0;
        let mut assembled = String::new();
        for snapshot in snapshots {
            if let Some(delta) = snapshot_delta(prev_len, snapshot) {
                assembled.push_str(delta);
                prev_len = snapshot.len();
            }
        }
        assert_eq!(assembled, "A cat sits.");
    }
}
