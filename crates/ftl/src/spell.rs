//! Unknown-subcommand spell correction.
//!
//! Grounded on `cli/alias_group.py`. A command name is suggested when
//! `distance^2 / max(len(a), len(b)) <= 1`, i.e. a single edit on a short
//! name counts but two edits, or one edit on a long name, don't.

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let tmp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j + 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

/// Returns the closest known command name to `given`, if any is within the
/// squared-distance/max-length <= 1 threshold.
pub fn suggest<'a>(given: &str, known: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    known
        .into_iter()
        .filter_map(|candidate| {
            let d = levenshtein(given, candidate);
            let max_len = given.chars().count().max(candidate.chars().count()).max(1);
            let score = (d * d) as f64 / max_len as f64;
            (score <= 1.0).then_some((score, candidate))
        })
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_single_typo() {
        let known = ["build", "start", "stop", "status"];
        assert_eq!(suggest("buidl", known), Some("build"));
    }

    #[test]
    fn rejects_unrelated_name() {
        let known = ["build", "start", "stop"];
        assert_eq!(suggest("profile", known), None);
    }
}
