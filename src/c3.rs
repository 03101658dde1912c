//! C3 multiple-inheritance linearization.
//!
//! Computes the standard Python-style method resolution order:
//!
//! ```text
//! L[X] = [X] + merge(L[P1], L[P2], ..., [P1, P2, ...])
//! ```
//!
//! merge repeatedly takes the first head of any input list that does not
//! appear in any tail of the other lists, scanning the lists in
//! declaration order, and consumes it from every list it heads.  If no
//! such head exists, the hierarchy has no consistent linearization.

use fnv::FnvHashSet;
use itertools::Itertools;

use crate::error::{NyanError, Result};
use crate::Fqon;

/// Callable that yields the parent list of an object at the relevant
/// point in time.
pub type ParentsProvider<'a> = dyn Fn(&str) -> Result<Vec<Fqon>> + 'a;

/// Linearize the inheritance hierarchy of `name`.
///
/// The first element of the result is always `name` itself and no
/// element repeats.  Complexity is quadratic in the parent graph size;
/// callers memoize the result.
pub fn linearize(name: &str, get_parents: &ParentsProvider<'_>) -> Result<Vec<Fqon>> {
    let mut seen = FnvHashSet::default();
    linearize_recurse(name, get_parents, &mut seen)
}

fn linearize_recurse(
    name: &str,
    get_parents: &ParentsProvider<'_>,
    seen: &mut FnvHashSet<Fqon>,
) -> Result<Vec<Fqon>> {
    // the same object twice on the recursion stack is an inheritance cycle
    if !seen.insert(name.to_owned()) {
        return Err(NyanError::C3(format!(
            "recursive inheritance loop detected: '{}' already in {{{}}}",
            name,
            seen.iter().join(", ")
        )));
    }

    let parents = get_parents(name)?;

    // linearizations of all parents, plus the parent list itself
    let mut sublists = Vec::with_capacity(parents.len() + 1);
    for parent in &parents {
        sublists.push(linearize_recurse(parent, get_parents, seen)?);
    }
    sublists.push(parents.clone());

    // only needed for the recursive calls above
    seen.remove(name);

    let mut linearization = vec![name.to_owned()];

    // head position per sublist
    let mut heads = vec![0_usize; sublists.len()];

    loop {
        let mut exhausted = 0;
        let mut candidate: Option<&Fqon> = None;

        'candidates: for (i, sublist) in sublists.iter().enumerate() {
            let Some(head) = sublist.get(heads[i]) else {
                exhausted += 1;
                continue;
            };

            // a good head must not be in any other list's tail
            for (j, tail_list) in sublists.iter().enumerate() {
                if j == i {
                    continue;
                }
                if tail_list[(heads[j] + 1).min(tail_list.len())..].contains(head) {
                    continue 'candidates;
                }
            }

            candidate = Some(head);
            break;
        }

        if exhausted == sublists.len() {
            return Ok(linearization);
        }

        let Some(candidate) = candidate else {
            return Err(NyanError::C3(format!(
                "can't find consistent resolution order for '{}' with bases {}",
                name,
                parents.iter().join(", ")
            )));
        };

        let candidate = candidate.clone();
        linearization.push(candidate.clone());

        // consume the candidate from every list it heads
        for (i, sublist) in sublists.iter().enumerate() {
            if sublist.get(heads[i]) == Some(&candidate) {
                heads[i] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use fnv::FnvHashMap;

    fn provider(
        edges: &[(&str, &[&str])],
    ) -> FnvHashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(obj, parents)| {
                (
                    (*obj).to_owned(),
                    parents.iter().map(|p| (*p).to_owned()).collect(),
                )
            })
            .collect()
    }

    fn lin(edges: &[(&str, &[&str])], name: &str) -> Result<Vec<Fqon>> {
        let map = provider(edges);
        linearize(name, &|obj: &str| {
            map.get(obj)
                .cloned()
                .ok_or_else(|| NyanError::ObjectNotFound(obj.to_owned()))
        })
    }

    #[test]
    fn single_inheritance_chain() {
        let result = lin(
            &[("C", &["B"]), ("B", &["A"]), ("A", &[])],
            "C",
        )
        .unwrap();
        assert_eq!(result, vec!["C", "B", "A"]);
    }

    #[test]
    fn diamond() {
        let result = lin(
            &[
                ("Bottom", &["Left", "Right"]),
                ("Left", &["Top"]),
                ("Right", &["Top"]),
                ("Top", &[]),
            ],
            "Bottom",
        )
        .unwrap();
        assert_eq!(result, vec!["Bottom", "Left", "Right", "Top"]);
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let result = lin(
            &[("D", &["B", "C"]), ("B", &["A"]), ("C", &["A"]), ("A", &[])],
            "D",
        )
        .unwrap();
        assert_eq!(result, vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn cycle_is_detected() {
        assert_matches!(
            lin(&[("A", &["B"]), ("B", &["A"])], "A"),
            Err(NyanError::C3(_))
        );
    }

    #[test]
    fn inconsistent_hierarchy_is_rejected() {
        // the classic unmergeable order conflict: X before Y and Y before X
        let result = lin(
            &[
                ("Z", &["XY", "YX"]),
                ("XY", &["X", "Y"]),
                ("YX", &["Y", "X"]),
                ("X", &[]),
                ("Y", &[]),
            ],
            "Z",
        );
        assert_matches!(result, Err(NyanError::C3(_)));
    }

    #[test]
    fn first_element_is_self_and_unique() {
        let result = lin(
            &[
                ("Bottom", &["Left", "Right"]),
                ("Left", &["Top"]),
                ("Right", &["Top"]),
                ("Top", &[]),
            ],
            "Bottom",
        )
        .unwrap();
        assert_eq!(result[0], "Bottom");
        let unique: FnvHashSet<&String> = result.iter().collect();
        assert_eq!(unique.len(), result.len());
    }
}
