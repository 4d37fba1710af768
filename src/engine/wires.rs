//! Wire matching against a host-supplied response path (§4.2 "Wire
//! matching").
//!
//! A host descends a response tree field by field; at each step it hands
//! the engine the *full* path from the owning trunk, which may contain
//! numeric segments for array positions the host itself has already
//! resolved (e.g. `["stops", "2", "name"]`). Wires are never authored
//! against a literal index — arrays are declared via `[] as x { ... }`
//! blocks instead (§9) — so matching always happens against the path with
//! indices stripped.

use crate::compiler::instruction::{Trunk, Wire};

/// Strips digit-only segments (array indices the host has already
/// resolved) from a host path, producing the path wires are declared
/// against.
pub fn clean_path(path: &[String]) -> Vec<String> {
    path.iter().filter(|seg| seg.parse::<usize>().is_err()).cloned().collect()
}

/// True when `wire`'s target is exactly `(trunk, clean_path, element)`.
pub fn wire_targets(wire: &Wire, trunk: &Trunk, clean_path: &[String], element: bool) -> bool {
    let to = wire.to();
    to.trunk == *trunk && to.path == clean_path && to.element == element
}

/// Every wire in `wires` whose target matches, in declaration order (cost
/// sorting, where relevant, happens later in `pull`).
pub fn matching<'a>(wires: &'a [Wire], trunk: &Trunk, path: &[String], element: bool) -> Vec<&'a Wire> {
    let clean = clean_path(path);
    wires.iter().filter(|w| wire_targets(w, trunk, &clean, element)).collect()
}

/// True when some wire addresses a path strictly longer than, and
/// prefixed by, `path` against `(trunk, element)` — i.e. there is
/// structure to keep descending into even though nothing targets `path`
/// itself. Used to decide whether an exact-match miss should be treated
/// as "nothing here" (`Value::Null`) or "come back field by field"
/// (`FieldValue::SelfRef`, §4.2's field resolution contract).
pub fn has_deeper_match(wires: &[Wire], trunk: &Trunk, path: &[String], element: bool) -> bool {
    wires.iter().any(|w| {
        let to = w.to();
        to.trunk == *trunk && to.element == element && to.path.len() > path.len() && to.path.starts_with(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::instruction::NodeRef;

    fn trunk() -> Trunk {
        Trunk::bridge("Query", "echo")
    }

    #[test]
    fn clean_path_drops_numeric_segments() {
        let path = vec!["stops".to_string(), "2".to_string(), "name".to_string()];
        assert_eq!(clean_path(&path), vec!["stops".to_string(), "name".to_string()]);
    }

    #[test]
    fn matching_filters_by_trunk_path_and_element() {
        let wires = vec![Wire::Constant {
            to: NodeRef::new(trunk(), vec!["text".to_string()]),
            value: "\"hi\"".to_string(),
        }];
        assert_eq!(matching(&wires, &trunk(), &["text".to_string()], false).len(), 1);
        assert_eq!(matching(&wires, &trunk(), &["other".to_string()], false).len(), 0);
        assert_eq!(matching(&wires, &trunk(), &["text".to_string()], true).len(), 0);
    }

    #[test]
    fn has_deeper_match_detects_nested_targets() {
        let wires = vec![Wire::Constant {
            to: NodeRef::new(trunk(), vec!["a".to_string(), "b".to_string()]),
            value: "1".to_string(),
        }];
        assert!(has_deeper_match(&wires, &trunk(), &["a".to_string()], false));
        assert!(!has_deeper_match(&wires, &trunk(), &["a".to_string(), "b".to_string()], false));
    }
}
