//! Reference counting and identifier mangling.
//!
//! Counting tallies every `Id` occurrence; a `storeVar` reassignment opens a fresh reachability
//! window for its name, so reads before and after it are tracked separately. Mangling then hands
//! out short names from a base-64-style alphabet (digit-free first character), most-used names
//! first, skipping host-language keywords.

use std::rc::Rc;

use fnv::FnvHashMap;

use crate::ast::NodeKind;
use crate::transform::{PathContext, Visitor};

// COUNT REFS PASS
// ================================================================================================

#[derive(Default)]
pub(crate) struct CountRefs {
    counts: FnvHashMap<Rc<str>, Vec<usize>>,
    versions: FnvHashMap<Rc<str>, usize>,
}

impl CountRefs {
    /// Names with their total use count across every reachability window.
    pub(crate) fn names(&self) -> impl Iterator<Item = (&Rc<str>, usize)> {
        self.counts.iter().map(|(name, windows)| (name, windows.iter().sum()))
    }
}

impl Visitor for CountRefs {
    fn enter(&mut self, ctx: &mut PathContext<'_>) {
        match ctx.kind() {
            NodeKind::Id => {
                let name: Rc<str> = Rc::from(ctx.arena.text(ctx.node()));
                let version = self.versions.get(&name).copied().unwrap_or(0);
                let windows = self.counts.entry(name).or_default();
                while windows.len() <= version {
                    windows.push(0);
                }
                windows[version] += 1;
            },
            NodeKind::StoreVar => {
                let name_node = ctx.arena.child(ctx.node(), "name");
                let name: Rc<str> = Rc::from(ctx.arena.text(name_node));
                *self.versions.entry(name).or_insert(0) += 1;
            },
            _ => {},
        }
    }
}

// MANGLER
// ================================================================================================

const FIRST_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";
const REST_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$0123456789";

const RESERVED: &[&str] = &[
    "do", "if", "in", "for", "let", "new", "try", "var", "case", "else", "this", "void", "with",
];

fn short_name(index: usize) -> String {
    let mut name = String::new();
    name.push(FIRST_CHARS[index % FIRST_CHARS.len()] as char);
    let mut rest = index / FIRST_CHARS.len();
    while rest > 0 {
        rest -= 1;
        name.push(REST_CHARS[rest % REST_CHARS.len()] as char);
        rest /= REST_CHARS.len();
    }
    name
}

/// Assigns mangled names, shortest to the most-used.
pub(crate) fn mangle(refs: &CountRefs) -> FnvHashMap<Rc<str>, String> {
    let mut names: Vec<(Rc<str>, usize)> =
        refs.names().map(|(name, count)| (name.clone(), count)).collect();
    names.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut renames = FnvHashMap::default();
    let mut index = 0usize;
    for (name, _) in names {
        let mut candidate = short_name(index);
        index += 1;
        while RESERVED.contains(&candidate.as_str()) {
            candidate = short_name(index);
            index += 1;
        }
        renames.insert(name, candidate);
    }
    renames
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_dense_and_digit_free_at_start() {
        assert_eq!(short_name(0), "a");
        assert_eq!(short_name(25), "z");
        assert_eq!(short_name(54), "aa");
        for i in 0..500 {
            let name = short_name(i);
            assert!(!name.as_bytes()[0].is_ascii_digit());
        }
    }

    #[test]
    fn more_used_names_get_shorter_names() {
        let mut refs = CountRefs::default();
        refs.counts.insert(Rc::from("rarely"), vec![1]);
        refs.counts.insert(Rc::from("often"), vec![12]);
        refs.counts.insert(Rc::from("sometimes"), vec![4]);
        let renames = mangle(&refs);
        assert_eq!(renames["often"], "a");
        assert_eq!(renames["sometimes"], "b");
        assert_eq!(renames["rarely"], "c");
    }
}
