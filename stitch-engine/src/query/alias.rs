//! Response keys for fields the engine injects into backend queries.

use std::fmt;

use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::json_ext::Path;
use crate::json_ext::PathElement;

const SUFFIX_LENGTH: usize = 8;

/// Supplies the per-operation suffix appended to injected aliases.
pub trait AliasStrategy: Send + Sync + fmt::Debug {
    /// Called once per operation.
    fn suffix(&self) -> Option<String>;
}

/// No suffix: aliases are fully predictable.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicAliases;

impl AliasStrategy for DeterministicAliases {
    fn suffix(&self) -> Option<String> {
        None
    }
}

/// A random alphanumeric suffix, so injected aliases cannot collide with aliases chosen by
/// callers.
#[derive(Debug)]
pub struct RandomAliases {
    rng: Mutex<StdRng>,
}

impl RandomAliases {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible suffixes.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomAliases {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasStrategy for RandomAliases {
    fn suffix(&self) -> Option<String> {
        let mut rng = self.rng.lock();
        Some(
            (0..SUFFIX_LENGTH)
                .map(|_| rng.sample(Alphanumeric) as char)
                .collect(),
        )
    }
}

/// Builds aliases for injected fields during one operation.
///
/// An alias is `{tag}__{field}`, followed by `__{suffix}` when the strategy supplies one. Tags
/// name the transform and the field that injected it, which keeps aliases unique among siblings
/// without the suffix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasAssigner {
    suffix: Option<String>,
}

impl AliasAssigner {
    pub fn new(strategy: &dyn AliasStrategy) -> Self {
        Self {
            suffix: strategy.suffix(),
        }
    }

    pub fn alias(&self, tag: &str, field_name: &str) -> String {
        match &self.suffix {
            Some(suffix) => format!("{tag}__{field_name}__{suffix}"),
            None => format!("{tag}__{field_name}"),
        }
    }

    /// `path` with its first segment replaced by `alias`.
    pub fn remap_root(path: &Path, alias: &str) -> Path {
        let mut remapped = path.clone();
        match remapped.0.first_mut() {
            Some(first) => *first = PathElement::Key(alias.to_string()),
            None => remapped.0.push(PathElement::Key(alias.to_string())),
        }
        remapped
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn deterministic_aliases() {
        let aliases = AliasAssigner::new(&DeterministicAliases);
        assert_eq!(aliases.alias("rename__bar", "baz"), "rename__bar__baz");
    }

    #[test]
    fn random_suffix_is_drawn_once_per_operation() {
        let strategy = RandomAliases::seeded(7);
        let first = AliasAssigner::new(&strategy);
        let second = AliasAssigner::new(&strategy);

        let a = first.alias("hydration__author", "authorId");
        assert!(a.starts_with("hydration__author__authorId__"));
        assert_eq!(a.len(), "hydration__author__authorId__".len() + SUFFIX_LENGTH);
        assert_eq!(a, first.alias("hydration__author", "authorId"));
        assert_ne!(a, second.alias("hydration__author", "authorId"));
    }

    #[test]
    fn generated_aliases_do_not_collide() {
        let strategy = RandomAliases::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let alias = AliasAssigner::new(&strategy).alias("hydration__author", "id");
            assert!(alias.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            assert!(seen.insert(alias));
        }

        let aliases = AliasAssigner::new(&strategy);
        let siblings: HashSet<String> = (0..100)
            .map(|field| aliases.alias(&format!("deep_rename__f{field}"), "id"))
            .collect();
        assert_eq!(siblings.len(), 100);
    }

    #[test]
    fn remap_root_replaces_first_segment() {
        let path = Path::from("author/id");
        assert_eq!(
            AliasAssigner::remap_root(&path, "hydration__a__author"),
            Path::from("hydration__a__author/id")
        );
        assert_eq!(
            AliasAssigner::remap_root(&Path::empty(), "x"),
            Path::from("x")
        );
    }
}
