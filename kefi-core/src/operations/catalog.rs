use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info};

use super::{Category, OperationDescriptor, OperationKind, has_multiple_lines, local};
use crate::network::RemoteOperationInfo;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, OperationDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `descriptor`, replacing any entry with the same id. A replacement
    /// is a configuration error and is logged as such; the previous entry is
    /// returned.
    pub fn register(&mut self, descriptor: OperationDescriptor) -> Option<OperationDescriptor> {
        let id = descriptor.id().to_string();
        let replaced = self.entries.insert(id.clone(), descriptor);
        if replaced.is_some() {
            error!(
                operation = id.as_str(),
                "duplicate operation id registered; last registration wins"
            );
        }
        replaced
    }

    pub fn get(&self, id: &str) -> Option<&OperationDescriptor> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.entries.values()
    }

    pub fn get_available(&self, text: &str) -> Vec<&OperationDescriptor> {
        self.entries
            .values()
            .filter(|descriptor| descriptor.is_available(text))
            .collect()
    }

    pub fn get_by_category(&self, category: Category) -> Vec<&OperationDescriptor> {
        self.entries
            .values()
            .filter(|descriptor| descriptor.category() == category)
            .collect()
    }

    pub fn get_categories(&self) -> Vec<Category> {
        let present: BTreeSet<Category> = self
            .entries
            .values()
            .map(OperationDescriptor::category)
            .collect();
        present.into_iter().collect()
    }

    /// Returns a copy in which every backend operation the server reports as
    /// unavailable is demoted to [`OperationKind::Disabled`].
    pub fn with_backend_policy(&self, remote: &[RemoteOperationInfo]) -> Catalog {
        let mut catalog = self.clone();
        for info in remote.iter().filter(|info| !info.available) {
            let Some(existing) = catalog.entries.get(&info.id) else {
                continue;
            };
            if !existing.is_async() {
                continue;
            }
            let reason = if info.requires_llm {
                "backend has no language model configured"
            } else {
                "backend reports the operation as unavailable"
            };
            let disabled = OperationDescriptor::new(
                existing.id(),
                existing.label(),
                existing.category(),
                OperationKind::Disabled {
                    reason: reason.to_string(),
                },
            );
            info!(operation = info.id.as_str(), reason, "operation disabled by backend policy");
            catalog.entries.insert(info.id.clone(), disabled);
        }
        catalog
    }
}

pub fn build_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    let descriptors = [
        OperationDescriptor::new(
            "uppercase",
            "UPPERCASE",
            Category::Format,
            OperationKind::Local(local::uppercase),
        ),
        OperationDescriptor::new(
            "lowercase",
            "lowercase",
            Category::Format,
            OperationKind::Local(local::lowercase),
        ),
        OperationDescriptor::new(
            "title-case",
            "Title Case",
            Category::Format,
            OperationKind::Local(local::title_case),
        ),
        OperationDescriptor::new(
            "sentence-case",
            "Sentence case",
            Category::Format,
            OperationKind::Local(local::sentence_case),
        ),
        OperationDescriptor::new(
            "normalize-whitespace",
            "Normalize whitespace",
            Category::Transform,
            OperationKind::Local(local::normalize_whitespace),
        ),
        OperationDescriptor::new(
            "clean-transcription",
            "Clean up transcription",
            Category::Transform,
            OperationKind::BackendSimple,
        ),
        OperationDescriptor::new(
            "reorder-list",
            "Reorder list",
            Category::Transform,
            OperationKind::BackendSimple,
        )
        .with_predicate(has_multiple_lines),
        OperationDescriptor::new(
            "custom-prompt",
            "Ask AI...",
            Category::Ai,
            OperationKind::BackendPrompted,
        ),
        OperationDescriptor::new(
            "summarize",
            "Summarize",
            Category::Ai,
            OperationKind::Disabled {
                reason: "summarization is not enabled yet".to_string(),
            },
        ),
    ];

    for descriptor in descriptors {
        catalog.register(descriptor);
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(descriptors: &[&OperationDescriptor]) -> Vec<String> {
        descriptors
            .iter()
            .map(|descriptor| descriptor.id().to_string())
            .collect()
    }

    fn explode(_text: &str) -> bool {
        panic!("predicate exploded")
    }

    #[test]
    fn default_catalog_contains_every_kind() {
        let catalog = build_catalog();
        assert_eq!(catalog.len(), 9);
        assert!(matches!(
            catalog.get("uppercase").map(OperationDescriptor::kind),
            Some(OperationKind::Local(_))
        ));
        assert!(catalog.get("custom-prompt").is_some_and(|op| op.requires_prompt()));
        assert!(catalog.get("summarize").is_some_and(|op| op.is_disabled()));
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn available_is_exactly_the_predicate_subset_in_id_order() {
        let catalog = build_catalog();
        let single_line = catalog.get_available("hello world");
        assert_eq!(
            ids(&single_line),
            vec![
                "clean-transcription",
                "custom-prompt",
                "lowercase",
                "normalize-whitespace",
                "sentence-case",
                "title-case",
                "uppercase",
            ]
        );

        let list = catalog.get_available("- pears\n- apples");
        assert!(ids(&list).contains(&"reorder-list".to_string()));
        assert!(!ids(&list).contains(&"summarize".to_string()));

    }

    #[test]
    fn whitespace_only_selection_offers_local_operations() {
        let catalog = build_catalog();
        let available = ids(&catalog.get_available("   \t  "));
        assert!(available.contains(&"normalize-whitespace".to_string()));
        assert!(available.contains(&"uppercase".to_string()));
        assert!(!available.contains(&"clean-transcription".to_string()));
        assert!(!available.contains(&"custom-prompt".to_string()));
        assert!(catalog.get_available("").is_empty());
    }

    #[test]
    fn available_matches_predicates_for_assorted_texts() {
        let catalog = build_catalog();
        for text in ["", "x", "a\nb", "  padded  ", "1. one\n2. two\n3. three"] {
            let expected: Vec<String> = catalog
                .iter()
                .filter(|descriptor| descriptor.is_available(text))
                .map(|descriptor| descriptor.id().to_string())
                .collect();
            assert_eq!(ids(&catalog.get_available(text)), expected, "text={text:?}");
        }
    }

    #[test]
    fn throwing_predicate_is_filtered_out() {
        let mut catalog = build_catalog();
        catalog.register(
            OperationDescriptor::new(
                "explode",
                "Explode",
                Category::Format,
                OperationKind::BackendSimple,
            )
            .with_predicate(explode),
        );
        let available = catalog.get_available("text");
        assert!(!ids(&available).contains(&"explode".to_string()));
        assert!(ids(&available).contains(&"uppercase".to_string()));
    }

    #[test]
    fn duplicate_registration_replaces_and_returns_previous() {
        let mut catalog = Catalog::new();
        let first = catalog.register(OperationDescriptor::new(
            "dup",
            "First",
            Category::Format,
            OperationKind::BackendSimple,
        ));
        let second = catalog.register(OperationDescriptor::new(
            "dup",
            "Second",
            Category::Transform,
            OperationKind::BackendSimple,
        ));
        assert!(first.is_none());
        assert_eq!(second.map(|op| op.label().to_string()), Some("First".to_string()));
        assert_eq!(catalog.get("dup").map(OperationDescriptor::label), Some("Second"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn grouping_by_category() {
        let catalog = build_catalog();
        assert_eq!(
            catalog.get_categories(),
            vec![Category::Format, Category::Transform, Category::Ai]
        );
        assert_eq!(
            ids(&catalog.get_by_category(Category::Ai)),
            vec!["custom-prompt", "summarize"]
        );

        let mut format_only = Catalog::new();
        format_only.register(OperationDescriptor::new(
            "uppercase",
            "UPPERCASE",
            Category::Format,
            OperationKind::Local(local::uppercase),
        ));
        assert_eq!(format_only.get_categories(), vec![Category::Format]);
    }

    #[test]
    fn backend_policy_disables_only_reported_backend_operations() {
        let catalog = build_catalog();
        let remote = vec![
            RemoteOperationInfo {
                id: "custom-prompt".to_string(),
                requires_llm: true,
                available: false,
            },
            RemoteOperationInfo {
                id: "clean-transcription".to_string(),
                requires_llm: false,
                available: true,
            },
            RemoteOperationInfo {
                id: "uppercase".to_string(),
                requires_llm: false,
                available: false,
            },
        ];

        let adjusted = catalog.with_backend_policy(&remote);
        assert!(adjusted.get("custom-prompt").is_some_and(|op| op.is_disabled()));
        assert!(adjusted.get("clean-transcription").is_some_and(|op| !op.is_disabled()));
        assert!(adjusted.get("uppercase").is_some_and(|op| !op.is_disabled()));
        assert!(catalog.get("custom-prompt").is_some_and(|op| !op.is_disabled()));
    }
}
