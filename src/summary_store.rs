use crate::method_config::MethodConfig;
use crate::taint_config::{is_subtype_of_any, TypeHierarchy};
use log::debug;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Key under which a method's config is stored: `owner.name(descriptor)`
pub fn method_key(class: &str, method_id: &str) -> String {
    format!("{}{}", class, method_id)
}

/// Process-wide cache of method configs, both human-authored and derived.
///
/// Reads may happen concurrently from any number of workers. Writes are
/// serialized, and a derived config never replaces an existing entry; only
/// `put_configured` can replace one.
#[derive(Default)]
pub struct SummaryStore {
    configs: RwLock<HashMap<String, MethodConfig>>,
}

/// What happened to a derived config offered to the store
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CommitOutcome {
    Inserted,
    /// A configured entry exists for the key
    KeptConfigured,
    /// A derived entry exists for the key
    KeptDerived,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with configured entries
    pub fn with_configured(configs: impl IntoIterator<Item = (String, MethodConfig)>) -> Self {
        let store = Self::new();
        for (key, config) in configs {
            store.put_configured(key, config);
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<MethodConfig> {
        self.configs.read().get(key).cloned()
    }

    pub fn lookup(&self, class: &str, method_id: &str) -> Option<MethodConfig> {
        self.get(&method_key(class, method_id))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.configs.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }

    /// Store a human-authored config, replacing whatever was there
    pub fn put_configured(&self, key: impl Into<String>, config: MethodConfig) {
        let key = key.into();
        debug!("Storing configured summary for {:?}", key);
        self.configs.write().insert(key, config);
    }

    /// Store a derived config, unless the key already has an entry
    pub fn commit_derived(&self, key: impl Into<String>, config: MethodConfig) -> CommitOutcome {
        match self.configs.write().entry(key.into()) {
            Entry::Occupied(oentry) => {
                if oentry.get().is_configured() {
                    CommitOutcome::KeptConfigured
                } else {
                    CommitOutcome::KeptDerived
                }
            },
            Entry::Vacant(ventry) => {
                debug!("Committing derived summary for {:?}", ventry.key());
                ventry.insert(config);
                CommitOutcome::Inserted
            },
        }
    }

    /// A config stored for `method_id` on some proper supertype of `class`
    pub fn super_method_config<H: TypeHierarchy + ?Sized>(
        &self,
        hierarchy: &H,
        class: &str,
        method_id: &str,
    ) -> Option<MethodConfig> {
        // collect candidates first so the hierarchy isn't queried under the lock
        let candidates: Vec<(String, MethodConfig)> = self
            .configs
            .read()
            .iter()
            .filter_map(|(key, config)| {
                let owner = key.strip_suffix(method_id)?;
                if owner == class || owner.contains('.') {
                    None
                } else {
                    Some((owner.to_owned(), config.clone()))
                }
            })
            .collect();
        candidates
            .into_iter()
            .find(|(owner, _)| is_subtype_of_any(hierarchy, class, &[owner.as_str()]))
            .map(|(_, config)| config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taint::Taint;
    use crate::taint_config::StaticTaintConfig;

    #[test]
    fn derived_never_overwrites() {
        let store = SummaryStore::new();
        store.put_configured("a/B.m()Ljava/lang/String;", MethodConfig::configured(Taint::tainted()));
        assert_eq!(
            store.commit_derived("a/B.m()Ljava/lang/String;", MethodConfig::safe()),
            CommitOutcome::KeptConfigured
        );
        assert_eq!(
            store.commit_derived("a/B.n()Ljava/lang/String;", MethodConfig::safe()),
            CommitOutcome::Inserted
        );
        assert_eq!(
            store.commit_derived("a/B.n()Ljava/lang/String;", MethodConfig::derived(Taint::tainted())),
            CommitOutcome::KeptDerived
        );
        let kept = store.get("a/B.m()Ljava/lang/String;").unwrap();
        assert!(kept.is_configured());
        assert!(kept.output_taint().unwrap().is_tainted());
        assert!(store.get("a/B.n()Ljava/lang/String;").unwrap().output_taint().unwrap().is_safe());
    }

    #[test]
    fn finds_super_method_config() {
        let hierarchy = StaticTaintConfig::new().with_supertype("a/Child", "a/Base");
        let store = SummaryStore::new();
        store.put_configured(method_key("a/Base", ".get()Ljava/lang/String;"), MethodConfig::configured(Taint::tainted()));
        assert!(store.super_method_config(&hierarchy, "a/Child", ".get()Ljava/lang/String;").is_some());
        assert!(store.super_method_config(&hierarchy, "a/Base", ".get()Ljava/lang/String;").is_none());
        assert!(store.super_method_config(&hierarchy, "a/Child", ".other()Ljava/lang/String;").is_none());
        // unknown classes count as unrelated
        assert!(store.super_method_config(&hierarchy, "a/Missing", ".get()Ljava/lang/String;").is_none());
    }

    #[test]
    fn missing_types_are_reported_once() {
        let hierarchy = StaticTaintConfig::new().with_supertype("a/Child", "a/Base");
        let store = SummaryStore::new();
        store.put_configured(method_key("a/Base", ".get()Ljava/lang/String;"), MethodConfig::configured(Taint::tainted()));
        assert!(store.super_method_config(&hierarchy, "a/Missing", ".get()Ljava/lang/String;").is_none());
        assert!(!hierarchy.is_subtype_of_any("a/Missing", &["a/Base"]));
        assert!(store.super_method_config(&hierarchy, "a/Missing", ".get()Ljava/lang/String;").is_none());
        // store and config share the hierarchy's record
        assert_eq!(hierarchy.reported_missing(), vec!["a/Missing".to_owned()]);
    }
}
