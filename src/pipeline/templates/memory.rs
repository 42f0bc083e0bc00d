use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::eviction::{EntryStats, EvictionPolicy, Unbounded};
use super::types::ExtractionTemplate;
use super::{StoreError, TemplateStore};

struct Slot {
    template: ExtractionTemplate,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    aliases: HashMap<String, String>,
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Process-local template store. One mutex guards all keys, which gives
/// per-key linearizability for free.
pub struct InMemoryTemplateStore {
    inner: Mutex<Inner>,
    policy: Box<dyn EvictionPolicy>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::with_policy(Box::new(Unbounded))
    }

    pub fn with_policy(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ExtractionTemplate>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.slots.get(fingerprint).map(|s| s.template.clone()))
    }

    fn put(&self, fingerprint: &str, template: ExtractionTemplate) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let last_used = inner.next_tick();
        inner.slots.insert(
            fingerprint.to_string(),
            Slot {
                template,
                last_used,
            },
        );

        let stats: Vec<EntryStats> = inner
            .slots
            .iter()
            .map(|(fp, slot)| EntryStats {
                fingerprint: fp.clone(),
                last_used: slot.last_used,
                hit_count: slot.template.hit_count,
            })
            .collect();
        for victim in self.policy.select_victims(&stats) {
            inner.slots.remove(&victim);
            inner.aliases.retain(|_, target| *target != victim);
            tracing::debug!(fingerprint = %victim, "Evicted template");
        }
        Ok(())
    }

    fn record_hit(&self, fingerprint: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let tick = inner.next_tick();
        if let Some(slot) = inner.slots.get_mut(fingerprint) {
            slot.template.hit_count += 1;
            slot.last_used = tick;
        }
        Ok(())
    }

    fn link_alias(&self, alias: &str, fingerprint: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .aliases
            .insert(alias.to_string(), fingerprint.to_string());
        Ok(())
    }

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.aliases.get(alias).cloned())
    }

    fn remove(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        inner.aliases.retain(|_, target| target.as_str() != fingerprint);
        Ok(inner.slots.remove(fingerprint).is_some())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.slots.len())
    }

    fn entries(&self) -> Result<Vec<ExtractionTemplate>, StoreError> {
        let inner = self.lock()?;
        let mut all: Vec<ExtractionTemplate> =
            inner.slots.values().map(|s| s.template.clone()).collect();
        all.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(all)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.slots.clear();
        inner.aliases.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::templates::eviction::LruCapacity;
    use crate::pipeline::templates::types::sample_template;
    use std::sync::Arc;

    #[test]
    fn put_then_lookup() {
        let store = InMemoryTemplateStore::new();
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        assert!(store.lookup(&fp).unwrap().is_none());
        store.put(&fp, t.clone()).unwrap();
        assert_eq!(store.lookup(&fp).unwrap(), Some(t));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn put_replaces_existing_entry() {
        let store = InMemoryTemplateStore::new();
        let first = sample_template("State College", &["Course"]);
        let fp = first.fingerprint.clone();
        let mut second = first.clone();
        second.rendered_prompt_body = "replacement".into();

        store.put(&fp, first).unwrap();
        store.put(&fp, second).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.lookup(&fp).unwrap().unwrap().rendered_prompt_body, "replacement");
    }

    #[test]
    fn record_hit_increments_count() {
        let store = InMemoryTemplateStore::new();
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        store.put(&fp, t).unwrap();
        store.record_hit(&fp).unwrap();
        store.record_hit(&fp).unwrap();
        store.record_hit("missing").unwrap();
        assert_eq!(store.lookup(&fp).unwrap().unwrap().hit_count, 2);
    }

    #[test]
    fn aliases_resolve_and_follow_removal() {
        let store = InMemoryTemplateStore::new();
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        store.put(&fp, t).unwrap();
        store.link_alias("state college:p:abc", &fp).unwrap();
        assert_eq!(store.resolve_alias("state college:p:abc").unwrap(), Some(fp.clone()));

        assert!(store.remove(&fp).unwrap());
        assert!(!store.remove(&fp).unwrap());
        assert!(store.resolve_alias("state college:p:abc").unwrap().is_none());
    }

    #[test]
    fn lru_policy_bounds_store() {
        let store = InMemoryTemplateStore::with_policy(Box::new(LruCapacity::new(2)));
        let a = sample_template("A", &[]);
        let b = sample_template("B", &[]);
        let c = sample_template("C", &[]);
        store.put(&a.fingerprint, a.clone()).unwrap();
        store.put(&b.fingerprint, b.clone()).unwrap();
        store.record_hit(&a.fingerprint).unwrap();
        store.put(&c.fingerprint, c.clone()).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.lookup(&a.fingerprint).unwrap().is_some());
        assert!(store.lookup(&b.fingerprint).unwrap().is_none());
        assert!(store.lookup(&c.fingerprint).unwrap().is_some());
    }

    #[test]
    fn entries_sorted_and_clear_empties() {
        let store = InMemoryTemplateStore::new();
        for name in ["Zeta", "Alpha", "Mid"] {
            let t = sample_template(name, &[]);
            store.put(&t.fingerprint.clone(), t).unwrap();
        }
        let fps: Vec<String> = store.entries().unwrap().into_iter().map(|t| t.fingerprint).collect();
        let mut sorted = fps.clone();
        sorted.sort();
        assert_eq!(fps, sorted);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn concurrent_puts_and_lookups() {
        let store = Arc::new(InMemoryTemplateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let t = sample_template(&format!("University {}", i % 4), &["Course"]);
                    let fp = t.fingerprint.clone();
                    store.put(&fp, t).unwrap();
                    assert!(store.lookup(&fp).unwrap().is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 4);
    }
}
