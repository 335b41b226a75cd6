use std::sync::Arc;

use crate::kv_store::{load_list, remove_key, save_json, Durability, KvStore, Tracked};

const GUIDE_SUFFIX: &str = "-progress";

/// Storage key for a guide, e.g. `marw-progress`.
pub fn guide_key(guide_id: &str) -> String {
    format!("{guide_id}{GUIDE_SUFFIX}")
}

/// Completed steps of one step-by-step guide.
pub struct GuideProgress {
    store: Arc<dyn KvStore>,
    key: String,
}

impl GuideProgress {
    pub fn new(store: Arc<dyn KvStore>, guide_id: &str) -> Self {
        Self {
            store,
            key: guide_key(guide_id),
        }
    }

    pub fn completed_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = load_list(self.store.as_ref(), &self.key);
        let mut seen = std::collections::HashSet::new();
        steps.retain(|s| seen.insert(s.clone()));
        steps
    }

    pub fn is_complete(&self, step_id: &str) -> bool {
        self.completed_steps().iter().any(|s| s == step_id)
    }

    /// Returns `true` when the step is now complete.
    pub fn toggle_step(&self, step_id: &str) -> Tracked<bool> {
        let mut steps = self.completed_steps();
        let complete = if steps.iter().any(|s| s == step_id) {
            steps.retain(|s| s != step_id);
            false
        } else {
            steps.push(step_id.to_string());
            true
        };
        Tracked::new(complete, save_json(self.store.as_ref(), &self.key, &steps))
    }

    pub fn mark_complete(&self, step_id: &str) -> Durability {
        let mut steps = self.completed_steps();
        if steps.iter().any(|s| s == step_id) {
            return Durability::Persisted;
        }
        steps.push(step_id.to_string());
        save_json(self.store.as_ref(), &self.key, &steps)
    }

    /// Share of `total_steps` completed, within `[0, 1]`.
    pub fn completion_fraction(&self, total_steps: usize) -> f64 {
        if total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps().len() as f64 / total_steps as f64).clamp(0.0, 1.0)
    }

    pub fn reset(&self) -> Durability {
        remove_key(self.store.as_ref(), &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryKvStore;

    #[test]
    fn reads_steps_under_guide_named_key() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        store.set("marw-progress", r#"["intro","checklist"]"#).unwrap();

        let marw = GuideProgress::new(store.clone(), "marw");
        assert_eq!(marw.completed_steps(), vec!["intro", "checklist"]);

        GuideProgress::new(store.clone(), "case-report").toggle_step("title");
        assert_eq!(store.get("case-report-progress").as_deref(), Some(r#"["title"]"#));
    }

    #[test]
    fn guides_do_not_share_progress() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let marw = GuideProgress::new(store.clone(), "marw");
        let case_report = GuideProgress::new(store, "case-report");

        assert!(marw.toggle_step("step-1").value);
        assert!(marw.is_complete("step-1"));
        assert!(!case_report.is_complete("step-1"));
    }

    #[test]
    fn toggle_and_fraction() {
        let progress = GuideProgress::new(Arc::new(MemoryKvStore::new()), "marw");
        progress.mark_complete("s1");
        progress.mark_complete("s1");
        progress.mark_complete("s2");
        assert_eq!(progress.completed_steps(), vec!["s1", "s2"]);
        assert!((progress.completion_fraction(4) - 0.5).abs() < f64::EPSILON);
        assert_eq!(progress.completion_fraction(1), 1.0);
        assert_eq!(progress.completion_fraction(0), 0.0);

        assert!(!progress.toggle_step("s1").value);
        assert_eq!(progress.completed_steps(), vec!["s2"]);

        progress.reset();
        assert!(progress.completed_steps().is_empty());
    }
}
