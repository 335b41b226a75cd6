//! Thumbs up/down feedback on prompts, one submission per prompt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::kv_store::{load_list, load_opt, save_json, Durability, KvStore, Tracked};
use crate::lenient;

pub const ALL_FEEDBACK_KEY: &str = "all_feedback";
const FEEDBACK_PREFIX: &str = "feedback_";

pub fn feedback_key(subject_id: &str) -> String {
    format!("{FEEDBACK_PREFIX}{subject_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub subject_id: String,
    #[serde(rename = "type")]
    pub sentiment: Sentiment,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub comment: String,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Accepted(Tracked<FeedbackRecord>),
    /// A record already exists for the subject; nothing was written.
    AlreadyExists(FeedbackRecord),
    Rejected { reason: String },
}

impl FeedbackOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FeedbackOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackSummary {
    pub positive: usize,
    pub negative: usize,
}

impl FeedbackSummary {
    pub fn total(&self) -> usize {
        self.positive + self.negative
    }
}

pub struct FeedbackRecorder {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl FeedbackRecorder {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn get(&self, subject_id: &str) -> Option<FeedbackRecord> {
        load_opt(self.store.as_ref(), &feedback_key(subject_id))
    }

    /// Store feedback for `subject_id` unless some already exists.
    ///
    /// Accepted records are also appended to the aggregate log. An
    /// unreadable stored record does not block a new submission.
    pub fn record_once(
        &self,
        subject_id: &str,
        sentiment: Sentiment,
        comment: &str,
    ) -> FeedbackOutcome {
        if subject_id.is_empty() {
            return FeedbackOutcome::Rejected {
                reason: "subject id must not be empty".to_string(),
            };
        }
        if let Some(existing) = self.get(subject_id) {
            debug!(subject_id = %subject_id, "feedback already recorded");
            return FeedbackOutcome::AlreadyExists(existing);
        }

        let record = FeedbackRecord {
            subject_id: subject_id.to_string(),
            sentiment,
            comment: comment.to_string(),
            timestamp: self.clock.now(),
        };

        let own = save_json(self.store.as_ref(), &feedback_key(subject_id), &record);
        let mut all = self.read_all();
        all.push(record.clone());
        let aggregate = save_json(self.store.as_ref(), ALL_FEEDBACK_KEY, &all);

        info!(subject_id = %subject_id, sentiment = ?sentiment, "recorded feedback");
        let durability = match (own, aggregate) {
            (Durability::Persisted, Durability::Persisted) => Durability::Persisted,
            (Durability::SessionOnly { reason }, _) | (_, Durability::SessionOnly { reason }) => {
                Durability::SessionOnly { reason }
            }
        };
        FeedbackOutcome::Accepted(Tracked::new(record, durability))
    }

    /// Every accepted submission, oldest first.
    pub fn read_all(&self) -> Vec<FeedbackRecord> {
        load_list(self.store.as_ref(), ALL_FEEDBACK_KEY)
    }

    pub fn summary(&self) -> FeedbackSummary {
        self.read_all()
            .iter()
            .fold(FeedbackSummary::default(), |mut acc, r| {
                match r.sentiment {
                    Sentiment::Positive => acc.positive += 1,
                    Sentiment::Negative => acc.negative += 1,
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::kv_store::MemoryKvStore;

    fn recorder() -> (FeedbackRecorder, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        (FeedbackRecorder::new(store.clone(), Arc::new(SystemClock)), store)
    }

    #[test]
    fn second_submission_is_refused() {
        let (feedback, _) = recorder();
        assert!(feedback
            .record_once("prompt-42", Sentiment::Positive, "")
            .is_accepted());

        match feedback.record_once("prompt-42", Sentiment::Negative, "not useful") {
            FeedbackOutcome::AlreadyExists(existing) => {
                assert_eq!(existing.sentiment, Sentiment::Positive)
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }

        assert_eq!(feedback.get("prompt-42").unwrap().sentiment, Sentiment::Positive);
        assert_eq!(feedback.read_all().len(), 1);
    }

    #[test]
    fn aggregate_log_and_summary() {
        let (feedback, _) = recorder();
        feedback.record_once("a", Sentiment::Positive, "");
        feedback.record_once("b", Sentiment::Negative, "too vague");
        feedback.record_once("c", Sentiment::Positive, "");

        let all = feedback.read_all();
        assert_eq!(
            all.iter().map(|r| r.subject_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(all[1].comment, "too vague");

        let summary = feedback.summary();
        assert_eq!(summary.positive, 2);
        assert_eq!(summary.negative, 1);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn stored_record_uses_type_field() {
        let (feedback, store) = recorder();
        feedback.record_once("prompt-7", Sentiment::Negative, "");

        let raw = store.get("feedback_prompt-7").unwrap();
        assert!(raw.contains("\"type\":\"negative\""));
        assert!(raw.contains("\"subjectId\":\"prompt-7\""));
    }

    #[test]
    fn aggregate_log_survives_a_bad_entry() {
        let (feedback, store) = recorder();
        store
            .set(
                ALL_FEEDBACK_KEY,
                r#"[
                    {"subjectId":"old","type":"positive","comment":null,"timestamp":"2024-11-05T14:00:00"},
                    {"subjectId":"weird","type":"meh","timestamp":"2024-11-05T14:01:00Z"}
                ]"#,
            )
            .unwrap();

        feedback.record_once("new", Sentiment::Negative, "");

        let subjects: Vec<String> = feedback.read_all().into_iter().map(|r| r.subject_id).collect();
        assert_eq!(subjects, vec!["old", "new"]);
        assert_eq!(feedback.summary().total(), 2);
    }

    #[test]
    fn empty_subject_is_rejected() {
        let (feedback, store) = recorder();
        assert!(matches!(
            feedback.record_once("", Sentiment::Positive, ""),
            FeedbackOutcome::Rejected { .. }
        ));
        assert!(store.is_empty());
    }
}
