//! Experience points, levels and learning streaks.
//!
//! Levels come from an ascending threshold table. Level `n` starts at
//! `thresholds[n - 1]` and the last level is open-ended. The default table
//! is `0 / 100 / 300 / 600 / 1000`, giving five levels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::errors::{StoreError, StoreResult};
use crate::kv_store::{load_or_default, save_json, KvStore, Tracked};
use crate::lenient;

pub const GAMIFICATION_KEY: &str = "gamification_state";
pub const DEFAULT_THRESHOLDS: [u64; 5] = [0, 100, 300, 600, 1000];
/// Minimum quiz score, in percent, that earns the pass bonus.
pub const QUIZ_PASS_PERCENT: f64 = 80.0;

const LEVEL_NAMES: [&str; 5] = ["Beginner", "Novice", "Intermediate", "Advanced", "Expert"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    thresholds: Vec<u64>,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
        }
    }
}

impl LevelTable {
    /// Thresholds must start at 0 and be strictly ascending.
    pub fn new(thresholds: Vec<u64>) -> StoreResult<Self> {
        match thresholds.first() {
            None => {
                return Err(StoreError::config("level thresholds must not be empty"));
            }
            Some(&first) if first != 0 => {
                return Err(StoreError::config("first level threshold must be 0"));
            }
            _ => {}
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StoreError::config(
                "level thresholds must be strictly ascending",
            ));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    pub fn max_level(&self) -> u32 {
        self.thresholds.len() as u32
    }

    /// Level whose range contains `total_xp`. Never below 1.
    pub fn level_for_xp(&self, total_xp: u64) -> u32 {
        let reached = self.thresholds.partition_point(|&t| t <= total_xp);
        reached.max(1) as u32
    }

    pub fn progress_for_xp(&self, total_xp: u64) -> XpProgress {
        let current_level = self.level_for_xp(total_xp);
        let start = self
            .thresholds
            .get(current_level as usize - 1)
            .copied()
            .unwrap_or(0);
        let next = self.thresholds.get(current_level as usize).copied();
        let current_level_xp = total_xp.saturating_sub(start);

        let (progress_fraction, remaining_xp) = match next {
            None => (1.0, 0),
            Some(next) => {
                let span = next.saturating_sub(start);
                let fraction = if span == 0 {
                    1.0
                } else {
                    current_level_xp as f64 / span as f64
                };
                (fraction.clamp(0.0, 1.0), next.saturating_sub(total_xp))
            }
        };

        XpProgress {
            current_level,
            current_level_xp,
            next_level_threshold: next,
            progress_fraction,
            remaining_xp,
        }
    }
}

/// Position of an XP total within its level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpProgress {
    pub current_level: u32,
    /// XP earned since the current level began.
    pub current_level_xp: u64,
    /// XP total at which the next level begins; `None` at the top level.
    pub next_level_threshold: Option<u64>,
    pub progress_fraction: f64,
    pub remaining_xp: u64,
}

impl XpProgress {
    pub fn is_max_level(&self) -> bool {
        self.next_level_threshold.is_none()
    }

    pub fn percent(&self) -> u32 {
        (self.progress_fraction * 100.0).round() as u32
    }
}

pub fn level_for_xp(total_xp: u64) -> u32 {
    LevelTable::default().level_for_xp(total_xp)
}

pub fn progress_for_xp(total_xp: u64) -> XpProgress {
    LevelTable::default().progress_for_xp(total_xp)
}

/// Display name for a level; levels past the named ones reuse the last.
pub fn level_name(level: u32) -> &'static str {
    let index = (level.max(1) as usize - 1).min(LEVEL_NAMES.len() - 1);
    LEVEL_NAMES[index]
}

/// Learning actions that earn XP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpAward {
    LessonCompleted,
    ExerciseCompleted,
    QuizPassBonus,
}

impl XpAward {
    pub fn points(self) -> u64 {
        match self {
            XpAward::LessonCompleted => 10,
            XpAward::ExerciseCompleted => 3,
            XpAward::QuizPassBonus => 5,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            XpAward::LessonCompleted => "lesson_completed",
            XpAward::ExerciseCompleted => "exercise_completed",
            XpAward::QuizPassBonus => "quiz_pass_bonus",
        }
    }
}

/// A quiz passes at a rounded score of 80% or more.
pub fn quiz_passed(score: u32, total_points: u32) -> bool {
    if total_points == 0 {
        return false;
    }
    let percent = (f64::from(score) / f64::from(total_points) * 100.0).round();
    percent >= QUIZ_PASS_PERCENT
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GamificationState {
    #[serde(rename = "totalXP", deserialize_with = "lenient::counter")]
    pub total_xp: u64,
    #[serde(deserialize_with = "lenient::counter")]
    pub lessons_completed: u32,
    #[serde(deserialize_with = "lenient::counter")]
    pub exercises_completed: u32,
    #[serde(deserialize_with = "lenient::counter")]
    pub quizzes_passed: u32,
    #[serde(deserialize_with = "lenient::counter")]
    pub current_streak: u32,
    #[serde(deserialize_with = "lenient::counter")]
    pub longest_streak: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub last_study_date: Option<NaiveDate>,
}

impl GamificationState {
    /// Count `today` as a study day for the streak.
    ///
    /// The same day leaves the streak alone. The next calendar day extends
    /// it, and any gap restarts it at 1. Dates before the last study day are
    /// ignored.
    fn mark_study_day(&mut self, today: NaiveDate) {
        match self.last_study_date {
            Some(last) if last >= today => return,
            Some(last) if last.succ_opt() == Some(today) => {
                self.current_streak = self.current_streak.saturating_add(1);
            }
            _ => self.current_streak = 1,
        }
        self.last_study_date = Some(today);
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }
}

pub struct GamificationTracker {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    table: LevelTable,
}

impl GamificationTracker {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, table: LevelTable) -> Self {
        Self {
            store,
            clock,
            table,
        }
    }

    pub fn table(&self) -> &LevelTable {
        &self.table
    }

    pub fn state(&self) -> GamificationState {
        load_or_default(self.store.as_ref(), GAMIFICATION_KEY)
    }

    pub fn total_xp(&self) -> u64 {
        self.state().total_xp
    }

    pub fn level(&self) -> u32 {
        self.table.level_for_xp(self.total_xp())
    }

    pub fn progress(&self) -> XpProgress {
        self.table.progress_for_xp(self.total_xp())
    }

    /// Rounded average XP per completed lesson, 0 before the first lesson.
    pub fn average_xp_per_lesson(&self) -> u64 {
        let state = self.state();
        if state.lessons_completed == 0 {
            return 0;
        }
        let lessons = u64::from(state.lessons_completed);
        (state.total_xp + lessons / 2) / lessons
    }

    /// Add `amount` XP and return the new total.
    ///
    /// A zero amount changes nothing and returns the current total.
    pub fn award_xp(&self, amount: u64, reason: &str) -> Tracked<u64> {
        self.apply(amount, reason, |_| {})
    }

    /// Award the points for a learning action and count the action.
    pub fn award(&self, award: XpAward) -> Tracked<u64> {
        self.apply(award.points(), award.reason(), |state| match award {
            XpAward::LessonCompleted => {
                state.lessons_completed = state.lessons_completed.saturating_add(1)
            }
            XpAward::ExerciseCompleted => {
                state.exercises_completed = state.exercises_completed.saturating_add(1)
            }
            XpAward::QuizPassBonus => {
                state.quizzes_passed = state.quizzes_passed.saturating_add(1)
            }
        })
    }

    /// Grant the pass bonus when the quiz passed; otherwise a no-op.
    pub fn record_quiz(&self, score: u32, total_points: u32) -> Tracked<u64> {
        if quiz_passed(score, total_points) {
            self.award(XpAward::QuizPassBonus)
        } else {
            debug!(score, total_points, "quiz below pass mark, no bonus");
            Tracked::persisted(self.total_xp())
        }
    }

    fn apply(
        &self,
        amount: u64,
        reason: &str,
        bump: impl FnOnce(&mut GamificationState),
    ) -> Tracked<u64> {
        if amount == 0 {
            debug!(reason = %reason, "ignoring zero XP award");
            return Tracked::persisted(self.total_xp());
        }

        let mut state = self.state();
        let previous_level = self.table.level_for_xp(state.total_xp);
        state.total_xp = state.total_xp.saturating_add(amount);
        bump(&mut state);
        state.mark_study_day(self.clock.now().date_naive());

        let level = self.table.level_for_xp(state.total_xp);
        info!(amount, reason = %reason, total_xp = state.total_xp, level, "awarded XP");
        if level > previous_level {
            info!(level, name = level_name(level), "level up");
        }

        let durability = save_json(self.store.as_ref(), GAMIFICATION_KEY, &state);
        Tracked::new(state.total_xp, durability)
    }
}
