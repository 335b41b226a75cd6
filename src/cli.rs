use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;

use crate::consent::ConsentPreferences;
use crate::favorites_export::{export_favorites, export_file_name, ExportFormat, PromptSummary};
use crate::feedback::{FeedbackOutcome, Sentiment};
use crate::gamification::{level_name, XpAward};
use crate::hub::StateHub;
use crate::kv_store::Durability;

/// Inspect and edit the prompt hub's local state
#[derive(Parser)]
#[command(name = "medprompt", version, about = "Prompt hub local state tool")]
pub struct Cli {
    /// Configuration file (defaults to ./medprompt.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a throwaway in-memory store
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prompt usage counts
    #[command(subcommand)]
    Usage(UsageCommand),

    /// Favorite prompts
    #[command(subcommand)]
    Favorite(FavoriteCommand),

    /// Experience points and level
    #[command(subcommand)]
    Xp(XpCommand),

    /// Cookie consent
    #[command(subcommand)]
    Consent(ConsentCommand),

    /// Prompt feedback
    #[command(subcommand)]
    Feedback(FeedbackCommand),

    /// Search history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Step-by-step guide progress
    #[command(subcommand)]
    Guide(GuideCommand),

    /// Highlight query terms in a text
    Highlight { text: String, query: String },
}

#[derive(Subcommand)]
pub enum UsageCommand {
    Record { item_id: String },
    Top {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    Count { item_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Markdown,
    Text,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => ExportFormat::Markdown,
            FormatArg::Text => ExportFormat::Text,
        }
    }
}

#[derive(Subcommand)]
pub enum FavoriteCommand {
    Toggle { item_id: String },
    List,
    /// Export favorites using a JSON prompt catalog
    Export {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, value_enum, default_value = "markdown")]
        format: FormatArg,
        /// Directory to write into; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum XpCommand {
    Award {
        amount: u64,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    Lesson,
    Exercise,
    Quiz { score: u32, total: u32 },
    Show,
}

#[derive(Subcommand)]
pub enum ConsentCommand {
    Show,
    Accept {
        #[arg(long)]
        analytics: bool,
        #[arg(long)]
        marketing: bool,
    },
    Revoke,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SentimentArg {
    Positive,
    Negative,
}

impl From<SentimentArg> for Sentiment {
    fn from(arg: SentimentArg) -> Self {
        match arg {
            SentimentArg::Positive => Sentiment::Positive,
            SentimentArg::Negative => Sentiment::Negative,
        }
    }
}

#[derive(Subcommand)]
pub enum FeedbackCommand {
    Submit {
        subject_id: String,
        #[arg(value_enum)]
        sentiment: SentimentArg,
        #[arg(long, default_value = "")]
        comment: String,
    },
    List,
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    Add { query: String },
    List,
    Remove { query: String },
    Clear,
}

#[derive(Subcommand)]
pub enum GuideCommand {
    Toggle { guide_id: String, step_id: String },
    Show {
        guide_id: String,
        /// Number of steps in the guide, for a completion percentage
        #[arg(long)]
        total: Option<usize>,
    },
}

fn note(out: &mut dyn Write, durability: &Durability) -> anyhow::Result<()> {
    if let Durability::SessionOnly { reason } = durability {
        writeln!(out, "(not saved: {reason})")?;
    }
    Ok(())
}

pub fn dispatch(command: Commands, hub: &StateHub, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Commands::Usage(cmd) => {
            let usage = hub.usage();
            match cmd {
                UsageCommand::Record { item_id } => {
                    let result = usage.record_use(&item_id);
                    writeln!(out, "{item_id}: {}", result.value)?;
                    note(out, &result.durability)?;
                }
                UsageCommand::Top { limit } => {
                    for (rank, record) in usage.top_used(limit).iter().enumerate() {
                        writeln!(
                            out,
                            "{:>2}. {} ({} uses, last {})",
                            rank + 1,
                            record.item_id,
                            record.count,
                            record.last_used.format("%Y-%m-%d %H:%M")
                        )?;
                    }
                }
                UsageCommand::Count { item_id } => {
                    writeln!(out, "{}", usage.count(&item_id))?;
                }
            }
        }

        Commands::Favorite(cmd) => {
            let favorites = hub.favorites();
            match cmd {
                FavoriteCommand::Toggle { item_id } => {
                    let result = favorites.toggle(&item_id);
                    let state = if result.value { "added" } else { "removed" };
                    writeln!(out, "{item_id}: {state}")?;
                    note(out, &result.durability)?;
                }
                FavoriteCommand::List => {
                    for id in favorites.list_all() {
                        writeln!(out, "{id}")?;
                    }
                }
                FavoriteCommand::Export {
                    catalog,
                    format,
                    output,
                } => {
                    let raw = std::fs::read_to_string(&catalog)
                        .with_context(|| format!("reading catalog {}", catalog.display()))?;
                    let prompts: Vec<PromptSummary> = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing catalog {}", catalog.display()))?;
                    let format = ExportFormat::from(format);
                    let now = hub.clock().now();

                    let Some(rendered) =
                        export_favorites(&favorites.list_all(), &prompts, format, now)
                    else {
                        writeln!(out, "no favorites to export")?;
                        return Ok(());
                    };
                    match output {
                        Some(dir) => {
                            let path = dir.join(export_file_name(format, now));
                            std::fs::write(&path, rendered)
                                .with_context(|| format!("writing {}", path.display()))?;
                            writeln!(out, "exported to {}", path.display())?;
                        }
                        None => write!(out, "{rendered}")?,
                    }
                }
            }
        }

        Commands::Xp(cmd) => {
            let xp = hub.gamification();
            let result = match cmd {
                XpCommand::Award { amount, reason } => Some(xp.award_xp(amount, &reason)),
                XpCommand::Lesson => Some(xp.award(XpAward::LessonCompleted)),
                XpCommand::Exercise => Some(xp.award(XpAward::ExerciseCompleted)),
                XpCommand::Quiz { score, total } => Some(xp.record_quiz(score, total)),
                XpCommand::Show => None,
            };
            if let Some(result) = &result {
                note(out, &result.durability)?;
            }

            let state = xp.state();
            let progress = xp.progress();
            writeln!(
                out,
                "level {} ({}) - {} XP",
                progress.current_level,
                level_name(progress.current_level),
                state.total_xp
            )?;
            match progress.next_level_threshold {
                Some(next) => writeln!(
                    out,
                    "{}% to level {} ({} XP at {next})",
                    progress.percent(),
                    progress.current_level + 1,
                    progress.remaining_xp
                )?,
                None => writeln!(out, "max level")?,
            }
            writeln!(
                out,
                "lessons {} | exercises {} | quizzes passed {} | streak {} (best {})",
                state.lessons_completed,
                state.exercises_completed,
                state.quizzes_passed,
                state.current_streak,
                state.longest_streak
            )?;
        }

        Commands::Consent(cmd) => {
            let consent = hub.consent();
            match cmd {
                ConsentCommand::Show => match consent.read() {
                    Some(status) => writeln!(
                        out,
                        "version {}: necessary={} analytics={} marketing={} ({})",
                        status.version,
                        status.preferences.necessary,
                        status.preferences.analytics,
                        status.preferences.marketing,
                        status.timestamp.to_rfc3339()
                    )?,
                    None => writeln!(
                        out,
                        "consent required (version {})",
                        consent.expected_version()
                    )?,
                },
                ConsentCommand::Accept {
                    analytics,
                    marketing,
                } => {
                    let result = consent.save(ConsentPreferences {
                        necessary: true,
                        analytics,
                        marketing,
                    });
                    writeln!(out, "consent saved (version {})", result.value.version)?;
                    note(out, &result.durability)?;
                }
                ConsentCommand::Revoke => {
                    let durability = consent.revoke();
                    writeln!(out, "consent revoked")?;
                    note(out, &durability)?;
                }
            }
        }

        Commands::Feedback(cmd) => {
            let feedback = hub.feedback();
            match cmd {
                FeedbackCommand::Submit {
                    subject_id,
                    sentiment,
                    comment,
                } => match feedback.record_once(&subject_id, sentiment.into(), &comment) {
                    FeedbackOutcome::Accepted(result) => {
                        writeln!(out, "thanks for the feedback on {subject_id}")?;
                        note(out, &result.durability)?;
                    }
                    FeedbackOutcome::AlreadyExists(_) => {
                        writeln!(out, "feedback for {subject_id} was already submitted")?;
                    }
                    FeedbackOutcome::Rejected { reason } => {
                        anyhow::bail!("feedback rejected: {reason}");
                    }
                },
                FeedbackCommand::List => {
                    for record in feedback.read_all() {
                        writeln!(
                            out,
                            "{} {:?} {}",
                            record.subject_id, record.sentiment, record.comment
                        )?;
                    }
                    let summary = feedback.summary();
                    writeln!(
                        out,
                        "{} positive, {} negative",
                        summary.positive, summary.negative
                    )?;
                }
            }
        }

        Commands::History(cmd) => {
            let history = hub.search_history();
            match cmd {
                HistoryCommand::Add { query } => note(out, &history.add(&query).durability)?,
                HistoryCommand::List => {
                    for query in history.entries() {
                        writeln!(out, "{query}")?;
                    }
                }
                HistoryCommand::Remove { query } => {
                    note(out, &history.remove(&query).durability)?
                }
                HistoryCommand::Clear => note(out, &history.clear())?,
            }
        }

        Commands::Guide(cmd) => match cmd {
            GuideCommand::Toggle { guide_id, step_id } => {
                let result = hub.guide_progress(&guide_id).toggle_step(&step_id);
                let state = if result.value { "done" } else { "not done" };
                writeln!(out, "{guide_id}/{step_id}: {state}")?;
                note(out, &result.durability)?;
            }
            GuideCommand::Show { guide_id, total } => {
                let progress = hub.guide_progress(&guide_id);
                for step in progress.completed_steps() {
                    writeln!(out, "{step}")?;
                }
                if let Some(total) = total {
                    let percent = (progress.completion_fraction(total) * 100.0).round();
                    writeln!(out, "{percent}% complete")?;
                }
            }
        },

        Commands::Highlight { text, query } => {
            writeln!(out, "{}", hub.highlighter().highlight(&text, &query))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(hub: &StateHub, args: &[&str]) -> String {
        let cli = Cli::try_parse_from(std::iter::once("medprompt").chain(args.iter().copied()))
            .expect("valid arguments");
        let mut out = Vec::new();
        dispatch(cli.command, hub, &mut out).expect("command succeeds");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn favorite_toggle_and_list() {
        let hub = StateHub::in_memory();
        assert_eq!(run(&hub, &["favorite", "toggle", "soap"]), "soap: added\n");
        run(&hub, &["favorite", "toggle", "ddx"]);
        assert_eq!(run(&hub, &["favorite", "list"]), "soap\nddx\n");
    }

    #[test]
    fn xp_show_reports_level() {
        let hub = StateHub::in_memory();
        run(&hub, &["xp", "award", "105", "--reason", "bonus"]);
        let shown = run(&hub, &["xp", "show"]);
        assert!(shown.starts_with("level 2 (Novice) - 105 XP"));
        assert!(shown.contains("3% to level 3 (195 XP at 300)"));
    }

    #[test]
    fn feedback_twice() {
        let hub = StateHub::in_memory();
        run(&hub, &["feedback", "submit", "prompt-42", "positive"]);
        let second = run(&hub, &["feedback", "submit", "prompt-42", "negative"]);
        assert_eq!(second, "feedback for prompt-42 was already submitted\n");
    }

    #[test]
    fn highlight_command() {
        let hub = StateHub::in_memory();
        assert_eq!(
            run(&hub, &["highlight", "Sepsis bundle", "sepsis"]),
            "<mark>Sepsis</mark> bundle\n"
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["medprompt", "usage", "top", "--memory", "-l", "3"]).unwrap();
        assert!(cli.memory);
        assert!(matches!(cli.command, Commands::Usage(UsageCommand::Top { limit: 3 })));
    }
}
