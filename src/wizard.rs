//! Multi-step filter builder.
//!
//! Each user has at most one in-flight session holding the accumulated
//! selections and the options most recently offered. Catalog steps are
//! resolved from the provider using the selections made so far; the year,
//! mileage and color steps are generated locally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Datelike;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::catalog::CatalogProvider;
use crate::error::WizardError;
use crate::models::{ChoiceNode, ProductionSpan, SearchFilter, UserId};

pub const ANY_COLOR: &str = "any";

const MILEAGE_STEP: u32 = 10_000;
const MILEAGE_MAX: u32 = 200_000;

/// Marketplace color values with their English labels
const COLORS: &[(&str, &str)] = &[
    ("검정색", "Black"),
    ("흰색", "White"),
    ("은색", "Silver"),
    ("쥐색", "Gray"),
    ("진주색", "Pearl"),
    ("파란색", "Blue"),
    ("빨간색", "Red"),
    ("갈색", "Brown"),
    ("녹색", "Green"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectingManufacturer,
    SelectingModelGroup,
    SelectingGeneration,
    SelectingTrim,
    SelectingYearFrom,
    SelectingYearTo,
    SelectingMileageFrom,
    SelectingMileageTo,
    SelectingColor,
}

impl WizardStep {
    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::SelectingManufacturer => "Choose a manufacturer:",
            WizardStep::SelectingModelGroup => "Choose a model:",
            WizardStep::SelectingGeneration => "Choose a generation:",
            WizardStep::SelectingTrim => "Choose a trim:",
            WizardStep::SelectingYearFrom => "Choose the earliest model year:",
            WizardStep::SelectingYearTo => "Choose the latest model year:",
            WizardStep::SelectingMileageFrom => "Choose the minimum mileage:",
            WizardStep::SelectingMileageTo => "Choose the maximum mileage:",
            WizardStep::SelectingColor => "Choose a color:",
        }
    }
}

/// Options offered to the user for the current step
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Identifies this prompt among all prompts shown; a selection made on an
    /// older prompt carries a stale `seq` and is rejected
    pub seq: u64,
    pub step: WizardStep,
    pub options: Vec<ChoiceNode>,
}

/// Result of a valid selection
#[derive(Debug, Clone)]
pub enum Step {
    Prompt(Prompt),
    Completed(SearchFilter),
}

#[derive(Debug, Clone, Default)]
struct Draft {
    manufacturer: Option<String>,
    model_group: Option<String>,
    model: Option<String>,
    production: Option<ProductionSpan>,
    trim: Option<String>,
    year_from: Option<i32>,
    year_to: Option<i32>,
    mileage_from: Option<u32>,
    mileage_to: Option<u32>,
}

impl Draft {
    fn catalog_prefix(&self) -> Vec<String> {
        [&self.manufacturer, &self.model_group, &self.model]
            .into_iter()
            .map_while(|v| v.clone())
            .collect()
    }

    fn finish(self, color: Option<String>) -> Option<SearchFilter> {
        Some(SearchFilter {
            manufacturer: self.manufacturer?,
            model_group: self.model_group?,
            model: self.model?,
            trim: self.trim?,
            year_from: self.year_from?,
            year_to: self.year_to?,
            mileage_from: self.mileage_from?,
            mileage_to: self.mileage_to?,
            color,
        })
    }
}

#[derive(Debug, Clone)]
struct Session {
    epoch: u64,
    /// Manufacturer list, kept to return to the entry point
    root: Vec<ChoiceNode>,
    prompt: Prompt,
    draft: Draft,
}

impl Session {
    fn reset(&mut self, seq: u64) {
        self.prompt = Prompt {
            seq,
            step: WizardStep::SelectingManufacturer,
            options: self.root.clone(),
        };
        self.draft = Draft::default();
    }
}

enum Advance {
    Next(Prompt, Draft),
    Completed(SearchFilter),
}

/// Per-user filter builder
pub struct Wizard {
    provider: Arc<dyn CatalogProvider>,
    sessions: DashMap<UserId, Session>,
    epochs: AtomicU64,
    prompt_seq: AtomicU64,
}

impl Wizard {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self {
            provider,
            sessions: DashMap::new(),
            epochs: AtomicU64::new(0),
            prompt_seq: AtomicU64::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.prompt_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Begin (or restart) a wizard for `user`. Any in-flight wizard is replaced.
    pub async fn start(&self, user: UserId) -> Result<Prompt, WizardError> {
        let root = match self.catalog(&[]).await {
            Ok(root) => root,
            Err(e) => {
                self.sessions.remove(&user);
                return Err(e);
            }
        };

        let prompt = Prompt {
            seq: self.next_seq(),
            step: WizardStep::SelectingManufacturer,
            options: root.clone(),
        };
        let session = Session {
            epoch: self.epochs.fetch_add(1, Ordering::Relaxed),
            root,
            prompt: prompt.clone(),
            draft: Draft::default(),
        };
        if self.sessions.insert(user, session).is_some() {
            debug!(user, "Replaced in-flight wizard");
        }

        info!(user, "Wizard started");
        Ok(prompt)
    }

    /// Prompt the user is currently answering
    pub fn current(&self, user: UserId) -> Option<Prompt> {
        self.sessions.get(&user).map(|s| s.prompt.clone())
    }

    /// Drop the user's in-flight wizard, if any
    pub fn abandon(&self, user: UserId) -> bool {
        self.sessions.remove(&user).is_some()
    }

    /// Select the `n`-th option of the prompt identified by `seq`. A `seq`
    /// other than the current prompt's is rejected with the current prompt.
    pub async fn select_nth(&self, user: UserId, seq: u64, n: usize) -> Result<Step, WizardError> {
        let prompt = self.current(user).ok_or(WizardError::NotStarted)?;
        if prompt.seq != seq {
            debug!(user, seq, current = prompt.seq, "Selection made on an outdated prompt");
            return Err(WizardError::InvalidSelection { prompt });
        }
        match prompt.options.get(n) {
            Some(option) => {
                let key = option.key.clone();
                self.apply(user, &key, Some(seq)).await
            }
            None => Err(WizardError::InvalidSelection { prompt }),
        }
    }

    /// Apply the user's choice for the current step.
    pub async fn select(&self, user: UserId, key: &str) -> Result<Step, WizardError> {
        self.apply(user, key, None).await
    }

    async fn apply(&self, user: UserId, key: &str, seq: Option<u64>) -> Result<Step, WizardError> {
        let session = self
            .sessions
            .get(&user)
            .map(|s| s.value().clone())
            .ok_or(WizardError::NotStarted)?;

        if seq.is_some_and(|seq| seq != session.prompt.seq) {
            return Err(WizardError::InvalidSelection {
                prompt: session.prompt,
            });
        }

        let Some(chosen) = session.prompt.options.iter().find(|o| o.key == key).cloned() else {
            debug!(user, key, step = ?session.prompt.step, "Selection outside offered options");
            return Err(WizardError::InvalidSelection {
                prompt: session.prompt,
            });
        };

        let epoch = session.epoch;
        let outcome = self.advance(&session, chosen).await;

        // A newer `start`, or another selection on the same prompt, may have
        // moved the session on while the catalog was queried.
        let mut entry = match self.sessions.get_mut(&user) {
            Some(entry) if entry.epoch == epoch && entry.prompt.seq == session.prompt.seq => entry,
            Some(entry) => {
                debug!(user, "Discarding selection for an outdated prompt");
                return Err(WizardError::InvalidSelection {
                    prompt: entry.prompt.clone(),
                });
            }
            None => return Err(WizardError::NotStarted),
        };

        match outcome {
            Ok(Advance::Next(prompt, draft)) => {
                debug!(user, step = ?prompt.step, options = prompt.options.len(), "Wizard advanced");
                entry.prompt = prompt.clone();
                entry.draft = draft;
                Ok(Step::Prompt(prompt))
            }
            Ok(Advance::Completed(filter)) => {
                drop(entry);
                self.sessions.remove(&user);
                info!(user, manufacturer = %filter.manufacturer, model = %filter.model, "Wizard completed");
                Ok(Step::Completed(filter))
            }
            Err(WizardError::CatalogUnavailable) => {
                warn!(user, step = ?entry.prompt.step, "Catalog unavailable, returning to manufacturer selection");
                entry.reset(self.next_seq());
                Err(WizardError::CatalogUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    async fn advance(&self, session: &Session, chosen: ChoiceNode) -> Result<Advance, WizardError> {
        let mut draft = session.draft.clone();
        let prompt = &session.prompt;
        let key = chosen.key;

        let next = match prompt.step {
            WizardStep::SelectingManufacturer => {
                draft.manufacturer = Some(key);
                let options = self.catalog(&draft.catalog_prefix()).await?;
                (WizardStep::SelectingModelGroup, options)
            }
            WizardStep::SelectingModelGroup => {
                draft.model_group = Some(key);
                let options = self.catalog(&draft.catalog_prefix()).await?;
                (WizardStep::SelectingGeneration, options)
            }
            WizardStep::SelectingGeneration => {
                draft.model = Some(key);
                draft.production = chosen.production;
                let options = self.catalog(&draft.catalog_prefix()).await?;
                (WizardStep::SelectingTrim, options)
            }
            WizardStep::SelectingTrim => {
                draft.trim = Some(key);
                (
                    WizardStep::SelectingYearFrom,
                    year_from_options(draft.production, current_year()),
                )
            }
            WizardStep::SelectingYearFrom => {
                let year = parse_key(&key, prompt)?;
                draft.year_from = Some(year);
                (
                    WizardStep::SelectingYearTo,
                    year_to_options(year, current_year()),
                )
            }
            WizardStep::SelectingYearTo => {
                draft.year_to = Some(parse_key(&key, prompt)?);
                (WizardStep::SelectingMileageFrom, mileage_from_options())
            }
            WizardStep::SelectingMileageFrom => {
                let from = parse_key(&key, prompt)?;
                draft.mileage_from = Some(from);
                (WizardStep::SelectingMileageTo, mileage_to_options(from))
            }
            WizardStep::SelectingMileageTo => {
                draft.mileage_to = Some(parse_key(&key, prompt)?);
                (WizardStep::SelectingColor, color_options())
            }
            WizardStep::SelectingColor => {
                let color = (key != ANY_COLOR).then_some(key);
                return draft
                    .finish(color)
                    .map(Advance::Completed)
                    .ok_or(WizardError::NotStarted);
            }
        };

        let (step, options) = next;
        let seq = self.next_seq();
        Ok(Advance::Next(Prompt { seq, step, options }, draft))
    }

    async fn catalog(&self, prefix: &[String]) -> Result<Vec<ChoiceNode>, WizardError> {
        match self.provider.resolve(prefix).await {
            Ok(options) if !options.is_empty() => Ok(options),
            Ok(_) => {
                warn!(depth = prefix.len(), "Catalog returned no options");
                Err(WizardError::CatalogUnavailable)
            }
            Err(e) => {
                warn!(depth = prefix.len(), error = %e, "Catalog lookup failed");
                Err(WizardError::CatalogUnavailable)
            }
        }
    }
}

fn parse_key<T: std::str::FromStr>(key: &str, prompt: &Prompt) -> Result<T, WizardError> {
    key.parse().map_err(|_| WizardError::InvalidSelection {
        prompt: prompt.clone(),
    })
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

fn numeric_option(value: impl ToString, label: String) -> ChoiceNode {
    ChoiceNode::new(value.to_string(), label)
}

/// Production years of the chosen generation, or the last ten years
fn year_from_options(span: Option<ProductionSpan>, this_year: i32) -> Vec<ChoiceNode> {
    let start = span.map(|s| s.start_year).unwrap_or(this_year - 10);
    let end = span
        .and_then(|s| s.end_year)
        .unwrap_or(this_year)
        .max(start);
    (start..=end)
        .map(|y| numeric_option(y, y.to_string()))
        .collect()
}

/// From the chosen first year up to next year's models
fn year_to_options(from: i32, this_year: i32) -> Vec<ChoiceNode> {
    (from..=(this_year + 1).max(from))
        .map(|y| numeric_option(y, y.to_string()))
        .collect()
}

fn mileage_from_options() -> Vec<ChoiceNode> {
    (0..MILEAGE_MAX)
        .step_by(MILEAGE_STEP as usize)
        .map(|m| numeric_option(m, format!("{} km", m)))
        .collect()
}

fn mileage_to_options(from: u32) -> Vec<ChoiceNode> {
    (from + MILEAGE_STEP..=MILEAGE_MAX)
        .step_by(MILEAGE_STEP as usize)
        .map(|m| numeric_option(m, format!("{} km", m)))
        .collect()
}

fn color_options() -> Vec<ChoiceNode> {
    std::iter::once(ChoiceNode::new(ANY_COLOR, "Any color"))
        .chain(COLORS.iter().map(|(key, label)| ChoiceNode::new(*key, *label)))
        .collect()
}
