//! Long-polling loop and callback routing.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::api::{TelegramApi, Update};
use super::keyboards;
use crate::error::{ServiceError, StoreError, TelegramError, WizardError};
use crate::models::{escape_html, SavedSearch, UserId};
use crate::service::{ChoiceOutcome, ScoutService};
use crate::wizard::Prompt;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Short text shown as a callback toast
type Toast = Option<&'static str>;

/// Actions carried in inline button payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Menu,
    Search,
    /// Option `index` of the wizard prompt numbered `seq`
    Pick { seq: u64, index: usize },
    List,
    Delete(usize),
    DeleteAll,
}

impl Command {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "menu" => Some(Command::Menu),
            "search" => Some(Command::Search),
            "list" => Some(Command::List),
            "delall" => Some(Command::DeleteAll),
            _ => {
                let (action, args) = data.split_once(':')?;
                match action {
                    "pick" => {
                        let (seq, index) = args.split_once(':')?;
                        Some(Command::Pick {
                            seq: seq.parse().ok()?,
                            index: index.parse().ok()?,
                        })
                    }
                    "del" => Some(Command::Delete(args.parse().ok()?)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Bot {
    api: Arc<TelegramApi>,
    service: Arc<ScoutService>,
}

impl Bot {
    pub fn new(api: Arc<TelegramApi>, service: Arc<ScoutService>) -> Self {
        Self { api, service }
    }

    /// Poll for updates until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Bot is polling for updates");
        let mut offset = 0;

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.api.get_updates(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let bot = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = bot.handle(update).await {
                                warn!(error = %e, "Failed to handle update");
                            }
                        });
                    }
                }
                Err(e) => {
                    error!(error = %e, "Polling for updates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Bot stopped polling");
    }

    async fn handle(&self, update: Update) -> Result<(), TelegramError> {
        if let Some(message) = update.message {
            let text = message.text.as_deref().unwrap_or_default();
            if text.starts_with("/start") {
                let user = message.from.map(|u| u.id).unwrap_or(message.chat.id);
                return self.show_menu(user, message.chat.id).await;
            }
            return Ok(());
        }

        if let Some(callback) = update.callback_query {
            let user = callback.from.id;
            let chat = callback.message.map(|m| m.chat.id).unwrap_or(user);

            let handled = match callback.data.as_deref().and_then(Command::parse) {
                Some(command) => self.on_command(user, chat, command).await,
                None => {
                    debug!(user, data = ?callback.data, "Ignoring unknown callback");
                    Ok(None)
                }
            };

            let toast = handled.as_ref().ok().copied().flatten();
            if let Err(e) = self.api.answer_callback(&callback.id, toast).await {
                debug!(error = %e, "Could not answer callback");
            }
            handled?;
        }

        Ok(())
    }

    async fn on_command(
        &self,
        user: UserId,
        chat: i64,
        command: Command,
    ) -> Result<Toast, TelegramError> {
        debug!(user, ?command, "Callback");

        let failure = match command {
            Command::Menu => {
                self.service.abandon_search(user);
                self.show_menu(user, chat).await?;
                return Ok(None);
            }
            Command::Search => match self.service.begin_search(user).await {
                Ok(prompt) => {
                    self.send_prompt(chat, &prompt, None).await?;
                    return Ok(None);
                }
                Err(e) => e,
            },
            Command::Pick { seq, index } => {
                match self.service.choose_nth(user, chat, seq, index).await {
                    Ok(ChoiceOutcome::Prompt(prompt)) => {
                        self.send_prompt(chat, &prompt, None).await?;
                        return Ok(None);
                    }
                    Ok(ChoiceOutcome::Saved(saved)) => {
                        let text = format!(
                            "✅ Search saved! I will notify you about new listings.\n\n<b>{}</b>",
                            escape_html(&saved.filter.summary())
                        );
                        self.api
                            .send_message(chat, &text, Some(&keyboards::after_save()))
                            .await?;
                        return Ok(Some("✅ Saved"));
                    }
                    Err(e) => e,
                }
            }
            Command::List => match self.service.list_searches(user).await {
                Ok(searches) => {
                    self.send_searches(chat, &searches).await?;
                    return Ok(None);
                }
                Err(e) => e,
            },
            Command::Delete(index) => match self.service.delete_search(user, index).await {
                Ok(removed) => {
                    let text = format!(
                        "🗑 Deleted:\n<b>{}</b>",
                        escape_html(&removed.filter.summary())
                    );
                    self.api.send_message(chat, &text, None).await?;
                    match self.service.list_searches(user).await {
                        Ok(searches) => {
                            self.send_searches(chat, &searches).await?;
                            return Ok(Some("🗑 Deleted"));
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            },
            Command::DeleteAll => match self.service.delete_all_searches(user).await {
                Ok(count) => {
                    let text = format!("🗑 Deleted {} saved search(es).", count);
                    self.api
                        .send_message(chat, &text, Some(&keyboards::menu()))
                        .await?;
                    return Ok(None);
                }
                Err(e) => e,
            },
        };

        self.report(user, chat, failure).await
    }

    async fn show_menu(&self, user: UserId, chat: i64) -> Result<(), TelegramError> {
        if !self.service.is_authorized(user) {
            return self.api.send_message(chat, &access_denied_text(user), None).await;
        }
        let text = "🚗 I watch the Encar marketplace and message you when a new listing matches one of your searches.";
        self.api.send_message(chat, text, Some(&keyboards::menu())).await
    }

    async fn send_prompt(
        &self,
        chat: i64,
        prompt: &Prompt,
        notice: Option<&str>,
    ) -> Result<(), TelegramError> {
        let text = match notice {
            Some(notice) => format!("{}\n\n{}", notice, prompt.step.title()),
            None => prompt.step.title().to_string(),
        };
        self.api
            .send_message(chat, &text, Some(&keyboards::prompt(prompt)))
            .await
    }

    async fn send_searches(&self, chat: i64, searches: &[SavedSearch]) -> Result<(), TelegramError> {
        if searches.is_empty() {
            return self
                .api
                .send_message(chat, "You have no saved searches.", Some(&keyboards::menu()))
                .await;
        }
        self.api
            .send_message(chat, &searches_text(searches), Some(&keyboards::searches(searches)))
            .await
    }

    /// Turn a service failure into a message for the user
    async fn report(&self, user: UserId, chat: i64, err: ServiceError) -> Result<Toast, TelegramError> {
        let menu = keyboards::menu();
        match err {
            ServiceError::Unauthorized(_) => {
                self.api.send_message(chat, &access_denied_text(user), None).await?;
                Ok(Some("⛔ No access"))
            }
            ServiceError::Wizard(WizardError::InvalidSelection { prompt }) => {
                let notice = "⚠️ That option is not part of the current step, please choose again.";
                self.send_prompt(chat, &prompt, Some(notice)).await?;
                Ok(Some("⚠️ That button is outdated"))
            }
            ServiceError::Wizard(WizardError::CatalogUnavailable) => {
                let notice = "⚠️ The catalog is unavailable right now, please try again.";
                match self.service.current_prompt(user) {
                    Some(prompt) => self.send_prompt(chat, &prompt, Some(notice)).await?,
                    None => self.api.send_message(chat, notice, Some(&menu)).await?,
                }
                Ok(Some("⚠️ Could not load the catalog"))
            }
            ServiceError::Wizard(WizardError::NotStarted) => {
                let text = "This search is no longer active. Start a new one from the menu.";
                self.api.send_message(chat, text, Some(&menu)).await?;
                Ok(None)
            }
            ServiceError::Store(StoreError::NotFound { .. }) => {
                self.api
                    .send_message(chat, "⚠️ That search no longer exists.", Some(&menu))
                    .await?;
                Ok(Some("⚠️ Search not found"))
            }
            ServiceError::Compile(e) => {
                warn!(user, error = %e, "Completed filter did not compile");
                let text = "⚠️ This search is incomplete and was not saved.";
                self.api.send_message(chat, text, Some(&menu)).await?;
                Ok(None)
            }
            ServiceError::Store(e) => {
                error!(user, error = %e, "Saved-search store failed");
                let text = "⚠️ Could not update your searches, please try again later.";
                self.api.send_message(chat, text, Some(&menu)).await?;
                Ok(None)
            }
        }
    }
}

fn access_denied_text(user: UserId) -> String {
    format!(
        "⛔ You do not have access to this bot.\nAsk the manager to add your id: <code>{}</code>",
        user
    )
}

fn searches_text(searches: &[SavedSearch]) -> String {
    let mut text = String::from("📋 Your saved searches:");
    for (i, search) in searches.iter().enumerate() {
        text.push_str(&format!(
            "\n\n{}. {}",
            i + 1,
            escape_html(&search.filter.summary())
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchFilter;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("search"), Some(Command::Search));
        assert_eq!(
            Command::parse("pick:41:12"),
            Some(Command::Pick { seq: 41, index: 12 })
        );
        assert_eq!(Command::parse("del:0"), Some(Command::Delete(0)));
        assert_eq!(Command::parse("delall"), Some(Command::DeleteAll));
        assert_eq!(Command::parse("menu"), Some(Command::Menu));
        assert_eq!(Command::parse("list"), Some(Command::List));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("pick:"), None);
        assert_eq!(Command::parse("pick:3:-1"), None);
        assert_eq!(Command::parse("drop:1"), None);
    }

    #[test]
    fn test_pick_without_prompt_seq_is_rejected() {
        // Position-only payloads cannot be matched to a prompt
        assert_eq!(Command::parse("pick:0"), None);
        assert_eq!(Command::parse("pick::0"), None);
    }

    #[test]
    fn test_searches_listing() {
        let filter = SearchFilter {
            manufacturer: "현대".to_string(),
            model_group: "쏘나타".to_string(),
            model: "쏘나타 (DN8)".to_string(),
            trim: "가솔린".to_string(),
            year_from: 2020,
            year_to: 2023,
            mileage_from: 0,
            mileage_to: 50000,
            color: None,
        };
        let searches = vec![SavedSearch::new(1, filter.clone()), SavedSearch::new(1, filter)];

        let text = searches_text(&searches);
        assert!(text.contains("1. 현대 쏘나타 (DN8)"));
        assert!(text.contains("2. 현대"));
    }
}
