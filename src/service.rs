//! Glue between the messaging transport and the core components.

use std::sync::Arc;

use tracing::{info, warn};

use crate::access::AccessGate;
use crate::error::{ServiceError, StoreError};
use crate::models::{Destination, SavedSearch, SearchFilter, UserId};
use crate::query::compile;
use crate::store::SavedSearchStore;
use crate::watch::WatchEngine;
use crate::wizard::{Prompt, Step, Wizard};

/// What the transport should show after a selection
#[derive(Debug, Clone)]
pub enum ChoiceOutcome {
    Prompt(Prompt),
    Saved(SavedSearch),
}

pub struct ScoutService {
    gate: Arc<dyn AccessGate>,
    wizard: Wizard,
    store: SavedSearchStore,
    engine: Arc<WatchEngine>,
}

impl ScoutService {
    pub fn new(
        gate: Arc<dyn AccessGate>,
        wizard: Wizard,
        store: SavedSearchStore,
        engine: Arc<WatchEngine>,
    ) -> Self {
        Self {
            gate,
            wizard,
            store,
            engine,
        }
    }

    pub fn engine(&self) -> &WatchEngine {
        &self.engine
    }

    pub fn is_authorized(&self, user: UserId) -> bool {
        self.gate.is_authorized(user)
    }

    fn authorize(&self, user: UserId) -> Result<(), ServiceError> {
        if self.gate.is_authorized(user) {
            Ok(())
        } else {
            warn!(user, "Rejected unauthorized user");
            Err(ServiceError::Unauthorized(user))
        }
    }

    pub async fn begin_search(&self, user: UserId) -> Result<Prompt, ServiceError> {
        self.authorize(user)?;
        Ok(self.wizard.start(user).await?)
    }

    /// The prompt the user's wizard is waiting on, if any
    pub fn current_prompt(&self, user: UserId) -> Option<Prompt> {
        self.wizard.current(user)
    }

    /// Forget a half-built search
    pub fn abandon_search(&self, user: UserId) {
        if self.wizard.abandon(user) {
            info!(user, "Wizard abandoned");
        }
    }

    pub async fn choose(
        &self,
        user: UserId,
        destination: Destination,
        key: &str,
    ) -> Result<ChoiceOutcome, ServiceError> {
        self.authorize(user)?;
        let step = self.wizard.select(user, key).await?;
        self.handle_step(user, destination, step).await
    }

    /// Like [`choose`](Self::choose), by position among the options of the
    /// prompt identified by `seq`
    pub async fn choose_nth(
        &self,
        user: UserId,
        destination: Destination,
        seq: u64,
        n: usize,
    ) -> Result<ChoiceOutcome, ServiceError> {
        self.authorize(user)?;
        let step = self.wizard.select_nth(user, seq, n).await?;
        self.handle_step(user, destination, step).await
    }

    async fn handle_step(
        &self,
        user: UserId,
        destination: Destination,
        step: Step,
    ) -> Result<ChoiceOutcome, ServiceError> {
        match step {
            Step::Prompt(prompt) => Ok(ChoiceOutcome::Prompt(prompt)),
            Step::Completed(filter) => {
                let saved = self.save(user, destination, filter).await?;
                Ok(ChoiceOutcome::Saved(saved))
            }
        }
    }

    /// Persist a completed filter and start watching it
    async fn save(
        &self,
        user: UserId,
        destination: Destination,
        filter: SearchFilter,
    ) -> Result<SavedSearch, ServiceError> {
        compile(&filter)?;

        let saved = SavedSearch::new(destination, filter);
        self.store.append(user, saved.clone()).await?;
        self.engine.spawn(&saved)?;

        info!(user, search_id = %saved.id, "Saved search is now watched");
        Ok(saved)
    }

    pub async fn list_searches(&self, user: UserId) -> Result<Vec<SavedSearch>, ServiceError> {
        self.authorize(user)?;
        Ok(self.store.list(user).await?)
    }

    /// Delete the search at `index` and stop its watch task
    pub async fn delete_search(
        &self,
        user: UserId,
        index: usize,
    ) -> Result<SavedSearch, ServiceError> {
        self.authorize(user)?;
        let removed = self.store.delete_at(user, index).await?;
        self.engine.cancel(&removed.id);
        Ok(removed)
    }

    /// Delete all of the user's searches, returning how many were removed
    pub async fn delete_all_searches(&self, user: UserId) -> Result<usize, ServiceError> {
        self.authorize(user)?;
        let removed = self.store.delete_all(user).await?;
        self.engine
            .cancel_many(removed.iter().map(|s| s.id.as_str()));
        Ok(removed.len())
    }

    /// Start a watch task for every persisted search
    pub async fn rearm_all(&self) -> Result<usize, StoreError> {
        let mut armed = 0;
        for (user, search) in self.store.all().await? {
            match self.engine.spawn(&search) {
                Ok(()) => armed += 1,
                Err(e) => warn!(user, search_id = %search.id, error = %e, "Persisted search cannot be watched"),
            }
        }
        info!(armed, "Re-armed persisted searches");
        Ok(armed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessList;
    use crate::error::WizardError;
    use crate::store::MemoryStore;
    use crate::watch::tests::{fast_config, listing, RecordingDispatcher, ScriptedSource};
    use crate::wizard::tests::hyundai_catalog;
    use crate::wizard::WizardStep;
    use std::time::Duration;

    const USER: UserId = 604303416;

    fn build_service(store: SavedSearchStore) -> (ScoutService, Arc<RecordingDispatcher>) {
        let source = Arc::new(ScriptedSource::with_pages(vec![Ok(vec![listing("A")])]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = Arc::new(WatchEngine::new(source, dispatcher.clone(), fast_config()));
        let service = ScoutService::new(
            Arc::new(AccessList::new([USER], None)),
            Wizard::new(Arc::new(hyundai_catalog())),
            store,
            engine,
        );
        (service, dispatcher)
    }

    fn memory() -> SavedSearchStore {
        SavedSearchStore::new(Arc::new(MemoryStore::default()))
    }

    async fn complete_wizard(service: &ScoutService) -> SavedSearch {
        service.begin_search(USER).await.unwrap();
        let keys = ["현대", "소나타", "DN8", "가솔린", "2020", "2023", "0", "50000"];
        for key in keys {
            match service.choose(USER, USER, key).await.unwrap() {
                ChoiceOutcome::Prompt(_) => {}
                ChoiceOutcome::Saved(_) => panic!("saved too early"),
            }
        }
        match service.choose(USER, USER, "any").await.unwrap() {
            ChoiceOutcome::Saved(saved) => saved,
            ChoiceOutcome::Prompt(p) => panic!("still prompting: {:?}", p.step),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_user_is_rejected() {
        let (service, _) = build_service(memory());
        assert!(matches!(
            service.begin_search(1).await,
            Err(ServiceError::Unauthorized(1))
        ));
        assert!(matches!(
            service.delete_all_searches(1).await,
            Err(ServiceError::Unauthorized(1))
        ));
    }

    #[tokio::test]
    async fn test_completed_wizard_is_saved_and_watched() {
        let (service, dispatcher) = build_service(memory());
        let saved = complete_wizard(&service).await;

        let listed = service.list_searches(USER).await.unwrap();
        assert_eq!(listed, vec![saved.clone()]);
        assert!(service.engine().is_watching(&saved.id));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.ids(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_delete_stops_watch_task() {
        let (service, _) = build_service(memory());
        let first = complete_wizard(&service).await;
        let second = complete_wizard(&service).await;

        let removed = service.delete_search(USER, 0).await.unwrap();
        assert_eq!(removed.id, first.id);
        assert!(!service.engine().is_watching(&first.id));
        assert!(service.engine().is_watching(&second.id));

        assert!(matches!(
            service.delete_search(USER, 5).await,
            Err(ServiceError::Store(StoreError::NotFound { .. }))
        ));

        assert_eq!(service.delete_all_searches(USER).await.unwrap(), 1);
        assert!(!service.engine().is_watching(&second.id));
        assert!(service.list_searches(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_choice_surfaces_prompt() {
        let (service, _) = build_service(memory());
        service.begin_search(USER).await.unwrap();
        match service.choose(USER, USER, "없는회사").await {
            Err(ServiceError::Wizard(WizardError::InvalidSelection { prompt })) => {
                assert_eq!(prompt.step, WizardStep::SelectingManufacturer)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_choose_nth_rejects_outdated_prompt() {
        let (service, _) = build_service(memory());
        let manufacturers = service.begin_search(USER).await.unwrap();
        let ChoiceOutcome::Prompt(models) =
            service.choose_nth(USER, USER, manufacturers.seq, 0).await.unwrap()
        else {
            panic!("expected prompt");
        };

        match service.choose_nth(USER, USER, manufacturers.seq, 0).await {
            Err(ServiceError::Wizard(WizardError::InvalidSelection { prompt })) => {
                assert_eq!(prompt.step, WizardStep::SelectingModelGroup);
                assert_eq!(prompt.seq, models.seq);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rearm_restores_watch_tasks() {
        let backend = Arc::new(MemoryStore::default());
        let (service, _) = build_service(SavedSearchStore::new(backend.clone()));
        let saved = complete_wizard(&service).await;
        service.engine().shutdown().await;

        // Fresh process over the same durable document
        let (restarted, _) = build_service(SavedSearchStore::new(backend));
        assert!(!restarted.engine().is_watching(&saved.id));
        assert_eq!(restarted.rearm_all().await.unwrap(), 1);
        assert!(restarted.engine().is_watching(&saved.id));
    }
}
