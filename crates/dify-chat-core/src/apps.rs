use crate::errors::CoreError;
use crate::model::{App, new_id};
use crate::storage::{APPS_KEY, CURRENT_APP_KEY, SharedStore, load_json, save_json};

/// Configured apps plus the current-app selection.
#[derive(Clone)]
pub struct AppRepository {
    store: SharedStore,
}

impl AppRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<App>, CoreError> {
        load_json(self.store.as_ref(), APPS_KEY)
    }

    pub fn get(&self, id: &str) -> Result<App, CoreError> {
        self.list()?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| CoreError::not_found("app", id))
    }

    /// Validates and stores `app` under a fresh id. The first app added
    /// becomes the current one.
    pub fn add(&self, app: App) -> Result<App, CoreError> {
        let mut app = app.normalized()?;
        app.id = new_id();
        let mut apps = self.list()?;
        apps.push(app.clone());
        save_json(self.store.as_ref(), APPS_KEY, &apps)?;
        if self.current_id()?.is_none() {
            self.set_current(&app.id)?;
        }
        tracing::info!(app_id = %app.id, name = %app.name, "app added");
        Ok(app)
    }

    /// Replaces the stored app with the same id.
    pub fn update(&self, app: App) -> Result<App, CoreError> {
        let app = app.normalized()?;
        let mut apps = self.list()?;
        let slot = apps
            .iter_mut()
            .find(|a| a.id == app.id)
            .ok_or_else(|| CoreError::not_found("app", &app.id))?;
        *slot = app.clone();
        save_json(self.store.as_ref(), APPS_KEY, &apps)?;
        Ok(app)
    }

    /// Deletes the app. If it was current, the first remaining app becomes
    /// current, or the selection is cleared.
    pub fn remove(&self, id: &str) -> Result<(), CoreError> {
        let mut apps = self.list()?;
        let before = apps.len();
        apps.retain(|a| a.id != id);
        if apps.len() == before {
            return Err(CoreError::not_found("app", id));
        }
        save_json(self.store.as_ref(), APPS_KEY, &apps)?;
        if self.current_id()?.as_deref() == Some(id) {
            match apps.first() {
                Some(next) => self.set_current(&next.id)?,
                None => self.store.remove(CURRENT_APP_KEY)?,
            }
        }
        tracing::info!(app_id = %id, "app removed");
        Ok(())
    }

    pub fn set_current(&self, id: &str) -> Result<(), CoreError> {
        if !self.list()?.iter().any(|a| a.id == id) {
            return Err(CoreError::not_found("app", id));
        }
        save_json(self.store.as_ref(), CURRENT_APP_KEY, id)
    }

    pub fn current_id(&self) -> Result<Option<String>, CoreError> {
        load_json(self.store.as_ref(), CURRENT_APP_KEY)
    }

    /// The selected app, or the first configured one when the selection is
    /// unset or stale.
    pub fn current(&self) -> Result<Option<App>, CoreError> {
        let apps = self.list()?;
        let selected = self.current_id()?;
        let found = selected
            .as_deref()
            .and_then(|id| apps.iter().find(|a| a.id == id));
        Ok(found.or_else(|| apps.first()).cloned())
    }

    /// Looks an app up by id, or by name when no id matches.
    pub fn find(&self, id_or_name: &str) -> Result<App, CoreError> {
        let apps = self.list()?;
        apps.iter()
            .find(|a| a.id == id_or_name)
            .or_else(|| apps.iter().find(|a| a.name == id_or_name))
            .cloned()
            .ok_or_else(|| CoreError::not_found("app", id_or_name))
    }
}
