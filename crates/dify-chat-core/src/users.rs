use crate::errors::CoreError;
use crate::model::User;
use crate::storage::{SharedStore, USER_KEY, load_json, save_json};

/// The signed-in user, if any.
#[derive(Clone)]
pub struct UserRepository {
    store: SharedStore,
}

impl UserRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Result<Option<User>, CoreError> {
        load_json(self.store.as_ref(), USER_KEY)
    }

    pub fn set(&self, user: &User) -> Result<(), CoreError> {
        save_json(self.store.as_ref(), USER_KEY, user)
    }

    pub fn clear(&self) -> Result<(), CoreError> {
        self.store.remove(USER_KEY)
    }
}
