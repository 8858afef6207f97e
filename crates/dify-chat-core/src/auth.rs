//! Single local administrator account.
//!
//! The password is kept as a hex SHA-256 digest salted with the username.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::CoreError;
use crate::model::{User, new_id};
use crate::storage::{ACCOUNT_KEY, SharedStore, load_json, save_json};
use crate::users::UserRepository;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Account {
    user_id: String,
    username: String,
    password_sha256: String,
}

fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Account setup, login and logout.
#[derive(Clone)]
pub struct Auth {
    store: SharedStore,
    users: UserRepository,
}

impl Auth {
    pub fn new(store: SharedStore) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            store,
        }
    }

    pub fn is_initialized(&self) -> Result<bool, CoreError> {
        Ok(self.account()?.is_some())
    }

    /// Creates the administrator account. Fails if one already exists.
    pub fn initialize(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, CoreError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() || confirm_password.is_empty() {
            return Err(CoreError::Validation(
                "username, password and confirmation are required".into(),
            ));
        }
        if password != confirm_password {
            return Err(CoreError::Validation("passwords do not match".into()));
        }
        if self.is_initialized()? {
            return Err(CoreError::AlreadyInitialized);
        }
        let account = Account {
            user_id: new_id(),
            username: username.to_string(),
            password_sha256: hash_password(username, password),
        };
        save_json(self.store.as_ref(), ACCOUNT_KEY, &account)?;
        tracing::info!(username, "administrator account created");
        Ok(User {
            id: account.user_id,
            username: account.username,
        })
    }

    /// Checks credentials and records the signed-in user.
    pub fn login(&self, username: &str, password: &str) -> Result<User, CoreError> {
        let account = self.account()?.ok_or(CoreError::NotInitialized)?;
        let username = username.trim();
        if username != account.username
            || hash_password(username, password) != account.password_sha256
        {
            tracing::warn!(username, "login rejected");
            return Err(CoreError::InvalidCredentials);
        }
        let user = User {
            id: account.user_id,
            username: account.username,
        };
        self.users.set(&user)?;
        tracing::info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), CoreError> {
        self.users.clear()
    }

    pub fn current_user(&self) -> Result<Option<User>, CoreError> {
        self.users.current()
    }

    fn account(&self) -> Result<Option<Account>, CoreError> {
        load_json(self.store.as_ref(), ACCOUNT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;

    fn auth() -> Auth {
        Auth::new(StoreConfig::Memory.open().unwrap())
    }

    #[test]
    fn initialize_validates_input_once() {
        let auth = auth();
        assert!(!auth.is_initialized().unwrap());
        assert!(matches!(
            auth.initialize("admin", "secret", "other"),
            Err(CoreError::Validation(msg)) if msg.contains("do not match")
        ));
        assert!(auth.initialize(" ", "secret", "secret").is_err());

        auth.initialize("admin", "secret", "secret").unwrap();
        assert!(auth.is_initialized().unwrap());
        assert_eq!(
            auth.initialize("admin", "secret", "secret"),
            Err(CoreError::AlreadyInitialized)
        );
    }

    #[test]
    fn password_is_not_stored_in_clear() {
        let store = StoreConfig::Memory.open().unwrap();
        Auth::new(store.clone())
            .initialize("admin", "secret", "secret")
            .unwrap();
        let raw = store.get(ACCOUNT_KEY).unwrap().unwrap();
        assert!(!raw.contains("secret"));
        assert!(raw.contains(&hash_password("admin", "secret")));
    }

    #[test]
    fn login_logout_cycle() {
        let auth = auth();
        assert_eq!(auth.login("admin", "secret"), Err(CoreError::NotInitialized));
        let created = auth.initialize("admin", "secret", "secret").unwrap();

        assert_eq!(
            auth.login("admin", "wrong"),
            Err(CoreError::InvalidCredentials)
        );
        assert_eq!(
            auth.login("root", "secret"),
            Err(CoreError::InvalidCredentials)
        );
        assert_eq!(auth.current_user().unwrap(), None);

        let user = auth.login("admin", "secret").unwrap();
        assert_eq!(user, created);
        assert_eq!(auth.current_user().unwrap(), Some(user));

        auth.logout().unwrap();
        assert_eq!(auth.current_user().unwrap(), None);
    }
}
