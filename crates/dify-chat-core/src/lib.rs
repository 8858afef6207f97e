//! Local state for the Dify chat client: configured apps, saved
//! conversations and the administrator account, persisted through a
//! [`KeyValueStore`].

pub mod apps;
pub mod auth;
pub mod conversations;
pub mod errors;
pub mod model;
pub mod observability;
pub mod storage;
pub mod users;

pub use apps::AppRepository;
pub use auth::Auth;
pub use conversations::ConversationRepository;
pub use errors::CoreError;
pub use model::{App, Conversation, FileRef, Message, Role, User, title_from_query};
pub use observability::init_observability;
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore, StoreConfig};
pub use users::UserRepository;

/// Repositories sharing one store.
#[derive(Clone)]
pub struct LocalState {
    pub apps: AppRepository,
    pub conversations: ConversationRepository,
    pub auth: Auth,
}

impl LocalState {
    pub fn open(config: &StoreConfig) -> Result<Self, CoreError> {
        Ok(Self::with_store(config.open()?))
    }

    pub fn with_store(store: SharedStore) -> Self {
        Self {
            apps: AppRepository::new(store.clone()),
            conversations: ConversationRepository::new(store.clone()),
            auth: Auth::new(store),
        }
    }
}
