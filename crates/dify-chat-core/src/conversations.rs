use crate::errors::CoreError;
use crate::model::{Conversation, Message, now_millis};
use crate::storage::{CONVERSATIONS_KEY, SharedStore, load_json, save_json};

/// Locally saved conversations across all users and apps.
#[derive(Clone)]
pub struct ConversationRepository {
    store: SharedStore,
}

impl ConversationRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Conversation>, CoreError> {
        load_json(self.store.as_ref(), CONVERSATIONS_KEY)
    }

    /// Conversations of one user in one app, most recently updated first.
    pub fn list_for(&self, user_id: &str, app_id: &str) -> Result<Vec<Conversation>, CoreError> {
        let mut found: Vec<_> = self
            .list()?
            .into_iter()
            .filter(|c| c.user_id == user_id && c.app_id == app_id)
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    pub fn get(&self, id: &str) -> Result<Conversation, CoreError> {
        self.list()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CoreError::not_found("conversation", id))
    }

    /// Stores a conversation. An existing entry with the same id is replaced.
    pub fn add(&self, conversation: Conversation) -> Result<(), CoreError> {
        if conversation.id.trim().is_empty() {
            return Err(CoreError::Validation("conversation id must not be empty".into()));
        }
        let mut all = self.list()?;
        match all.iter_mut().find(|c| c.id == conversation.id) {
            Some(slot) => *slot = conversation,
            None => all.push(conversation),
        }
        save_json(self.store.as_ref(), CONVERSATIONS_KEY, &all)
    }

    pub fn update(&self, conversation: Conversation) -> Result<(), CoreError> {
        self.modify(&conversation.id.clone(), |slot| *slot = conversation)
    }

    pub fn remove(&self, id: &str) -> Result<(), CoreError> {
        let mut all = self.list()?;
        let before = all.len();
        all.retain(|c| c.id != id);
        if all.len() == before {
            return Err(CoreError::not_found("conversation", id));
        }
        save_json(self.store.as_ref(), CONVERSATIONS_KEY, &all)
    }

    /// Appends to the history and bumps `updated_at`.
    pub fn append_message(&self, id: &str, message: Message) -> Result<(), CoreError> {
        self.modify(id, |c| {
            c.messages.push(message);
            c.updated_at = now_millis();
        })
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("conversation name must not be empty".into()));
        }
        self.modify(id, |c| {
            c.name = name.to_string();
            c.updated_at = now_millis();
        })
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut Conversation)) -> Result<(), CoreError> {
        let mut all = self.list()?;
        let slot = all
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CoreError::not_found("conversation", id))?;
        f(slot);
        save_json(self.store.as_ref(), CONVERSATIONS_KEY, &all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::storage::StoreConfig;

    fn repo() -> ConversationRepository {
        ConversationRepository::new(StoreConfig::Memory.open().unwrap())
    }

    fn conversation(id: &str, user: &str, app: &str, updated_at: i64) -> Conversation {
        let mut c = Conversation::new(id, app, user, "hello there");
        c.updated_at = updated_at;
        c
    }

    #[test]
    fn list_for_filters_and_sorts_newest_first() {
        let repo = repo();
        repo.add(conversation("c-1", "u", "a", 10)).unwrap();
        repo.add(conversation("c-2", "u", "a", 30)).unwrap();
        repo.add(conversation("c-3", "u", "b", 40)).unwrap();
        repo.add(conversation("c-4", "v", "a", 50)).unwrap();

        let ids: Vec<_> = repo
            .list_for("u", "a")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["c-2", "c-1"]);
    }

    #[test]
    fn append_message_bumps_updated_at() {
        let repo = repo();
        repo.add(conversation("c-1", "u", "a", 0)).unwrap();
        repo.append_message("c-1", Message::new(Role::User, "c-1", "hi"))
            .unwrap();
        repo.append_message("c-1", Message::new(Role::Assistant, "c-1", "hello"))
            .unwrap();

        let stored = repo.get("c-1").unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].role, Role::Assistant);
        assert!(stored.updated_at > 0);
        assert!(repo.append_message("missing", Message::new(Role::User, "x", "y")).is_err());
    }

    #[test]
    fn rename_update_and_remove() {
        let repo = repo();
        repo.add(conversation("c-1", "u", "a", 0)).unwrap();
        repo.rename("c-1", "  Trip plans ").unwrap();
        assert_eq!(repo.get("c-1").unwrap().name, "Trip plans");
        assert!(repo.rename("c-1", " ").is_err());

        let mut c = repo.get("c-1").unwrap();
        c.messages.clear();
        c.name = "Other".into();
        repo.update(c).unwrap();
        assert_eq!(repo.get("c-1").unwrap().name, "Other");

        repo.remove("c-1").unwrap();
        assert!(matches!(
            repo.get("c-1"),
            Err(CoreError::NotFound { kind: "conversation", .. })
        ));
        assert!(repo.remove("c-1").is_err());
    }

    #[test]
    fn add_replaces_same_id_and_rejects_blank() {
        let repo = repo();
        repo.add(conversation("c-1", "u", "a", 1)).unwrap();
        repo.add(conversation("c-1", "u", "a", 2)).unwrap();
        assert_eq!(repo.list().unwrap().len(), 1);
        assert_eq!(repo.get("c-1").unwrap().updated_at, 2);
        assert!(repo.add(conversation(" ", "u", "a", 0)).is_err());
    }
}
