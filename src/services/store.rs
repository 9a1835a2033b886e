use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Story, StoredStory};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,
}

struct OwnedStory {
    owner: String,
    stored: StoredStory,
}

/// In-process account and story storage. Each call holds the lock for the
/// whole operation, so single writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, String>>,
    stories: RwLock<Vec<OwnedStory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, email: &str, password_hash: String) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }
        users.insert(email.to_string(), password_hash);
        Ok(())
    }

    pub async fn password_hash(&self, email: &str) -> Option<String> {
        self.users.read().await.get(email).cloned()
    }

    pub async fn save_story(&self, owner: &str, story: Story) -> StoredStory {
        let stored = StoredStory {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            story,
        };
        self.stories.write().await.push(OwnedStory {
            owner: owner.to_string(),
            stored: stored.clone(),
        });
        stored
    }

    /// Newest first; equal timestamps keep the later insert first.
    pub async fn list_stories(&self, owner: &str, limit: usize) -> Vec<StoredStory> {
        let stories = self.stories.read().await;
        let mut owned: Vec<StoredStory> = stories
            .iter()
            .rev()
            .filter(|s| s.owner == owner)
            .map(|s| s.stored.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        owned
    }
}
