//! User profiles and preference tags.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WhatnextError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub visited: Vec<String>,
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default)]
    pub activities_tag: Vec<String>,
    #[serde(default)]
    pub food_and_drinks_tag: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The two preference lists used to personalize a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTags {
    pub activities_tag: Vec<String>,
    pub food_and_drinks_tag: Vec<String>,
}

/// Partial tag update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsUpdate {
    #[serde(default)]
    pub activities_tag: Option<Vec<String>>,
    #[serde(default)]
    pub food_and_drinks_tag: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl TagsUpdate {
    pub fn is_empty(&self) -> bool {
        self.activities_tag.is_none() && self.food_and_drinks_tag.is_none() && self.tags.is_none()
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Applies `update`, returning `false` when the user does not exist.
    async fn update_tags(&self, user_id: &str, update: &TagsUpdate) -> Result<bool>;

    /// Preference tags of a user; unknown users have none.
    async fn get_tags(&self, user_id: &str) -> Result<UserTags> {
        Ok(self
            .get_user(user_id)
            .await?
            .map(|user| UserTags {
                activities_tag: user.activities_tag,
                food_and_drinks_tag: user.food_and_drinks_tag,
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    users: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: RwLock::new(
                users
                    .into_iter()
                    .map(|u| (u.user_id.clone(), u))
                    .collect(),
            ),
        }
    }

    /// Loads a JSON array of user documents.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WhatnextError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let users: Vec<UserProfile> = serde_json::from_str(&raw).map_err(|e| {
            WhatnextError::Storage(format!("Invalid user data in {}: {}", path.display(), e))
        })?;
        info!(count = users.len(), path = %path.display(), "Loaded user profiles");
        Ok(Self::new(users))
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let users = self
            .users
            .read()
            .map_err(|_| WhatnextError::Storage("profile store lock poisoned".to_string()))?;
        Ok(users.get(user_id).cloned())
    }

    async fn update_tags(&self, user_id: &str, update: &TagsUpdate) -> Result<bool> {
        let mut users = self
            .users
            .write()
            .map_err(|_| WhatnextError::Storage("profile store lock poisoned".to_string()))?;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(false);
        };
        if let Some(activities) = &update.activities_tag {
            user.activities_tag = activities.clone();
        }
        if let Some(food) = &update.food_and_drinks_tag {
            user.food_and_drinks_tag = food.clone();
        }
        if let Some(tags) = &update.tags {
            user.tags = Some(tags.clone());
        }
        Ok(true)
    }
}
