//! Bot users: created on first contact, never deleted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use shopkeep_core::{Entity, UserId};

use crate::i18n::Language;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("user {0} not found")]
    NotFound(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub language: Language,
    pub order_count: u32,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub blocked: bool,
}

impl UserProfile {
    /// How to address the user: `@handle` or the numeric id.
    pub fn display_name(&self) -> String {
        match &self.handle {
            Some(h) => format!("@{h}"),
            None => self.id.to_string(),
        }
    }
}

impl Entity for UserProfile {
    type Id = UserId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Everyone who ever wrote to the bot.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inbound message. Creates the user on first contact (language
    /// taken from the client's locale) and returns `(profile, created)`.
    pub fn touch(
        &self,
        id: UserId,
        handle: Option<&str>,
        language_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> (UserProfile, bool) {
        let handle = handle.map(str::trim).filter(|h| !h.is_empty()).map(str::to_string);
        let mut created = false;
        let mut entry = self.users.entry(id).or_insert_with(|| {
            created = true;
            UserProfile {
                id,
                handle: None,
                language: Language::from_client_code(language_code),
                order_count: 0,
                joined_at: now,
                last_seen: now,
                blocked: false,
            }
        });
        if handle.is_some() {
            entry.handle = handle;
        }
        entry.last_seen = entry.last_seen.max(now);
        let profile = entry.clone();
        drop(entry);

        if created {
            info!(user_id = %id, language = %profile.language, "user registered");
        }
        (profile, created)
    }

    pub fn get(&self, id: UserId) -> Option<UserProfile> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub fn language(&self, id: UserId) -> Language {
        self.users.get(&id).map(|u| u.language).unwrap_or_default()
    }

    pub fn set_language(&self, id: UserId, language: Language) -> Result<UserProfile, UserError> {
        self.modify(id, |u| u.language = language)
    }

    pub fn set_blocked(&self, id: UserId, blocked: bool) -> Result<UserProfile, UserError> {
        let profile = self.modify(id, |u| u.blocked = blocked)?;
        info!(user_id = %id, blocked, "user block flag changed");
        Ok(profile)
    }

    pub fn record_order(&self, id: UserId) -> Result<UserProfile, UserError> {
        self.modify(id, |u| u.order_count = u.order_count.saturating_add(1))
    }

    fn modify(&self, id: UserId, f: impl FnOnce(&mut UserProfile)) -> Result<UserProfile, UserError> {
        let mut user = self.users.get_mut(&id).ok_or(UserError::NotFound(id))?;
        f(&mut user);
        Ok(user.clone())
    }

    /// All users, ascending by id.
    pub fn list(&self) -> Vec<UserProfile> {
        let mut users: Vec<_> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_767_000_000, 0).unwrap()
    }

    #[test]
    fn first_touch_registers_with_client_language() {
        let users = UserDirectory::new();
        let (profile, created) = users.touch(UserId::new(5), Some("anna"), Some("pl"), now());
        assert!(created);
        assert_eq!(profile.language, Language::Pl);
        assert_eq!(profile.display_name(), "@anna");

        let (again, created) = users.touch(UserId::new(5), None, Some("ru"), now());
        assert!(!created);
        // Language is chosen once; later locales do not override it.
        assert_eq!(again.language, Language::Pl);
        assert_eq!(again.handle.as_deref(), Some("anna"));
    }

    #[test]
    fn block_and_order_count() {
        let users = UserDirectory::new();
        users.touch(UserId::new(1), None, None, now());

        assert!(users.set_blocked(UserId::new(1), true).unwrap().blocked);
        assert_eq!(users.record_order(UserId::new(1)).unwrap().order_count, 1);
        assert_eq!(
            users.set_blocked(UserId::new(2), true),
            Err(UserError::NotFound(UserId::new(2)))
        );
        assert_eq!(users.count(), 1);
    }
}
