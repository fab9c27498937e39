//! Domain helpers
//!
//! Thin wrappers that fix the key namespace, tags and TTL for the
//! application's cached entities. They add no behaviour beyond the core
//! operations on [`CacheManager`].
//!
//! | Helper | Key | Tags | L2 TTL |
//! |---|---|---|---|
//! | `cache_user` | `user:{id}` | `user`, `user:{id}` | user TTL |
//! | `cache_session` | `session:{id}` | `session` | session TTL |
//! | `cache_jobs` | `jobs:{id}` | `jobs` | jobs TTL |
//! | `cache_referrals` | `referrals:{user}` | `referrals`, `referrals:{user}`, `user:{user}` | user TTL |
//!
//! L1 TTLs are clamped to the L1 ceiling as for every other write.

use std::fmt::Display;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache_manager::{CacheManager, CacheOptions, InvalidationCount};
use crate::keys::KeyType;

fn domain_options(ttl: Duration, tags: Vec<String>) -> CacheOptions {
    CacheOptions::new().ttl(ttl).tags(tags)
}

fn user_tags(user_id: &impl Display) -> Vec<String> {
    vec![KeyType::User.to_string(), KeyType::User.key(user_id)]
}

fn referral_tags(user_id: &impl Display) -> Vec<String> {
    vec![
        KeyType::Referrals.to_string(),
        KeyType::Referrals.key(user_id),
        KeyType::User.key(user_id),
    ]
}

impl CacheManager {
    pub async fn cache_user<T>(&self, user_id: impl Display, user: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let opts = domain_options(self.ttl_config().user, user_tags(&user_id));
        self.set(&KeyType::User.key(user_id), user, &opts).await
    }

    pub async fn get_user<T: DeserializeOwned>(&self, user_id: impl Display) -> Option<T> {
        let opts = domain_options(self.ttl_config().user, user_tags(&user_id));
        self.get(&KeyType::User.key(user_id), &opts).await
    }

    /// Drop the user and everything tagged with them (e.g. their referral list)
    pub async fn invalidate_user(&self, user_id: impl Display) -> InvalidationCount {
        let user_key = KeyType::User.key(&user_id);
        let l1 = self.l1().invalidate_by_tag(&user_key);

        // L2 has no tags: remove the keys the user tag covers explicitly
        let l2_keys = [user_key, KeyType::Referrals.key(&user_id)];
        let l2 = self.l2().delete_many(&l2_keys, None).await;

        debug!(user_id = %user_id, l1, l2, "Invalidated user");
        InvalidationCount { l1, l2 }
    }

    pub async fn cache_session<T>(&self, session_id: impl Display, data: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let opts = domain_options(self.ttl_config().session, vec![KeyType::Session.to_string()]);
        self.set(&KeyType::Session.key(session_id), data, &opts).await
    }

    pub async fn get_session<T: DeserializeOwned>(&self, session_id: impl Display) -> Option<T> {
        let opts = domain_options(self.ttl_config().session, vec![KeyType::Session.to_string()]);
        self.get(&KeyType::Session.key(session_id), &opts).await
    }

    /// Remove a session from both tiers (logout, revocation)
    pub async fn invalidate_session(&self, session_id: impl Display) -> bool {
        self.delete(&KeyType::Session.key(session_id)).await
    }

    /// Cache a job listing under a caller-chosen identifier (e.g. a filter hash)
    pub async fn cache_jobs<T>(&self, identifier: impl Display, jobs: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let opts = domain_options(self.ttl_config().jobs, vec![KeyType::Jobs.to_string()]);
        self.set(&KeyType::Jobs.key(identifier), jobs, &opts).await
    }

    pub async fn get_jobs<T: DeserializeOwned>(&self, identifier: impl Display) -> Option<T> {
        let opts = domain_options(self.ttl_config().jobs, vec![KeyType::Jobs.to_string()]);
        self.get(&KeyType::Jobs.key(identifier), &opts).await
    }

    /// Drop every cached job listing from both tiers
    pub async fn invalidate_jobs(&self) -> InvalidationCount {
        let tagged = self.invalidate_by_tag(KeyType::Jobs.as_str());
        let by_pattern = self.invalidate_by_pattern(&KeyType::Jobs.key("*")).await;
        InvalidationCount {
            l1: tagged.l1 + by_pattern.l1,
            l2: by_pattern.l2,
        }
    }

    pub async fn cache_referrals<T>(&self, user_id: impl Display, referrals: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        let opts = domain_options(self.ttl_config().user, referral_tags(&user_id));
        self.set(&KeyType::Referrals.key(user_id), referrals, &opts).await
    }

    pub async fn get_referrals<T: DeserializeOwned>(&self, user_id: impl Display) -> Option<T> {
        let opts = domain_options(self.ttl_config().user, referral_tags(&user_id));
        self.get(&KeyType::Referrals.key(user_id), &opts).await
    }
}
