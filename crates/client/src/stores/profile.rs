//! Profile cache keyed by username.
//!
//! Profiles are fetched on first lookup and kept for the whole session.
//! Push events may patch them in place; nothing is ever evicted.

use std::collections::HashMap;

use claw_shared::Profile;

#[derive(Debug, Default, Clone)]
pub struct ProfileCache {
    profiles: HashMap<String, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<&Profile> {
        self.profiles.get(username)
    }

    /// Cache a fetched profile under `username`. A later fetch for the same
    /// name overwrites the earlier one.
    pub fn insert(&mut self, username: &str, profile: Profile) {
        self.profiles.insert(username.to_string(), profile);
    }

    /// Set the follower count of a cached profile. Returns false if the
    /// profile has not been fetched yet, in which case nothing is stored.
    pub fn set_followers(&mut self, username: &str, followers: u64) -> bool {
        match self.profiles.get_mut(username) {
            Some(profile) => {
                profile.followers = followers;
                true
            }
            None => false,
        }
    }

    /// Record whether the viewer follows `username`, moving the follower
    /// count by one when the state actually changes. Returns false if the
    /// profile is not cached.
    pub fn set_followed(&mut self, username: &str, followed: bool) -> bool {
        let Some(profile) = self.profiles.get_mut(username) else {
            return false;
        };
        if profile.followed != followed {
            profile.followers = if followed {
                profile.followers.saturating_add(1)
            } else {
                profile.followers.saturating_sub(1)
            };
            profile.followed = followed;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
