//! In-process repositories.
//!
//! Used by tests and by the server when no database path is configured. Each
//! poll sits behind its own mutex, so votes on different polls never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::anyhow;
use uuid::Uuid;

use crate::error::{PollError, Result};
use crate::identity::UserRecord;
use crate::poll::Poll;
use crate::repository::{PollRepository, UserRepository};

/// `None` marks a poll deleted while another caller still held its slot.
type Slot = Arc<Mutex<Option<Poll>>>;

#[derive(Default)]
pub struct MemoryPollRepository {
    polls: RwLock<HashMap<Uuid, Slot>>,
}

impl MemoryPollRepository {
    fn slot(&self, id: Uuid) -> Result<Option<Slot>> {
        let polls = self.polls.read().map_err(|e| anyhow!("Poll map lock poisoned: {}", e))?;
        Ok(polls.get(&id).cloned())
    }

    fn snapshot(&self) -> Result<Vec<Poll>> {
        let slots: Vec<Slot> = {
            let polls = self.polls.read().map_err(|e| anyhow!("Poll map lock poisoned: {}", e))?;
            polls.values().cloned().collect()
        };

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot.lock().map_err(|e| anyhow!("Poll lock poisoned: {}", e))?;
            if let Some(poll) = guard.as_ref() {
                out.push(poll.clone());
            }
        }
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }
}

impl PollRepository for MemoryPollRepository {
    fn insert(&self, poll: &Poll) -> Result<()> {
        let mut polls = self.polls.write().map_err(|e| anyhow!("Poll map lock poisoned: {}", e))?;
        if polls.contains_key(&poll.id()) {
            return Err(PollError::Storage(anyhow!("Duplicate poll id {}", poll.id())));
        }
        polls.insert(poll.id(), Arc::new(Mutex::new(Some(poll.clone()))));
        Ok(())
    }

    fn find(&self, id: Uuid) -> Result<Option<Poll>> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let guard = slot.lock().map_err(|e| anyhow!("Poll lock poisoned: {}", e))?;
        Ok(guard.clone())
    }

    fn list_all(&self) -> Result<Vec<Poll>> {
        self.snapshot()
    }

    fn list_by_creator(&self, user_id: Uuid) -> Result<Vec<Poll>> {
        let mut polls = self.snapshot()?;
        polls.retain(|p| p.is_owned_by(user_id));
        Ok(polls)
    }

    fn modify(&self, id: Uuid, mutate: &mut dyn FnMut(&mut Poll) -> Result<()>) -> Result<Poll> {
        let slot = self.slot(id)?.ok_or(PollError::NotFound)?;
        let mut guard = slot.lock().map_err(|e| anyhow!("Poll lock poisoned: {}", e))?;
        let current = guard.as_ref().ok_or(PollError::NotFound)?;

        // Mutate a copy so a failed callback leaves the stored poll as it was.
        let mut next = current.clone();
        mutate(&mut next)?;
        *guard = Some(next.clone());
        Ok(next)
    }

    fn remove(&self, id: Uuid, check: &mut dyn FnMut(&Poll) -> Result<()>) -> Result<()> {
        let slot = self.slot(id)?.ok_or(PollError::NotFound)?;
        {
            let mut guard = slot.lock().map_err(|e| anyhow!("Poll lock poisoned: {}", e))?;
            let current = guard.as_ref().ok_or(PollError::NotFound)?;
            check(current)?;
            *guard = None;
        }

        let mut polls = self.polls.write().map_err(|e| anyhow!("Poll map lock poisoned: {}", e))?;
        polls.remove(&id);
        Ok(())
    }
}

/// Users keyed by username.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl UserRepository for MemoryUserRepository {
    fn insert(&self, user: &UserRecord) -> Result<()> {
        let mut users = self.users.write().map_err(|e| anyhow!("User map lock poisoned: {}", e))?;
        if users.contains_key(&user.username) {
            return Err(PollError::DuplicateUsername);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().map_err(|e| anyhow!("User map lock poisoned: {}", e))?;
        Ok(users.get(username).cloned())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let users = self.users.read().map_err(|e| anyhow!("User map lock poisoned: {}", e))?;
        Ok(users.values().find(|u| u.id == id).cloned())
    }
}
