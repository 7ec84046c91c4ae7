use uuid::Uuid;

use crate::error::Result;
use crate::identity::UserRecord;
use crate::poll::Poll;

/// Storage for registered users.
pub trait UserRepository: Send + Sync {
    /// Persist a new user. Fails with `DuplicateUsername` if the name is
    /// already taken, including when a concurrent registration won the race.
    fn insert(&self, user: &UserRecord) -> Result<()>;

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
}

/// Storage for poll documents.
///
/// `modify` and `remove` are the per-poll serialization points. For a given
/// poll id, implementations must run load, callback and persist for one caller
/// before the next caller loads, and must leave the stored poll unchanged
/// when the callback or the write fails.
pub trait PollRepository: Send + Sync {
    fn insert(&self, poll: &Poll) -> Result<()>;

    fn find(&self, id: Uuid) -> Result<Option<Poll>>;

    /// All polls, newest first.
    fn list_all(&self) -> Result<Vec<Poll>>;

    /// Polls created by `user_id`, newest first.
    fn list_by_creator(&self, user_id: Uuid) -> Result<Vec<Poll>>;

    /// Load poll `id`, apply `mutate`, persist, and return the new state.
    /// Returns `NotFound` if the poll does not exist.
    fn modify(&self, id: Uuid, mutate: &mut dyn FnMut(&mut Poll) -> Result<()>) -> Result<Poll>;

    /// Load poll `id`, run `check`, and hard-delete it if the check passes.
    fn remove(&self, id: Uuid, check: &mut dyn FnMut(&Poll) -> Result<()>) -> Result<()>;
}
