use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PollError, Result};
use crate::identity::UserRef;
use crate::poll::Poll;
use crate::repository::PollRepository;
use crate::voter::Voter;

/// Poll use cases. This is the only layer that knows who the caller is; every
/// data rule lives on [`Poll`].
pub struct PollService {
    polls: Arc<dyn PollRepository>,
}

impl PollService {
    pub fn new(polls: Arc<dyn PollRepository>) -> Self {
        Self { polls }
    }

    pub fn create(&self, caller: &UserRef, question: &str, options: &[String]) -> Result<Poll> {
        let poll = Poll::create(question, options, caller.clone(), Utc::now())?;
        self.polls.insert(&poll)?;

        info!(
            poll_id = %poll.id(),
            creator = %caller.username,
            options = poll.options().len(),
            "Poll created"
        );
        Ok(poll)
    }

    pub fn get(&self, id: Uuid) -> Result<Poll> {
        self.polls.find(id)?.ok_or(PollError::NotFound)
    }

    pub fn list_all(&self) -> Result<Vec<Poll>> {
        self.polls.list_all()
    }

    pub fn list_owned_by(&self, caller: &UserRef) -> Result<Vec<Poll>> {
        self.polls.list_by_creator(caller.id)
    }

    /// Record one vote. A missing or negative index is an invalid option, but
    /// only once the poll is known to exist.
    pub fn vote(&self, id: Uuid, option_index: Option<i64>, voter: &Voter) -> Result<Poll> {
        let index = option_index.and_then(|i| usize::try_from(i).ok());

        let poll = self.polls.modify(id, &mut |poll| {
            let index = index.ok_or(PollError::InvalidOption)?;
            poll.cast_vote(index, voter)
        })?;

        debug!(poll_id = %id, voter = %voter, "Vote recorded");
        Ok(poll)
    }

    pub fn add_option(&self, id: Uuid, caller: &UserRef, text: &str) -> Result<Poll> {
        let poll = self
            .polls
            .modify(id, &mut |poll| poll.add_option(text, caller.id))?;

        info!(poll_id = %id, options = poll.options().len(), "Option added");
        Ok(poll)
    }

    pub fn delete(&self, id: Uuid, caller: &UserRef) -> Result<()> {
        self.polls
            .remove(id, &mut |poll| poll.authorize_delete(caller.id))?;

        info!(poll_id = %id, "Poll deleted");
        Ok(())
    }
}
