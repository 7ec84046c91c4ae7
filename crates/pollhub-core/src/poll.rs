use std::collections::BTreeSet;

use anyhow::anyhow;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use pollhub_types::api::{CreatorResponse, PollOptionResponse, PollResponse};

use crate::error::{PollError, Result};
use crate::identity::UserRef;
use crate::voter::{Fingerprint, Voter};

pub const QUESTION_MIN_LEN: usize = 5;
pub const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    text: String,
    votes: u64,
}

impl PollOption {
    fn new(text: String) -> Self {
        Self { text, votes: 0 }
    }

    /// Rebuild an option from storage. Counts are checked when the owning
    /// poll is restored.
    pub fn restore(text: impl Into<String>, votes: u64) -> Self {
        Self {
            text: text.into(),
            votes,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn votes(&self) -> u64 {
        self.votes
    }
}

/// Raw fields of a stored poll, handed to [`Poll::restore`].
#[derive(Debug, Clone)]
pub struct PollParts {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_by: UserRef,
    pub created_at: DateTime<Utc>,
    pub voted_by: BTreeSet<Uuid>,
    pub voted_ips: BTreeSet<Fingerprint>,
}

/// The poll aggregate.
///
/// All fields are private so that the invariants below can only be changed
/// through the methods on this type:
///
/// - there are always at least [`MIN_OPTIONS`] options;
/// - options are append-only, so an index stays valid forever;
/// - every accepted vote increments exactly one counter and records exactly
///   one voter, so `total_votes() == voted_by.len() + voted_ips.len()`;
/// - `created_by` never changes.
///
/// Every mutating method either applies fully or returns an error with the
/// poll untouched.
#[derive(Debug, Clone)]
pub struct Poll {
    id: Uuid,
    question: String,
    options: Vec<PollOption>,
    created_by: UserRef,
    created_at: DateTime<Utc>,
    voted_by: BTreeSet<Uuid>,
    voted_ips: BTreeSet<Fingerprint>,
}

impl Poll {
    /// Validate and build a fresh poll. Option texts are trimmed and blank
    /// ones are dropped before counting. `now` is cut to microseconds, the
    /// precision every store keeps.
    pub fn create<I, S>(
        question: &str,
        options: I,
        creator: UserRef,
        now: DateTime<Utc>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let question = question.trim();
        if question.chars().count() < QUESTION_MIN_LEN {
            return Err(PollError::validation(format!(
                "Question must be at least {} characters long",
                QUESTION_MIN_LEN
            )));
        }

        let options: Vec<PollOption> = options
            .into_iter()
            .map(|text| text.as_ref().trim().to_string())
            .filter(|text| !text.is_empty())
            .map(PollOption::new)
            .collect();

        if options.len() < MIN_OPTIONS {
            return Err(PollError::validation(format!(
                "A poll must have at least {} non-empty options",
                MIN_OPTIONS
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            question: question.to_string(),
            options,
            created_by: creator,
            created_at: now.trunc_subsecs(6),
            voted_by: BTreeSet::new(),
            voted_ips: BTreeSet::new(),
        })
    }

    /// Rehydrate a poll from storage. A document that breaks an invariant is
    /// reported as a storage failure rather than silently served.
    pub fn restore(parts: PollParts) -> Result<Self> {
        if parts.options.len() < MIN_OPTIONS {
            return Err(PollError::Storage(anyhow!(
                "Corrupt poll {}: only {} options",
                parts.id,
                parts.options.len()
            )));
        }

        let tally: u64 = parts.options.iter().map(|o| o.votes).sum();
        let voters = (parts.voted_by.len() + parts.voted_ips.len()) as u64;
        if tally != voters {
            return Err(PollError::Storage(anyhow!(
                "Corrupt poll {}: {} votes counted but {} voters recorded",
                parts.id,
                tally,
                voters
            )));
        }

        Ok(Self {
            id: parts.id,
            question: parts.question,
            options: parts.options,
            created_by: parts.created_by,
            created_at: parts.created_at,
            voted_by: parts.voted_by,
            voted_ips: parts.voted_ips,
        })
    }

    /// Accept one vote for `option_index` from `voter`.
    ///
    /// The index is checked first, then the voter. On success the counter
    /// and the voter set change together.
    pub fn cast_vote(&mut self, option_index: usize, voter: &Voter) -> Result<()> {
        if option_index >= self.options.len() {
            return Err(PollError::InvalidOption);
        }
        if self.has_voted(voter) {
            return Err(PollError::AlreadyVoted);
        }

        match voter {
            Voter::User(id) => self.voted_by.insert(*id),
            Voter::Anonymous(fp) => self.voted_ips.insert(fp.clone()),
        };
        self.options[option_index].votes += 1;

        Ok(())
    }

    /// Append an option. Only the creator may do this; existing indices and
    /// counts are never touched.
    pub fn add_option(&mut self, text: &str, requester: Uuid) -> Result<()> {
        self.ensure_owner(requester)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(PollError::validation("New option text cannot be empty."));
        }

        self.options.push(PollOption::new(text.to_string()));
        Ok(())
    }

    /// Check that `requester` may delete this poll.
    pub fn authorize_delete(&self, requester: Uuid) -> Result<()> {
        self.ensure_owner(requester)
    }

    fn ensure_owner(&self, requester: Uuid) -> Result<()> {
        if self.is_owned_by(requester) {
            Ok(())
        } else {
            Err(PollError::Forbidden)
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.created_by.id == user_id
    }

    pub fn has_voted(&self, voter: &Voter) -> bool {
        match voter {
            Voter::User(id) => self.voted_by.contains(id),
            Voter::Anonymous(fp) => self.voted_ips.contains(fp),
        }
    }

    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    pub fn created_by(&self) -> &UserRef {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn voted_by(&self) -> &BTreeSet<Uuid> {
        &self.voted_by
    }

    pub fn voted_ips(&self) -> &BTreeSet<Fingerprint> {
        &self.voted_ips
    }
}

impl From<&Poll> for PollResponse {
    fn from(poll: &Poll) -> Self {
        PollResponse {
            id: poll.id,
            question: poll.question.clone(),
            options: poll
                .options
                .iter()
                .map(|o| PollOptionResponse {
                    text: o.text.clone(),
                    votes: o.votes,
                })
                .collect(),
            created_by: CreatorResponse {
                id: poll.created_by.id,
                username: poll.created_by.username.clone(),
            },
            created_at: poll.created_at,
            total_votes: poll.total_votes(),
        }
    }
}
