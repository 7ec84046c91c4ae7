use std::collections::{BTreeSet, HashMap};

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, TransactionBehavior, params};
use uuid::Uuid;

use pollhub_core::poll::{PollOption, PollParts};
use pollhub_core::{Fingerprint, Poll, PollError, PollRepository, Result, UserRef};

use crate::Database;
use crate::models::{OptionRow, PollRow, VoterRow};

/// Which polls a load touches. Every query in [`load_polls`] filters through
/// the same clause so heads, options and voters stay consistent.
enum Scope {
    All,
    Creator(Uuid),
    Poll(Uuid),
}

impl Scope {
    fn clause(&self) -> &'static str {
        match self {
            Scope::All => "?1 IS NULL",
            Scope::Creator(_) => "p.created_by = ?1",
            Scope::Poll(_) => "p.id = ?1",
        }
    }

    fn param(&self) -> Option<String> {
        match self {
            Scope::All => None,
            Scope::Creator(id) | Scope::Poll(id) => Some(id.to_string()),
        }
    }
}

impl PollRepository for Database {
    fn insert(&self, poll: &Poll) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO polls (id, question, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    poll.id().to_string(),
                    poll.question(),
                    poll.created_by().id.to_string(),
                    format_timestamp(poll.created_at()),
                ],
            )?;
            persist_changes(&tx, None, poll)?;
            tx.commit()?;
            Ok(())
        })?;
        Ok(())
    }

    fn find(&self, id: Uuid) -> Result<Option<Poll>> {
        let mut polls = self.with_conn(|conn| load_polls(conn, &Scope::Poll(id)))?;
        Ok(polls.pop())
    }

    fn list_all(&self) -> Result<Vec<Poll>> {
        Ok(self.with_conn(|conn| load_polls(conn, &Scope::All))?)
    }

    fn list_by_creator(&self, user_id: Uuid) -> Result<Vec<Poll>> {
        Ok(self.with_conn(|conn| load_polls(conn, &Scope::Creator(user_id)))?)
    }

    fn modify(&self, id: Uuid, mutate: &mut dyn FnMut(&mut Poll) -> Result<()>) -> Result<Poll> {
        self.with_conn_mut(|conn| {
            // IMMEDIATE takes the write lock before the read, so no other
            // writer can slip in between the check and the update.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(before) = load_polls(&tx, &Scope::Poll(id))?.pop() else {
                return Ok(Err(PollError::NotFound));
            };

            let mut after = before.clone();
            if let Err(e) = mutate(&mut after) {
                // Dropping the transaction rolls it back.
                return Ok(Err(e));
            }

            persist_changes(&tx, Some(&before), &after)?;
            tx.commit()?;
            Ok(Ok(after))
        })?
    }

    fn remove(&self, id: Uuid, check: &mut dyn FnMut(&Poll) -> Result<()>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(poll) = load_polls(&tx, &Scope::Poll(id))?.pop() else {
                return Ok(Err(PollError::NotFound));
            };
            if let Err(e) = check(&poll) {
                return Ok(Err(e));
            }

            // Options and voters go with it via ON DELETE CASCADE.
            tx.execute("DELETE FROM polls WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(Ok(()))
        })?
    }
}

/// Write the difference between `before` and `after`. New voters are plain
/// INSERTs, so the voter tables' primary keys reject a duplicate vote even if
/// a caller bypassed the aggregate.
fn persist_changes(conn: &Connection, before: Option<&Poll>, after: &Poll) -> anyhow::Result<()> {
    let poll_id = after.id().to_string();
    let old_options = before.map(Poll::options).unwrap_or_default();

    for (position, option) in after.options().iter().enumerate() {
        let votes = i64::try_from(option.votes())?;
        match old_options.get(position) {
            Some(old) if old == option => {}
            Some(_) => {
                conn.execute(
                    "UPDATE poll_options SET votes = ?3 WHERE poll_id = ?1 AND position = ?2",
                    params![poll_id, position as i64, votes],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO poll_options (poll_id, position, text, votes) VALUES (?1, ?2, ?3, ?4)",
                    params![poll_id, position as i64, option.text(), votes],
                )?;
            }
        }
    }

    let empty_users = BTreeSet::new();
    let old_users = before.map(Poll::voted_by).unwrap_or(&empty_users);
    for user_id in after.voted_by().difference(old_users) {
        conn.execute(
            "INSERT INTO poll_user_votes (poll_id, user_id) VALUES (?1, ?2)",
            params![poll_id, user_id.to_string()],
        )?;
    }

    let empty_ips = BTreeSet::new();
    let old_ips = before.map(Poll::voted_ips).unwrap_or(&empty_ips);
    for fingerprint in after.voted_ips().difference(old_ips) {
        conn.execute(
            "INSERT INTO poll_anon_votes (poll_id, fingerprint) VALUES (?1, ?2)",
            params![poll_id, fingerprint.as_str()],
        )?;
    }

    Ok(())
}

/// Load every poll in `scope`, newest first, in four queries regardless of
/// how many polls match.
fn load_polls(conn: &Connection, scope: &Scope) -> anyhow::Result<Vec<Poll>> {
    let clause = scope.clause();
    let param = scope.param();

    // LEFT JOIN so a missing creator row shows up as a corrupt poll instead
    // of silently hiding it.
    let mut stmt = conn.prepare(&format!(
        "SELECT p.id, p.question, p.created_by, u.username, p.created_at
         FROM polls p
         LEFT JOIN users u ON p.created_by = u.id
         WHERE {}
         ORDER BY p.created_at DESC, p.id",
        clause
    ))?;
    let heads = stmt
        .query_map([&param], |row| {
            Ok(PollRow {
                id: row.get(0)?,
                question: row.get(1)?,
                created_by: row.get(2)?,
                creator_username: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if heads.is_empty() {
        return Ok(vec![]);
    }

    let mut options: HashMap<String, Vec<OptionRow>> = HashMap::new();
    let mut stmt = conn.prepare(&format!(
        "SELECT o.poll_id, o.text, o.votes
         FROM poll_options o
         JOIN polls p ON p.id = o.poll_id
         WHERE {}
         ORDER BY o.poll_id, o.position",
        clause
    ))?;
    let rows = stmt.query_map([&param], |row| {
        Ok(OptionRow {
            poll_id: row.get(0)?,
            text: row.get(1)?,
            votes: row.get(2)?,
        })
    })?;
    for row in rows {
        let row = row?;
        options.entry(row.poll_id.clone()).or_default().push(row);
    }

    let user_votes = load_voters(conn, "poll_user_votes", "user_id", clause, &param)?;
    let anon_votes = load_voters(conn, "poll_anon_votes", "fingerprint", clause, &param)?;

    heads
        .into_iter()
        .map(|head| {
            let option_rows = options.remove(&head.id).unwrap_or_default();
            let voted_by = user_votes
                .get(&head.id)
                .into_iter()
                .flatten()
                .map(|v| Uuid::parse_str(v))
                .collect::<std::result::Result<BTreeSet<_>, _>>()?;
            let voted_ips = anon_votes
                .get(&head.id)
                .into_iter()
                .flatten()
                .map(Fingerprint::from_stored)
                .collect();
            assemble(head, option_rows, voted_by, voted_ips)
        })
        .collect()
}

fn load_voters(
    conn: &Connection,
    table: &str,
    column: &str,
    clause: &str,
    param: &Option<String>,
) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT v.poll_id, v.{column}
         FROM {table} v
         JOIN polls p ON p.id = v.poll_id
         WHERE {clause}"
    ))?;
    let rows = stmt.query_map([param], |row| {
        Ok(VoterRow {
            poll_id: row.get(0)?,
            voter: row.get(1)?,
        })
    })?;

    let mut voters: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let row = row?;
        voters.entry(row.poll_id).or_default().push(row.voter);
    }
    Ok(voters)
}

fn assemble(
    head: PollRow,
    option_rows: Vec<OptionRow>,
    voted_by: BTreeSet<Uuid>,
    voted_ips: BTreeSet<Fingerprint>,
) -> anyhow::Result<Poll> {
    if head.creator_username.is_empty() {
        return Err(anyhow!("Poll {} references missing user {}", head.id, head.created_by));
    }

    let options = option_rows
        .into_iter()
        .map(|row| -> anyhow::Result<PollOption> {
            Ok(PollOption::restore(row.text, u64::try_from(row.votes)?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let parts = PollParts {
        id: Uuid::parse_str(&head.id)?,
        question: head.question,
        options,
        created_by: UserRef {
            id: Uuid::parse_str(&head.created_by)?,
            username: head.creator_username,
        },
        created_at: parse_timestamp(&head.created_at)?,
        voted_by,
        voted_ips,
    };

    Poll::restore(parts).map_err(|e| match e {
        PollError::Storage(inner) => inner,
        other => anyhow::Error::from(other),
    })
}

/// Fixed-width UTC timestamps so that ORDER BY on the text column is
/// chronological.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Barrier};

    use chrono::Duration;
    use pollhub_core::{UserRecord, UserRepository, Voter};

    use super::*;

    fn db_with_user(name: &str) -> (Database, UserRef) {
        let db = Database::open_in_memory().unwrap();
        let user = add_user(&db, name);
        (db, user)
    }

    fn add_user(db: &Database, name: &str) -> UserRef {
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: name.to_string(),
            password_digest: "digest".into(),
            created_at: Utc::now(),
        };
        UserRepository::insert(db, &record).unwrap();
        record.to_ref()
    }

    fn new_poll(db: &Database, owner: &UserRef, question: &str) -> Poll {
        let poll = Poll::create(question, ["red", "blue"], owner.clone(), Utc::now()).unwrap();
        PollRepository::insert(db, &poll).unwrap();
        poll
    }

    fn anon(last: u8) -> Voter {
        Voter::Anonymous(Fingerprint::from_ip(IpAddr::V4(Ipv4Addr::new(172, 16, 0, last))))
    }

    #[test]
    fn insert_and_find_round_trip() {
        let (db, owner) = db_with_user("ivan");
        let poll = new_poll(&db, &owner, "Favourite colour?");

        let found = db.find(poll.id()).unwrap().unwrap();
        assert_eq!(found.question(), "Favourite colour?");
        assert_eq!(found.created_by(), &owner);
        assert_eq!(found.options(), poll.options());
        assert_eq!(found.created_at(), poll.created_at());

        assert!(db.find(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn votes_and_options_persist() {
        let (db, owner) = db_with_user("judy");
        let voter = add_user(&db, "ken");
        let poll = new_poll(&db, &owner, "Favourite colour?");

        db.modify(poll.id(), &mut |p| p.cast_vote(1, &Voter::User(voter.id))).unwrap();
        db.modify(poll.id(), &mut |p| p.cast_vote(0, &anon(1))).unwrap();
        db.modify(poll.id(), &mut |p| p.add_option("green", owner.id)).unwrap();

        let stored = db.find(poll.id()).unwrap().unwrap();
        let tallies: Vec<u64> = stored.options().iter().map(PollOption::votes).collect();
        assert_eq!(tallies, vec![1, 1, 0]);
        assert_eq!(stored.options()[2].text(), "green");
        assert!(stored.has_voted(&Voter::User(voter.id)));
        assert!(stored.has_voted(&anon(1)));
    }

    #[test]
    fn rejected_mutation_rolls_back() {
        let (db, owner) = db_with_user("leo");
        let poll = new_poll(&db, &owner, "Favourite colour?");

        let err = db
            .modify(poll.id(), &mut |p| {
                p.cast_vote(0, &anon(2))?;
                Err(PollError::Forbidden)
            })
            .unwrap_err();
        assert!(matches!(err, PollError::Forbidden));

        let stored = db.find(poll.id()).unwrap().unwrap();
        assert_eq!(stored.total_votes(), 0);
        assert!(stored.voted_ips().is_empty());
    }

    #[test]
    fn missing_poll_is_not_found() {
        let (db, owner) = db_with_user("mia");
        assert!(matches!(db.modify(Uuid::new_v4(), &mut |_| Ok(())), Err(PollError::NotFound)));
        assert!(matches!(db.remove(Uuid::new_v4(), &mut |_| Ok(())), Err(PollError::NotFound)));
        assert!(db.list_by_creator(owner.id).unwrap().is_empty());
    }

    #[test]
    fn concurrent_duplicate_votes_accept_one() {
        let (db, owner) = db_with_user("nina");
        let poll = new_poll(&db, &owner, "Favourite colour?");
        let db = Arc::new(db);
        let barrier = Arc::new(Barrier::new(6));
        let voter = anon(3);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let db = db.clone();
                let barrier = barrier.clone();
                let voter = voter.clone();
                let id = poll.id();
                std::thread::spawn(move || {
                    barrier.wait();
                    db.modify(id, &mut |p| p.cast_vote(1, &voter))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(PollError::AlreadyVoted))));

        let stored = db.find(poll.id()).unwrap().unwrap();
        assert_eq!(stored.options()[1].votes(), 1);
        assert_eq!(stored.total_votes(), 1);
    }

    #[test]
    fn voter_primary_key_backstops_duplicates() {
        let (db, owner) = db_with_user("olga");
        let poll = new_poll(&db, &owner, "Favourite colour?");
        db.modify(poll.id(), &mut |p| p.cast_vote(0, &anon(4))).unwrap();

        let stored = db.find(poll.id()).unwrap().unwrap();
        let fingerprint = stored.voted_ips().iter().next().unwrap().clone();
        let duplicate = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO poll_anon_votes (poll_id, fingerprint) VALUES (?1, ?2)",
                params![poll.id().to_string(), fingerprint.as_str()],
            )?;
            Ok(())
        });
        assert!(duplicate.is_err());
    }

    #[test]
    fn remove_cascades() {
        let (db, owner) = db_with_user("pete");
        let poll = new_poll(&db, &owner, "Favourite colour?");
        db.modify(poll.id(), &mut |p| p.cast_vote(0, &anon(5))).unwrap();

        let err = db.remove(poll.id(), &mut |_| Err(PollError::Forbidden)).unwrap_err();
        assert!(matches!(err, PollError::Forbidden));
        assert!(db.find(poll.id()).unwrap().is_some());

        db.remove(poll.id(), &mut |p| p.authorize_delete(owner.id)).unwrap();
        assert!(db.find(poll.id()).unwrap().is_none());

        let leftovers: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM poll_options) + (SELECT COUNT(*) FROM poll_anon_votes)",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn listings_filter_and_order() {
        let (db, alice) = db_with_user("quinn");
        let bob = add_user(&db, "rosa");
        let now = Utc::now();

        for (offset, owner, question) in [
            (0, &alice, "Alice first"),
            (1, &bob, "Bob only"),
            (2, &alice, "Alice second"),
        ] {
            let poll = Poll::create(question, ["a", "b"], owner.clone(), now + Duration::seconds(offset))
                .unwrap();
            PollRepository::insert(&db, &poll).unwrap();
        }

        let all: Vec<String> = db.list_all().unwrap().iter().map(|p| p.question().to_string()).collect();
        assert_eq!(all, vec!["Alice second", "Bob only", "Alice first"]);

        let mine = db.list_by_creator(alice.id).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|p| p.created_by().username == "quinn"));
    }

    #[test]
    fn corrupt_tally_is_a_storage_error() {
        let (db, owner) = db_with_user("sam");
        let poll = new_poll(&db, &owner, "Favourite colour?");
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE poll_options SET votes = 5 WHERE poll_id = ?1 AND position = 0",
                [poll.id().to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(db.find(poll.id()), Err(PollError::Storage(_))));
    }
}
