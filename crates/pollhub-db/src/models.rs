/// Database row types. These map directly to SQLite rows.
/// Converted into pollhub-core types after the query, so a corrupt value
/// surfaces as a storage error instead of a rusqlite mapping failure.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct PollRow {
    pub id: String,
    pub question: String,
    pub created_by: String,
    pub creator_username: String,
    pub created_at: String,
}

pub struct OptionRow {
    pub poll_id: String,
    pub text: String,
    pub votes: i64,
}

/// A recorded voter: a user id or an anonymous fingerprint, depending on the
/// table it came from.
pub struct VoterRow {
    pub poll_id: String,
    pub voter: String,
}
