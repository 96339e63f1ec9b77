use std::collections::BTreeMap;
use std::future;
use std::time::Duration;

use moka::Entry;
use moka::future::Cache;

/// Answers of one voter, question id -> response option id.
pub type Answers = BTreeMap<i64, i64>;

/// Per-session ballot state: the selected delegation and unsubmitted answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BallotSession {
    active_delegation_id: Option<i64>,
    /// election id -> voter uid -> answers
    votes_buffer: BTreeMap<i64, BTreeMap<String, Answers>>,
}

impl BallotSession {
    /// A fresh ballot flow forgets the previously selected delegation.
    pub fn begin(&mut self) {
        self.active_delegation_id = None;
    }

    /// The request parameter wins and is remembered; otherwise the stored selection applies.
    pub fn select_delegation(&mut self, requested: Option<i64>) -> Option<i64> {
        if requested.is_some() {
            self.active_delegation_id = requested;
        }
        self.active_delegation_id
    }

    pub fn clear_delegation(&mut self) {
        self.active_delegation_id = None;
    }

    /// Stores the delegation the last resolution settled on, `None` included.
    pub fn remember_delegation(&mut self, delegation_id: Option<i64>) {
        self.active_delegation_id = delegation_id;
    }

    #[cfg(test)]
    pub fn active_delegation_id(&self) -> Option<i64> {
        self.active_delegation_id
    }

    pub fn buffer_answer(
        &mut self,
        election_id: i64,
        voter_uid: &str,
        question_id: i64,
        response_option_id: i64,
    ) {
        self.votes_buffer
            .entry(election_id)
            .or_default()
            .entry(voter_uid.to_string())
            .or_default()
            .insert(question_id, response_option_id);
    }

    pub fn answers(&self, election_id: i64, voter_uid: &str) -> Answers {
        self.votes_buffer
            .get(&election_id)
            .and_then(|voters| voters.get(voter_uid))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_answered(&self, election_id: i64, voter_uid: &str, question_id: i64) -> bool {
        self.votes_buffer
            .get(&election_id)
            .and_then(|voters| voters.get(voter_uid))
            .is_some_and(|answers| answers.contains_key(&question_id))
    }

    /// Drops the submitted answers; answers changed since the submission stay buffered.
    pub fn discard_answers(&mut self, election_id: i64, voter_uid: &str, submitted: &Answers) {
        let Some(voters) = self.votes_buffer.get_mut(&election_id) else {
            return;
        };
        if let Some(answers) = voters.get_mut(voter_uid) {
            answers.retain(|question_id, option_id| submitted.get(question_id) != Some(option_id));
            if answers.is_empty() {
                voters.remove(voter_uid);
            }
        }
        if voters.is_empty() {
            self.votes_buffer.remove(&election_id);
        }
    }
}

/// Sessions keyed by the opaque ballot session token, expiring when idle.
pub struct SessionStore {
    sessions: Cache<String, BallotSession>,
}

impl SessionStore {
    pub fn new(max_capacity: u64, idle: Duration) -> Self {
        assert!(max_capacity > 0, "Session store capacity must be positive");
        let sessions = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(idle)
            .build();
        Self { sessions }
    }

    /// Snapshot of the session; changes go through [`SessionStore::update`].
    pub async fn load(&self, token: &str) -> BallotSession {
        self.sessions.get(token).await.unwrap_or_default()
    }

    /// Applies `change` while holding the entry, so concurrent requests on one token
    /// never overwrite each other.
    pub async fn update<F>(&self, token: &str, change: F) -> BallotSession
    where
        F: FnOnce(&mut BallotSession),
    {
        self.sessions
            .entry_by_ref(token)
            .and_upsert_with(|current| {
                let mut session = current.map(Entry::into_value).unwrap_or_default();
                change(&mut session);
                future::ready(session)
            })
            .await
            .into_value()
    }

    pub fn entry_count(&self) -> u64 {
        self.sessions.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn request_parameter_overrides_stored_selection() {
        let mut session = BallotSession::default();
        assert_eq!(session.select_delegation(Some(4)), Some(4));
        assert_eq!(session.select_delegation(None), Some(4));
        assert_eq!(session.select_delegation(Some(9)), Some(9));

        session.begin();
        assert_eq!(session.select_delegation(None), None);
    }

    #[test]
    fn buffers_are_isolated_per_voter() {
        let mut session = BallotSession::default();
        session.buffer_answer(1, "self", 1, 10);
        session.buffer_answer(1, "granter", 1, 11);
        session.buffer_answer(1, "granter", 2, 20);

        assert_eq!(session.answers(1, "self"), BTreeMap::from([(1, 10)]));
        assert!(session.has_answered(1, "granter", 2));
        assert!(!session.has_answered(1, "self", 2));

        let submitted = session.answers(1, "granter");
        session.discard_answers(1, "granter", &submitted);
        assert!(session.answers(1, "granter").is_empty());
        assert_eq!(session.answers(1, "self"), BTreeMap::from([(1, 10)]));
    }

    #[test]
    fn buffers_are_isolated_per_election() {
        let mut session = BallotSession::default();
        session.buffer_answer(1, "voter", 100, 1000);
        session.buffer_answer(2, "voter", 200, 2000);

        assert_eq!(session.answers(2, "voter"), BTreeMap::from([(200, 2000)]));
        assert!(!session.has_answered(2, "voter", 100));

        session.discard_answers(2, "voter", &BTreeMap::from([(200, 2000)]));
        assert_eq!(session.answers(1, "voter"), BTreeMap::from([(100, 1000)]));
    }

    #[test]
    fn answers_changed_after_submission_stay_buffered() {
        let mut session = BallotSession::default();
        session.buffer_answer(1, "voter", 1, 10);
        let submitted = session.answers(1, "voter");
        session.buffer_answer(1, "voter", 1, 11);
        session.buffer_answer(1, "voter", 2, 20);

        session.discard_answers(1, "voter", &submitted);
        assert_eq!(session.answers(1, "voter"), BTreeMap::from([(1, 11), (2, 20)]));
    }

    #[tokio::test]
    async fn store_round_trips_sessions() {
        let store = SessionStore::new(100, Duration::from_secs(60));
        store
            .update("token", |session| {
                session.select_delegation(Some(3));
            })
            .await;

        assert_eq!(store.load("token").await.active_delegation_id(), Some(3));
        assert_eq!(store.load("other").await, BallotSession::default());
    }

    #[tokio::test]
    async fn concurrent_updates_keep_every_answer() {
        let store = Arc::new(SessionStore::new(100, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for question_id in 1..=32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update("token", |session| {
                        session.buffer_answer(9, "voter", question_id, question_id * 10);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.load("token").await.answers(9, "voter").len(), 32);
    }
}
