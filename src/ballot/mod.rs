//! Ballot identity and the cast path.
//!
//! A ballot is recorded under the granter's identity when the actor votes
//! through a delegation they hold in a setting governing the election.
//! Editing a vote destroys and recreates it, so each live vote has exactly
//! one `create` audit entry.

pub mod session;

use std::collections::HashSet;

use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use thiserror::Error;
use tracing::info;

use crate::authorization::{self, AuthorizationStatus};
use crate::census::identity::user_global_id;
use crate::config::CensusConfig;
use crate::delegations;
use crate::entities::{
    delegation, election, election_question, election_vote, response_option, user,
    vote_audit_entry,
};
use crate::resolver::GovernedResource;
use session::{Answers, BallotSession};

#[derive(Debug, Error)]
pub enum BallotError {
    #[error("election {0} not found")]
    ElectionNotFound(i64),
    #[error("question {0} does not belong to this election")]
    QuestionNotFound(i64),
    #[error("response option {option_id} does not belong to question {question_id}")]
    InvalidOption { question_id: i64, option_id: i64 },
    #[error("election is not accepting ballots")]
    ElectionClosed,
    #[error("actor is not authorized to vote")]
    NotAuthorized(AuthorizationStatus),
    #[error("no answers buffered for this voter")]
    NothingToSubmit,
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Identity a ballot is recorded under and the delegation that allowed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveVoter {
    pub voter_uid: String,
    pub delegation: Option<delegation::Model>,
}

impl EffectiveVoter {
    pub fn delegation_id(&self) -> Option<i64> {
        self.delegation.as_ref().map(|delegation| delegation.id)
    }
}

pub fn resolve_effective_voter(
    prefix: &str,
    actor_id: i64,
    active: Option<&delegation::Model>,
    governing_setting_ids: &[i64],
) -> EffectiveVoter {
    match active {
        Some(delegation)
            if delegation.grantee_id == actor_id
                && governing_setting_ids.contains(&delegation.setting_id) =>
        {
            EffectiveVoter {
                voter_uid: user_global_id(prefix, delegation.granter_id),
                delegation: Some(delegation.clone()),
            }
        }
        _ => EffectiveVoter {
            voter_uid: user_global_id(prefix, actor_id),
            delegation: None,
        },
    }
}

pub async fn find_election<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<election::Model, BallotError> {
    election::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(BallotError::ElectionNotFound(id))
}

/// Applies the session's delegation selection to `actor` in `election`.
///
/// An unusable selection is dropped from the session and the actor votes as themself.
pub async fn effective_voter<C: ConnectionTrait>(
    db: &C,
    prefix: &str,
    actor_id: i64,
    election: &election::Model,
    session: &mut BallotSession,
    requested_delegation_id: Option<i64>,
) -> Result<EffectiveVoter, DbErr> {
    let resource = GovernedResource::election(election);
    let selected = match session.select_delegation(requested_delegation_id) {
        Some(id) => delegations::usable_delegation(db, &resource, actor_id, id).await?,
        None => None,
    };
    if selected.is_none() {
        session.clear_delegation();
    }
    Ok(resolve_effective_voter(
        prefix,
        actor_id,
        selected.as_ref(),
        &resource.setting_ids(),
    ))
}

/// The election must be open and the physical actor must pass the authorization gate.
pub async fn ensure_can_vote<C: ConnectionTrait>(
    db: &C,
    census: &CensusConfig,
    actor: &user::Model,
    election: &election::Model,
    now: DateTimeWithTimeZone,
) -> Result<(), BallotError> {
    if !election.ongoing_at(now) {
        return Err(BallotError::ElectionClosed);
    }
    let status = authorization::authorize(db, census, actor, election, now).await?;
    if !status.is_ok() {
        return Err(BallotError::NotAuthorized(status));
    }
    Ok(())
}

/// Checks that the option belongs to a question of the election.
pub async fn validate_answer<C: ConnectionTrait>(
    db: &C,
    election_id: i64,
    question_id: i64,
    option_id: i64,
) -> Result<(), BallotError> {
    election_question::Entity::find_by_id(question_id)
        .filter(election_question::Column::ElectionId.eq(election_id))
        .one(db)
        .await?
        .ok_or(BallotError::QuestionNotFound(question_id))?;
    response_option::Entity::find_by_id(option_id)
        .filter(response_option::Column::QuestionId.eq(question_id))
        .one(db)
        .await?
        .ok_or(BallotError::InvalidOption {
            question_id,
            option_id,
        })?;
    Ok(())
}

/// Questions still open for results that `voter_uid` has not answered in this session.
pub async fn pending_questions<C: ConnectionTrait>(
    db: &C,
    election_id: i64,
    session: &BallotSession,
    voter_uid: &str,
) -> Result<Vec<election_question::Model>, DbErr> {
    let questions = election_question::Entity::find()
        .filter(election_question::Column::ElectionId.eq(election_id))
        .filter(election_question::Column::PublishedResultsAt.is_null())
        .order_by_asc(election_question::Column::Position)
        .all(db)
        .await?;
    Ok(questions
        .into_iter()
        .filter(|question| !session.has_answered(election_id, voter_uid, question.id))
        .collect())
}

/// Whether any ballot of the election is recorded under the user's identity.
pub async fn participant_voted<C: ConnectionTrait>(
    db: &C,
    prefix: &str,
    election_id: i64,
    user_id: i64,
) -> Result<bool, DbErr> {
    let question_ids: Vec<i64> = election_question::Entity::find()
        .filter(election_question::Column::ElectionId.eq(election_id))
        .all(db)
        .await?
        .into_iter()
        .map(|question| question.id)
        .collect();
    if question_ids.is_empty() {
        return Ok(false);
    }
    let votes = election_vote::Entity::find()
        .filter(election_vote::Column::QuestionId.is_in(question_ids))
        .filter(election_vote::Column::VoterUid.eq(user_global_id(prefix, user_id)))
        .count(db)
        .await?;
    Ok(votes > 0)
}

/// Replaces the voter's ballots for each answered question and appends audit entries.
///
/// Every answered question must belong to `election_id`.
pub async fn record_ballot(
    db: &DatabaseConnection,
    election_id: i64,
    voter: &EffectiveVoter,
    actor_id: i64,
    answers: &Answers,
    now: DateTimeWithTimeZone,
) -> Result<Vec<election_vote::Model>, BallotError> {
    if answers.is_empty() {
        return Err(BallotError::NothingToSubmit);
    }

    let txn = db.begin().await?;
    let question_ids: HashSet<i64> = election_question::Entity::find()
        .filter(election_question::Column::ElectionId.eq(election_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|question| question.id)
        .collect();
    if let Some(foreign) = answers.keys().find(|id| !question_ids.contains(id)) {
        return Err(BallotError::QuestionNotFound(*foreign));
    }

    let mut recorded = Vec::with_capacity(answers.len());
    for (question_id, option_id) in answers {
        let previous = election_vote::Entity::find()
            .filter(election_vote::Column::QuestionId.eq(*question_id))
            .filter(election_vote::Column::VoterUid.eq(voter.voter_uid.clone()))
            .all(&txn)
            .await?;
        for vote in previous {
            append_audit(&txn, &vote, vote_audit_entry::EVENT_DESTROY, voter, actor_id, now).await?;
            election_vote::Entity::delete_by_id(vote.id).exec(&txn).await?;
        }

        let vote = election_vote::ActiveModel {
            id: NotSet,
            question_id: Set(*question_id),
            response_option_id: Set(*option_id),
            voter_uid: Set(voter.voter_uid.clone()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        append_audit(&txn, &vote, vote_audit_entry::EVENT_CREATE, voter, actor_id, now).await?;
        recorded.push(vote);
    }
    txn.commit().await?;

    info!(
        election_id,
        voter_uid = %voter.voter_uid,
        actor_id,
        delegation_id = ?voter.delegation_id(),
        votes = recorded.len(),
        "Recorded ballot"
    );
    Ok(recorded)
}

async fn append_audit<C: ConnectionTrait>(
    db: &C,
    vote: &election_vote::Model,
    event: &str,
    voter: &EffectiveVoter,
    actor_id: i64,
    now: DateTimeWithTimeZone,
) -> Result<vote_audit_entry::Model, DbErr> {
    vote_audit_entry::ActiveModel {
        id: NotSet,
        vote_id: Set(vote.id),
        question_id: Set(vote.question_id),
        event: Set(event.to_string()),
        voter_uid: Set(voter.voter_uid.clone()),
        actor_id: Set(Some(actor_id)),
        delegation_id: Set(voter.delegation_id()),
        created_at: Set(now),
    }
    .insert(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    const PREFIX: &str = "gid://decidim/Decidim::User/";

    fn question(id: i64, election_id: i64) -> election_question::Model {
        election_question::Model {
            id,
            election_id,
            body: serde_json::json!({"en": "Question"}),
            position: id as i32,
            published_results_at: None,
        }
    }

    fn delegation(setting_id: i64, granter_id: i64, grantee_id: i64) -> delegation::Model {
        delegation::Model {
            id: 5,
            setting_id,
            granter_id,
            grantee_id,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn vote(id: i64, option: i64, voter: &str) -> election_vote::Model {
        election_vote::Model {
            id,
            question_id: 1,
            response_option_id: option,
            voter_uid: voter.to_string(),
            created_at: Utc::now().into(),
        }
    }

    fn audit(
        id: i64,
        vote_id: i64,
        event: &str,
        delegation_id: Option<i64>,
    ) -> vote_audit_entry::Model {
        vote_audit_entry::Model {
            id,
            vote_id,
            question_id: 1,
            event: event.to_string(),
            voter_uid: format!("{PREFIX}1"),
            actor_id: Some(2),
            delegation_id,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn grantee_votes_as_granter() {
        let held = delegation(3, 1, 2);
        let voter = resolve_effective_voter(PREFIX, 2, Some(&held), &[3]);
        assert_eq!(voter.voter_uid, format!("{PREFIX}1"));
        assert_eq!(voter.delegation_id(), Some(5));
    }

    #[test]
    fn foreign_or_ungoverned_delegation_is_ignored() {
        let someone_else = delegation(3, 1, 7);
        let voter = resolve_effective_voter(PREFIX, 2, Some(&someone_else), &[3]);
        assert_eq!(voter.voter_uid, format!("{PREFIX}2"));
        assert!(voter.delegation.is_none());

        let other_setting = delegation(4, 1, 2);
        let voter = resolve_effective_voter(PREFIX, 2, Some(&other_setting), &[3]);
        assert_eq!(voter.voter_uid, format!("{PREFIX}2"));

        let voter = resolve_effective_voter(PREFIX, 2, None, &[3]);
        assert_eq!(voter.voter_uid, format!("{PREFIX}2"));
    }

    #[tokio::test]
    async fn closed_election_refuses_ballots() {
        let now = Utc::now();
        let election = election::Model {
            id: 9,
            organization_id: 1,
            title: serde_json::json!({"en": "Assembly"}),
            census_manifest: "action_delegator_census".to_string(),
            census_settings: serde_json::json!({"setting_id": 3}),
            published_at: Some(now.into()),
            start_at: Some((now - chrono::Duration::days(2)).into()),
            end_at: (now - chrono::Duration::days(1)).into(),
        };
        let actor = user::Model {
            id: 2,
            organization_id: 1,
            email: "grantee@example.org".to_string(),
            name: "Grantee".to_string(),
            deleted_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let result =
            ensure_can_vote(&db, &CensusConfig::default(), &actor, &election, now.into()).await;
        assert!(matches!(result, Err(BallotError::ElectionClosed)));
    }

    #[tokio::test]
    async fn empty_ballot_is_refused() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let voter = resolve_effective_voter(PREFIX, 2, None, &[]);
        let result = record_ballot(&db, 9, &voter, 2, &BTreeMap::new(), Utc::now().into()).await;
        assert!(matches!(result, Err(BallotError::NothingToSubmit)));
    }

    #[tokio::test]
    async fn resubmission_destroys_then_recreates() {
        let granter_uid = format!("{PREFIX}1");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[question(1, 9)]])
            .append_query_results([[vote(10, 100, &granter_uid)]])
            .append_query_results([[audit(1, 10, vote_audit_entry::EVENT_DESTROY, Some(5))]])
            .append_query_results([[vote(11, 101, &granter_uid)]])
            .append_query_results([[audit(2, 11, vote_audit_entry::EVENT_CREATE, Some(5))]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let held = delegation(3, 1, 2);
        let voter = resolve_effective_voter(PREFIX, 2, Some(&held), &[3]);
        let answers = BTreeMap::from([(1, 101)]);

        let recorded = record_ballot(&db, 9, &voter, 2, &answers, Utc::now().into())
            .await
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, 11);
        assert_eq!(recorded[0].voter_uid, granter_uid);
    }

    #[tokio::test]
    async fn answers_from_another_election_are_refused() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[question(200, 2)]])
            .into_connection();
        let voter = resolve_effective_voter(PREFIX, 42, None, &[]);
        let answers = BTreeMap::from([(100, 1000), (200, 2000)]);

        let result = record_ballot(&db, 2, &voter, 42, &answers, Utc::now().into()).await;
        assert!(matches!(result, Err(BallotError::QuestionNotFound(100))));
    }

    #[tokio::test]
    async fn voted_checks_the_user_identity() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[question(1, 9)]])
            .append_query_results([[maplit::btreemap! {
                "num_items" => sea_orm::Value::BigInt(Some(1))
            }]])
            .into_connection();

        assert!(participant_voted(&db, PREFIX, 9, 42).await.unwrap());
    }

    #[tokio::test]
    async fn pending_skips_buffered_questions() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[question(1, 9), question(2, 9)]])
            .into_connection();
        let mut session = BallotSession::default();
        session.buffer_answer(9, "voter", 1, 10);
        session.buffer_answer(4, "voter", 2, 20);

        let pending = pending_questions(&db, 9, &session, "voter").await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|question| question.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
