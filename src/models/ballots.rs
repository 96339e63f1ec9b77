use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::census::DelegationView;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DelegationQuery {
    pub delegation: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnswerRequest {
    pub question_id: i64,
    pub response_option_id: i64,
    pub delegation: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotStateView {
    pub election_id: i64,
    pub voter_uid: String,
    pub delegation_id: Option<i64>,
    pub answers: BTreeMap<i64, i64>,
    pub pending_questions: Vec<PendingQuestionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestionView {
    pub id: i64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedBallotView {
    pub election_id: i64,
    pub voter_uid: String,
    pub delegation_id: Option<i64>,
    pub votes: Vec<RecordedVoteView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedVoteView {
    pub id: i64,
    pub question_id: i64,
    pub response_option_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDelegationsView {
    pub setting_id: i64,
    pub title: String,
    pub delegations: Vec<DelegationView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotedView {
    pub election_id: i64,
    pub voted: bool,
}
