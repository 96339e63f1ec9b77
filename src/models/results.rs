use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPayload<Q> {
    pub id: i64,
    pub ongoing: bool,
    pub questions: Vec<Q>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByTypeQuestion {
    pub id: i64,
    pub response_options: Vec<ByTypeOption>,
}

/// One row per (response option, ponderation) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByTypeOption {
    pub id: i64,
    pub body: String,
    pub ponderation_id: Option<i64>,
    pub ponderation_title: String,
    pub votes_count: u64,
    pub votes_count_text: String,
    pub votes_percent: f64,
    pub votes_percent_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedQuestion {
    pub id: i64,
    pub body: String,
    pub published_results: bool,
    pub response_options: Vec<WeightedOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedOption {
    pub id: i64,
    pub question_id: i64,
    pub body: String,
    /// Absent while the question's results are unpublished on the public endpoint
    #[serde(flatten)]
    pub numbers: Option<WeightedNumbers>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedNumbers {
    pub votes_count: u64,
    pub votes_count_text: String,
    pub votes_percent: f64,
    pub votes_percent_text: String,
    pub weighted_votes_total: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsQuestion {
    pub id: i64,
    pub participants: u64,
    pub participants_text: String,
    pub unweighted_votes: u64,
    pub unweighted_votes_text: String,
    pub weighted_votes: u64,
    pub weighted_votes_text: String,
    pub delegated_votes: u64,
    pub delegated_votes_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedVoteEntry {
    pub id: i64,
    pub vote_id: i64,
    pub question_id: i64,
    pub voter_uid: String,
    pub actor_id: Option<i64>,
    pub delegation_id: i64,
    pub created_at: i64,
}

pub fn votes_text(count: u64) -> String {
    if count == 1 {
        "1 vote".to_string()
    } else {
        format!("{count} votes")
    }
}

pub fn participants_text(count: u64) -> String {
    if count == 1 {
        "1 participant".to_string()
    } else {
        format!("{count} participants")
    }
}

pub fn percent_text(percent: f64) -> String {
    format!("{percent:.1}%")
}
