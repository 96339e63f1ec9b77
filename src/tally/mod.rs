//! Results for an election in the three aggregation modes.

pub mod pipeline;

use std::collections::{BTreeMap, HashMap, HashSet};

use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use thiserror::Error;
use tracing::debug;

use crate::census::identity::{
    normalize_email, phone_candidates, translated, user_id_from_global_id,
};
use crate::config::CensusConfig;
use crate::entities::{
    authorization, delegation, election, election_question, election_vote, participant,
    ponderation, response_option, user, vote_audit_entry,
};
use crate::models::results::{
    percent_text, participants_text, votes_text, ByTypeOption, ByTypeQuestion,
    DelegatedVoteEntry, ResultsPayload, TotalsQuestion, WeightedNumbers, WeightedOption,
    WeightedQuestion,
};
use crate::resolver::{self, DELEGATIONS_VERIFIER, GovernedResource};
use pipeline::{
    group_by_ponderation, join_ballots, percent, question_stats, round_to, tally, Ballot,
    CensusIndex,
};

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("election {0} not found")]
    ElectionNotFound(i64),
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultsMode {
    ByTypeAndWeight,
    SumOfWeights,
    Totals,
    PublicSumOfWeights,
}

#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub id: i64,
    pub body: String,
    pub published: bool,
    pub options: Vec<(i64, String)>,
    pub ballots: Vec<Ballot>,
    /// Ballots whose creation entry carries a delegation
    pub delegated: HashSet<i64>,
}

impl QuestionInput {
    fn option_ids(&self) -> Vec<i64> {
        self.options.iter().map(|(id, _)| *id).collect()
    }

    fn option_body(&self, option_id: i64) -> String {
        self.options
            .iter()
            .find(|(id, _)| *id == option_id)
            .map(|(_, body)| body.clone())
            .unwrap_or_default()
    }
}

/// Everything the payload builders need, loaded once per request.
#[derive(Debug, Clone)]
pub struct ElectionResults {
    pub election_id: i64,
    pub ongoing: bool,
    /// False when the election's census configuration resolves no setting
    pub governed: bool,
    pub census: CensusIndex,
    pub questions: Vec<QuestionInput>,
}

pub async fn find_election<C: ConnectionTrait>(
    db: &C,
    election_id: i64,
) -> Result<election::Model, TallyError> {
    election::Entity::find_by_id(election_id)
        .one(db)
        .await?
        .ok_or(TallyError::ElectionNotFound(election_id))
}

impl ElectionResults {
    pub async fn for_election<C: ConnectionTrait>(
        db: &C,
        census_config: &CensusConfig,
        election: &election::Model,
        now: DateTimeWithTimeZone,
    ) -> Result<Self, TallyError> {
        let resource = GovernedResource::election(election);
        let settings = resolver::settings_for(db, &resource).await?;
        let setting_ids: Vec<i64> = settings.iter().map(|setting| setting.id).collect();

        let mut census = if setting_ids.is_empty() {
            CensusIndex::default()
        } else {
            let participants = participant::Entity::find()
                .filter(participant::Column::SettingId.is_in(setting_ids.clone()))
                .order_by_asc(participant::Column::Id)
                .all(db)
                .await?;
            let ponderations = ponderation::Entity::find()
                .filter(ponderation::Column::SettingId.is_in(setting_ids.clone()))
                .all(db)
                .await?;
            CensusIndex::build(
                &census_config.user_global_id_prefix,
                &settings,
                &participants,
                &ponderations,
            )
        };

        let questions = load_questions(db, election.id, &census_config.default_locale).await?;
        if !census.is_empty() {
            alias_registered_voters(db, census_config, &mut census, &questions).await?;
        }
        debug!(
            election_id = election.id,
            settings = setting_ids.len(),
            questions = questions.len(),
            "Loaded election results"
        );

        Ok(Self {
            election_id: election.id,
            ongoing: election.ongoing_at(now),
            governed: !setting_ids.is_empty(),
            census,
            questions,
        })
    }

    pub fn by_type_and_weight(&self) -> ResultsPayload<ByTypeQuestion> {
        let questions = self
            .questions
            .iter()
            .map(|question| ByTypeQuestion {
                id: question.id,
                response_options: if self.governed {
                    by_type_options(question, &self.census)
                } else {
                    Vec::new()
                },
            })
            .collect();
        self.payload(questions)
    }

    /// `public` hides the numbers of questions whose results are unpublished.
    pub fn sum_of_weights(&self, public: bool) -> ResultsPayload<WeightedQuestion> {
        let questions = self
            .questions
            .iter()
            .map(|question| WeightedQuestion {
                id: question.id,
                body: question.body.clone(),
                published_results: question.published,
                response_options: if self.governed {
                    weighted_options(question, &self.census, !public || question.published)
                } else {
                    Vec::new()
                },
            })
            .collect();
        self.payload(questions)
    }

    pub fn totals(&self) -> ResultsPayload<TotalsQuestion> {
        let questions = self
            .questions
            .iter()
            .map(|question| {
                let totals = tally(&question.option_ids(), &question.ballots, &self.census);
                let stats = question_stats(&question.ballots, &totals, &question.delegated);
                TotalsQuestion {
                    id: question.id,
                    participants: stats.participants,
                    participants_text: participants_text(stats.participants),
                    unweighted_votes: stats.unweighted_votes,
                    unweighted_votes_text: votes_text(stats.unweighted_votes),
                    weighted_votes: stats.weighted_votes,
                    weighted_votes_text: votes_text(stats.weighted_votes),
                    delegated_votes: stats.delegated_votes,
                    delegated_votes_text: votes_text(stats.delegated_votes),
                }
            })
            .collect();
        self.payload(questions)
    }

    fn payload<Q>(&self, questions: Vec<Q>) -> ResultsPayload<Q> {
        ResultsPayload {
            id: self.election_id,
            ongoing: self.ongoing,
            questions,
        }
    }
}

fn by_type_options(question: &QuestionInput, census: &CensusIndex) -> Vec<ByTypeOption> {
    let groups = group_by_ponderation(&join_ballots(
        &question.option_ids(),
        &question.ballots,
        census,
    ));
    groups
        .iter()
        .map(|group| {
            let option_total: u64 = groups
                .iter()
                .filter(|other| other.option_id == group.option_id)
                .map(|other| other.votes_count)
                .sum();
            let votes_percent = percent(group.votes_count as f64, option_total as f64);
            ByTypeOption {
                id: group.option_id,
                body: question.option_body(group.option_id),
                ponderation_id: group.key.ponderation_id(),
                ponderation_title: group.title.clone().unwrap_or_else(|| "-".to_string()),
                votes_count: group.votes_count,
                votes_count_text: votes_text(group.votes_count),
                votes_percent,
                votes_percent_text: percent_text(votes_percent),
            }
        })
        .collect()
}

fn weighted_options(
    question: &QuestionInput,
    census: &CensusIndex,
    with_numbers: bool,
) -> Vec<WeightedOption> {
    let totals = tally(&question.option_ids(), &question.ballots, census);
    let question_total: f64 = totals.iter().map(|total| total.weighted_total).sum();
    totals
        .iter()
        .map(|total| {
            let numbers = with_numbers.then(|| {
                let weighted_votes_total = round_to(total.weighted_total, 2);
                let votes_count = total.weighted_total.round().max(0.0) as u64;
                let votes_percent = percent(total.weighted_total, question_total);
                WeightedNumbers {
                    votes_count,
                    votes_count_text: votes_text(votes_count),
                    votes_percent,
                    votes_percent_text: percent_text(votes_percent),
                    weighted_votes_total,
                }
            });
            WeightedOption {
                id: total.option_id,
                question_id: question.id,
                body: question.option_body(total.option_id),
                numbers,
            }
        })
        .collect()
}

async fn load_questions<C: ConnectionTrait>(
    db: &C,
    election_id: i64,
    locale: &str,
) -> Result<Vec<QuestionInput>, DbErr> {
    let questions = election_question::Entity::find()
        .filter(election_question::Column::ElectionId.eq(election_id))
        .order_by_asc(election_question::Column::Position)
        .order_by_asc(election_question::Column::Id)
        .all(db)
        .await?;
    if questions.is_empty() {
        return Ok(Vec::new());
    }
    let question_ids: Vec<i64> = questions.iter().map(|question| question.id).collect();

    let options = response_option::Entity::find()
        .filter(response_option::Column::QuestionId.is_in(question_ids.clone()))
        .order_by_asc(response_option::Column::Id)
        .all(db)
        .await?;
    let votes = election_vote::Entity::find()
        .filter(election_vote::Column::QuestionId.is_in(question_ids))
        .order_by_asc(election_vote::Column::Id)
        .all(db)
        .await?;

    let vote_ids: Vec<i64> = votes.iter().map(|vote| vote.id).collect();
    let delegated = if vote_ids.is_empty() {
        HashSet::new()
    } else {
        let entries = vote_audit_entry::Entity::find()
            .filter(vote_audit_entry::Column::VoteId.is_in(vote_ids))
            .all(db)
            .await?;
        delegated_ballots(&entries)
    };

    Ok(questions
        .into_iter()
        .map(|question| {
            let ballots: Vec<Ballot> = votes
                .iter()
                .filter(|vote| vote.question_id == question.id)
                .map(|vote| Ballot {
                    id: vote.id,
                    response_option_id: vote.response_option_id,
                    voter_uid: vote.voter_uid.clone(),
                })
                .collect();
            let question_delegated = ballots
                .iter()
                .map(|ballot| ballot.id)
                .filter(|id| delegated.contains(id))
                .collect();
            QuestionInput {
                id: question.id,
                body: translated(&question.body, locale),
                published: question.results_published(),
                options: options
                    .iter()
                    .filter(|option| option.question_id == question.id)
                    .map(|option| (option.id, translated(&option.body, locale)))
                    .collect(),
                ballots,
                delegated: question_delegated,
            }
        })
        .collect())
}

/// Ballots created through a delegation; destroy entries never count.
fn delegated_ballots(entries: &[vote_audit_entry::Model]) -> HashSet<i64> {
    entries
        .iter()
        .filter(|entry| entry.event == vote_audit_entry::EVENT_CREATE)
        .filter(|entry| entry.delegation_id.is_some())
        .map(|entry| entry.vote_id)
        .collect()
}

/// Files registered voters whose census row was imported by contact and never bound
/// to their account under that row's class.
async fn alias_registered_voters<C: ConnectionTrait>(
    db: &C,
    census_config: &CensusConfig,
    census: &mut CensusIndex,
    questions: &[QuestionInput],
) -> Result<(), DbErr> {
    let unresolved: BTreeMap<i64, String> = questions
        .iter()
        .flat_map(|question| &question.ballots)
        .filter(|ballot| census.lookup(&ballot.voter_uid).is_none())
        .filter_map(|ballot| {
            user_id_from_global_id(&census_config.user_global_id_prefix, &ballot.voter_uid)
                .map(|user_id| (user_id, ballot.voter_uid.clone()))
        })
        .collect();
    if unresolved.is_empty() {
        return Ok(());
    }
    let user_ids: Vec<i64> = unresolved.keys().copied().collect();

    let emails: HashMap<i64, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|user| (user.id, normalize_email(&user.email)))
        .collect();
    let phones: HashMap<i64, String> = authorization::Entity::find()
        .filter(authorization::Column::UserId.is_in(user_ids))
        .filter(authorization::Column::Name.eq(DELEGATIONS_VERIFIER))
        .all(db)
        .await?
        .into_iter()
        .filter_map(|record| {
            let phone = record.metadata.get("phone")?.as_str()?.to_string();
            Some((record.user_id, phone))
        })
        .collect();

    let mut aliased = 0;
    for (user_id, voter_uid) in &unresolved {
        let mut contacts: Vec<String> = emails.get(user_id).cloned().into_iter().collect();
        if let Some(phone) = phones.get(user_id) {
            contacts.extend(phone_candidates(phone, &census_config.phone_prefixes));
        }
        if census.alias(voter_uid, &contacts) {
            aliased += 1;
        }
    }
    debug!(unresolved = unresolved.len(), aliased, "Matched registered voters by contact");
    Ok(())
}

/// Audit entries recorded through any delegation of the settings governing the election.
pub async fn delegated_vote_trail<C: ConnectionTrait>(
    db: &C,
    election: &election::Model,
) -> Result<Vec<DelegatedVoteEntry>, TallyError> {
    let setting_ids = GovernedResource::election(election).setting_ids();
    if setting_ids.is_empty() {
        return Ok(Vec::new());
    }

    let delegation_ids: Vec<i64> = delegation::Entity::find()
        .filter(delegation::Column::SettingId.is_in(setting_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|delegation| delegation.id)
        .collect();
    if delegation_ids.is_empty() {
        return Ok(Vec::new());
    }

    let entries = vote_audit_entry::Entity::find()
        .filter(vote_audit_entry::Column::DelegationId.is_in(delegation_ids))
        .order_by_asc(vote_audit_entry::Column::CreatedAt)
        .order_by_asc(vote_audit_entry::Column::Id)
        .all(db)
        .await?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            Some(DelegatedVoteEntry {
                delegation_id: entry.delegation_id?,
                id: entry.id,
                vote_id: entry.vote_id,
                question_id: entry.question_id,
                voter_uid: entry.voter_uid,
                actor_id: entry.actor_id,
                created_at: entry.created_at.timestamp(),
            })
        })
        .collect())
}
