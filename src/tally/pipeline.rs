//! In-process relational stages behind every results payload.
//!
//! Stage A outer-joins ballots to census rows, stage B groups them per
//! ponderation, stage C folds the groups into weighted option totals.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::census::identity::participant_identity;
use crate::entities::{participant, ponderation, setting};

pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub id: i64,
    pub response_option_id: i64,
    pub voter_uid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightClass {
    pub ponderation_id: i64,
    pub name: String,
    pub weight: f64,
}

/// Census rows of the active settings keyed by the identity ballots are recorded under.
#[derive(Debug, Clone, Default)]
pub struct CensusIndex {
    members: HashMap<String, Option<WeightClass>>,
}

impl CensusIndex {
    /// Settings are consulted in the given order; the first matching row wins.
    pub fn build(
        prefix: &str,
        settings: &[setting::Model],
        participants: &[participant::Model],
        ponderations: &[ponderation::Model],
    ) -> Self {
        let classes: HashMap<i64, WeightClass> = ponderations
            .iter()
            .map(|ponderation| {
                (
                    ponderation.id,
                    WeightClass {
                        ponderation_id: ponderation.id,
                        name: ponderation.name.clone(),
                        weight: ponderation.weight,
                    },
                )
            })
            .collect();

        let mut index = Self::default();
        for setting in settings {
            for participant in participants.iter().filter(|row| row.setting_id == setting.id) {
                let Some(identity) =
                    participant_identity(prefix, participant, setting.authorization_method)
                else {
                    continue;
                };
                let class = participant
                    .ponderation_id
                    .and_then(|id| classes.get(&id).cloned());
                index.insert(identity, class);
            }
        }
        index
    }

    /// Keeps the first class recorded for an identity.
    pub fn insert(&mut self, identity: impl Into<String>, class: Option<WeightClass>) {
        self.members.entry(identity.into()).or_insert(class);
    }

    /// Files `voter_uid` under the class of the first contact found in the census.
    ///
    /// Returns false when the voter already has an entry or no contact matches.
    pub fn alias(&mut self, voter_uid: &str, contacts: &[String]) -> bool {
        if self.members.contains_key(voter_uid) {
            return false;
        }
        let Some(class) = contacts
            .iter()
            .find_map(|contact| self.members.get(contact.as_str()))
            .cloned()
        else {
            return false;
        };
        self.members.insert(voter_uid.to_string(), class);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `None` when the voter is not in the census; `Some(None)` for a member without ponderation.
    pub fn lookup(&self, voter_uid: &str) -> Option<Option<&WeightClass>> {
        self.members.get(voter_uid).map(Option::as_ref)
    }
}

/// One stage A row: an option, possibly a ballot, possibly its weight class.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub option_id: i64,
    pub ballot_id: Option<i64>,
    pub class: Option<WeightClass>,
}

pub fn join_ballots(
    option_ids: &[i64],
    ballots: &[Ballot],
    census: &CensusIndex,
) -> Vec<JoinedRow> {
    let mut rows = Vec::with_capacity(ballots.len() + option_ids.len());
    for option_id in option_ids {
        let mut matched = false;
        for ballot in ballots.iter().filter(|ballot| ballot.response_option_id == *option_id) {
            matched = true;
            rows.push(JoinedRow {
                option_id: *option_id,
                ballot_id: Some(ballot.id),
                class: census.lookup(&ballot.voter_uid).flatten().cloned(),
            });
        }
        if !matched {
            rows.push(JoinedRow {
                option_id: *option_id,
                ballot_id: None,
                class: None,
            });
        }
    }
    rows
}

/// Ballots without a ponderation share the `Unweighted` group of their option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PonderationKey {
    Unweighted,
    Weighted(i64),
}

impl PonderationKey {
    pub fn ponderation_id(self) -> Option<i64> {
        match self {
            Self::Unweighted => None,
            Self::Weighted(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PonderationGroup {
    pub option_id: i64,
    pub key: PonderationKey,
    pub title: Option<String>,
    pub weight: f64,
    pub votes_count: u64,
}

pub fn group_by_ponderation(rows: &[JoinedRow]) -> Vec<PonderationGroup> {
    let mut order = Vec::new();
    let mut grouped: HashMap<i64, BTreeMap<PonderationKey, PonderationGroup>> = HashMap::new();

    for row in rows {
        if !grouped.contains_key(&row.option_id) {
            order.push(row.option_id);
        }
        let key = row
            .class
            .as_ref()
            .map_or(PonderationKey::Unweighted, |class| {
                PonderationKey::Weighted(class.ponderation_id)
            });
        let group = grouped
            .entry(row.option_id)
            .or_default()
            .entry(key)
            .or_insert_with(|| PonderationGroup {
                option_id: row.option_id,
                key,
                title: row.class.as_ref().map(|class| class.name.clone()),
                weight: row.class.as_ref().map_or(DEFAULT_WEIGHT, |class| class.weight),
                votes_count: 0,
            });
        if row.ballot_id.is_some() {
            group.votes_count += 1;
        }
    }

    order
        .into_iter()
        .filter_map(|option_id| grouped.remove(&option_id))
        .flat_map(BTreeMap::into_values)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionTotal {
    pub option_id: i64,
    pub votes_count: u64,
    pub weighted_total: f64,
}

pub fn weighted_totals(groups: &[PonderationGroup]) -> Vec<OptionTotal> {
    let mut totals: Vec<OptionTotal> = Vec::new();
    for group in groups {
        let contribution = group.votes_count as f64 * group.weight;
        match totals.iter_mut().find(|total| total.option_id == group.option_id) {
            Some(total) => {
                total.votes_count += group.votes_count;
                total.weighted_total += contribution;
            }
            None => totals.push(OptionTotal {
                option_id: group.option_id,
                votes_count: group.votes_count,
                weighted_total: contribution,
            }),
        }
    }
    totals
}

/// Runs all three stages for one question.
pub fn tally(option_ids: &[i64], ballots: &[Ballot], census: &CensusIndex) -> Vec<OptionTotal> {
    weighted_totals(&group_by_ponderation(&join_ballots(option_ids, ballots, census)))
}

pub fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 { part / total * 100.0 } else { 0.0 }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuestionStats {
    pub participants: u64,
    pub unweighted_votes: u64,
    pub weighted_votes: u64,
    pub delegated_votes: u64,
}

/// `delegated` holds ids of ballots whose creation entry carries a delegation.
pub fn question_stats(
    ballots: &[Ballot],
    totals: &[OptionTotal],
    delegated: &HashSet<i64>,
) -> QuestionStats {
    let participants = ballots
        .iter()
        .map(|ballot| ballot.voter_uid.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;
    let weighted: f64 = totals.iter().map(|total| total.weighted_total).sum();
    QuestionStats {
        participants,
        unweighted_votes: ballots.len() as u64,
        weighted_votes: weighted.round().max(0.0) as u64,
        delegated_votes: ballots
            .iter()
            .filter(|ballot| delegated.contains(&ballot.id))
            .count() as u64,
    }
}
