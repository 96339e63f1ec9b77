//! Decides whether an actor may vote in an election.
//!
//! The base authorization record moves through missing, expired and pending
//! before the census check runs. Settings are always resolved from the
//! election itself, never from the actor's authorization metadata.

use std::collections::BTreeMap;

use chrono::Duration;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::debug;

use crate::census::identity::{emails_match, phone_candidates, translated};
use crate::config::CensusConfig;
use crate::entities::{authorization, election, participant, setting, user};
use crate::resolver::{self, DELEGATIONS_VERIFIER, GovernedResource};

const MISSING_PHONE: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Ok,
    Missing,
    Expired,
    Pending,
    Unauthorized { extra_explanation: Vec<Explanation> },
}

impl AuthorizationStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub key: ExplanationKey,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationKey {
    NoSetting,
    InactiveSetting,
    NotInCensus,
    Email,
    Phone,
}

impl Explanation {
    fn new(key: ExplanationKey) -> Self {
        Self {
            key,
            params: BTreeMap::new(),
        }
    }

    fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// What the actor proved when the base authorization was granted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContacts {
    pub user_id: i64,
    pub email: String,
    pub phone: Option<String>,
}

/// First three states, decided from the base authorization record alone.
pub fn base_status(
    record: Option<&authorization::Model>,
    now: DateTimeWithTimeZone,
    expiration: Option<Duration>,
) -> Option<AuthorizationStatus> {
    let Some(record) = record else {
        return Some(AuthorizationStatus::Missing);
    };
    if let (Some(granted_at), Some(expiration)) = (record.granted_at, expiration) {
        if granted_at + expiration < now {
            return Some(AuthorizationStatus::Expired);
        }
    }
    if record.granted_at.is_none() {
        return Some(AuthorizationStatus::Pending);
    }
    None
}

pub fn participant_matches(
    participant: &participant::Model,
    method: setting::AuthorizationMethod,
    actor: &ActorContacts,
    phone_prefixes: &[String],
) -> bool {
    if participant.user_id == Some(actor.user_id) {
        return true;
    }
    if method.email_required() {
        let email_ok = participant
            .email
            .as_deref()
            .is_some_and(|email| emails_match(email, &actor.email));
        if !email_ok {
            return false;
        }
    }
    if method.phone_required() {
        let candidates = actor
            .phone
            .as_deref()
            .map(|phone| phone_candidates(phone, phone_prefixes))
            .unwrap_or_default();
        let phone_ok = participant
            .phone
            .as_deref()
            .is_some_and(|phone| candidates.iter().any(|candidate| candidate == phone));
        if !phone_ok {
            return false;
        }
    }
    true
}

/// Census step: `Ok` if any active setting has a matching participant.
pub fn census_status(
    settings: &[setting::Model],
    participants: &[participant::Model],
    actor: &ActorContacts,
    census: &CensusConfig,
) -> AuthorizationStatus {
    let in_census = settings.iter().filter(|setting| setting.active).any(|setting| {
        participants.iter().any(|row| {
            row.setting_id == setting.id
                && participant_matches(
                    row,
                    setting.authorization_method,
                    actor,
                    &census.phone_prefixes,
                )
        })
    });
    if in_census {
        return AuthorizationStatus::Ok;
    }
    AuthorizationStatus::Unauthorized {
        extra_explanation: explain(settings, actor, &census.default_locale),
    }
}

fn explain(settings: &[setting::Model], actor: &ActorContacts, locale: &str) -> Vec<Explanation> {
    let Some(first) = settings.first() else {
        return vec![Explanation::new(ExplanationKey::NoSetting)];
    };
    let Some(active) = settings.iter().find(|setting| setting.active) else {
        return vec![
            Explanation::new(ExplanationKey::InactiveSetting)
                .with("census", translated(&first.title, locale)),
        ];
    };

    let mut explanations = vec![
        Explanation::new(ExplanationKey::NotInCensus)
            .with("census", translated(&active.title, locale)),
    ];
    if active.authorization_method.email_required() {
        explanations
            .push(Explanation::new(ExplanationKey::Email).with("email", actor.email.clone()));
    }
    if active.authorization_method.phone_required() {
        explanations.push(
            Explanation::new(ExplanationKey::Phone).with(
                "phone",
                actor.phone.clone().unwrap_or_else(|| MISSING_PHONE.to_string()),
            ),
        );
    }
    explanations
}

/// Full state machine for `actor` voting in `election`.
pub async fn authorize<C: ConnectionTrait>(
    db: &C,
    census: &CensusConfig,
    actor: &user::Model,
    election: &election::Model,
    now: DateTimeWithTimeZone,
) -> Result<AuthorizationStatus, DbErr> {
    let record = authorization::Entity::find()
        .filter(authorization::Column::UserId.eq(actor.id))
        .filter(authorization::Column::Name.eq(DELEGATIONS_VERIFIER))
        .one(db)
        .await?;
    if let Some(status) = base_status(record.as_ref(), now, census.authorization_expiration()) {
        debug!(user_id = actor.id, election_id = election.id, ?status, "Authorization incomplete");
        return Ok(status);
    }

    let contacts = ActorContacts {
        user_id: actor.id,
        email: actor.email.clone(),
        phone: record
            .as_ref()
            .and_then(|record| record.metadata.get("phone"))
            .and_then(|phone| phone.as_str())
            .map(str::to_string),
    };

    let settings = resolver::settings_for(db, &GovernedResource::election(election)).await?;
    let active_ids: Vec<i64> = settings
        .iter()
        .filter(|setting| setting.active)
        .map(|setting| setting.id)
        .collect();
    let participants = if active_ids.is_empty() {
        Vec::new()
    } else {
        census_candidates(db, &active_ids, &contacts, &census.phone_prefixes).await?
    };

    let status = census_status(&settings, &participants, &contacts, census);
    debug!(user_id = actor.id, election_id = election.id, ?status, "Census checked");
    Ok(status)
}

/// Participants of `setting_ids` that could match the actor; exact matching happens in memory.
async fn census_candidates<C: ConnectionTrait>(
    db: &C,
    setting_ids: &[i64],
    actor: &ActorContacts,
    phone_prefixes: &[String],
) -> Result<Vec<participant::Model>, DbErr> {
    let mut any = Condition::any()
        .add(participant::Column::UserId.eq(actor.user_id))
        .add(
            Expr::expr(Func::lower(Expr::col(participant::Column::Email)))
                .eq(actor.email.trim().to_lowercase()),
        );
    if let Some(phone) = actor.phone.as_deref() {
        let candidates = phone_candidates(phone, phone_prefixes);
        if !candidates.is_empty() {
            any = any.add(participant::Column::Phone.is_in(candidates));
        }
    }

    participant::Entity::find()
        .filter(participant::Column::SettingId.is_in(setting_ids.to_vec()))
        .filter(any)
        .all(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;

    use crate::entities::setting::AuthorizationMethod;

    fn record(granted_days_ago: Option<i64>) -> authorization::Model {
        let now = Utc::now();
        authorization::Model {
            id: 1,
            user_id: 42,
            name: DELEGATIONS_VERIFIER.to_string(),
            metadata: json!({"phone": "666666666"}),
            granted_at: granted_days_ago.map(|days| (now - Duration::days(days)).into()),
            created_at: now.into(),
        }
    }

    fn setting(id: i64, active: bool, method: AuthorizationMethod) -> setting::Model {
        setting::Model {
            id,
            organization_id: 1,
            title: json!({"en": format!("Census {id}")}),
            description: json!({}),
            max_grants: 1,
            authorization_method: method,
            active,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn participant(
        setting_id: i64,
        user_id: Option<i64>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> participant::Model {
        participant::Model {
            id: 1,
            setting_id,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            user_id,
            ponderation_id: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn actor(phone: Option<&str>) -> ActorContacts {
        ActorContacts {
            user_id: 42,
            email: "voter@example.org".to_string(),
            phone: phone.map(str::to_string),
        }
    }

    #[test]
    fn base_states_are_checked_in_order() {
        let now = Utc::now().into();
        let ninety = Some(Duration::days(90));
        assert_eq!(base_status(None, now, ninety), Some(AuthorizationStatus::Missing));
        assert_eq!(
            base_status(Some(&record(Some(120))), now, ninety),
            Some(AuthorizationStatus::Expired)
        );
        assert_eq!(
            base_status(Some(&record(None)), now, ninety),
            Some(AuthorizationStatus::Pending)
        );
        assert_eq!(base_status(Some(&record(Some(10))), now, ninety), None);
        assert_eq!(base_status(Some(&record(Some(500))), now, None), None);
    }

    #[test]
    fn no_setting_is_explained() {
        let status = census_status(&[], &[], &actor(None), &CensusConfig::default());
        match status {
            AuthorizationStatus::Unauthorized { extra_explanation } => {
                assert_eq!(extra_explanation.len(), 1);
                assert_eq!(extra_explanation[0].key, ExplanationKey::NoSetting);
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn inactive_setting_never_authorizes() {
        let settings = [setting(1, false, AuthorizationMethod::Email)];
        let rows = [participant(1, Some(42), None, None)];
        let status = census_status(&settings, &rows, &actor(None), &CensusConfig::default());
        match status {
            AuthorizationStatus::Unauthorized { extra_explanation } => {
                assert_eq!(extra_explanation[0].key, ExplanationKey::InactiveSetting);
                assert_eq!(extra_explanation[0].params["census"], "Census 1");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn not_in_census_echoes_checked_contacts() {
        let settings = [setting(1, true, AuthorizationMethod::Both)];
        let rows = [participant(1, None, Some("someone@example.org"), Some("111111111"))];
        let status = census_status(&settings, &rows, &actor(None), &CensusConfig::default());
        let AuthorizationStatus::Unauthorized { extra_explanation } = status else {
            panic!("expected unauthorized");
        };
        let keys: Vec<ExplanationKey> = extra_explanation.iter().map(|entry| entry.key).collect();
        assert_eq!(
            keys,
            vec![ExplanationKey::NotInCensus, ExplanationKey::Email, ExplanationKey::Phone]
        );
        assert_eq!(extra_explanation[1].params["email"], "voter@example.org");
        assert_eq!(extra_explanation[2].params["phone"], "---");
    }

    #[test]
    fn matching_follows_the_setting_method() {
        let prefixes = CensusConfig::default().phone_prefixes;
        let by_email = participant(1, None, Some("VOTER@example.org"), None);
        let voter = actor(None);
        assert!(participant_matches(&by_email, AuthorizationMethod::Email, &voter, &prefixes));
        assert!(!participant_matches(&by_email, AuthorizationMethod::Both, &voter, &prefixes));

        let by_phone = participant(1, None, None, Some("+34666666666"));
        assert!(participant_matches(
            &by_phone,
            AuthorizationMethod::Phone,
            &actor(Some("666666666")),
            &prefixes
        ));

        let bound = participant(1, Some(42), None, None);
        assert!(participant_matches(&bound, AuthorizationMethod::Both, &actor(None), &prefixes));
    }

    #[test]
    fn any_active_setting_can_authorize() {
        let settings = [
            setting(1, true, AuthorizationMethod::Email),
            setting(2, true, AuthorizationMethod::Email),
        ];
        let rows = [participant(2, None, Some("voter@example.org"), None)];
        assert!(census_status(&settings, &rows, &actor(None), &CensusConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn authorize_uses_the_election_setting() {
        let now = Utc::now();
        let voter = user::Model {
            id: 42,
            organization_id: 1,
            email: "voter@example.org".to_string(),
            name: "Voter".to_string(),
            deleted_at: None,
        };
        let election = election::Model {
            id: 9,
            organization_id: 1,
            title: json!({"en": "Assembly"}),
            census_manifest: resolver::ACTION_DELEGATOR_CENSUS_MANIFEST.to_string(),
            census_settings: json!({"setting_id": 2}),
            published_at: None,
            start_at: None,
            end_at: now.into(),
        };
        let mut stale = record(Some(1));
        stale.metadata = json!({"setting_id": 1});

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[stale]])
            .append_query_results([[setting(2, true, AuthorizationMethod::Email)]])
            .append_query_results([[participant(2, None, Some("voter@example.org"), None)]])
            .into_connection();

        let status = authorize(&db, &CensusConfig::default(), &voter, &election, now.into())
            .await
            .unwrap();
        assert!(status.is_ok());
    }
}
