//! Identity strings and contact normalisation shared by census matching.

use serde_json::Value;

use crate::entities::participant;
use crate::entities::setting::AuthorizationMethod;

/// Global identity recorded as `voter_uid` on ballots cast by a registered user.
pub fn user_global_id(prefix: &str, user_id: i64) -> String {
    format!("{prefix}{user_id}")
}

/// Inverse of [`user_global_id`]; `None` for contact identities.
pub fn user_id_from_global_id(prefix: &str, voter_uid: &str) -> Option<i64> {
    voter_uid.strip_prefix(prefix)?.parse().ok()
}

/// Key under which a census row is matched against ballot `voter_uid`s.
///
/// A bound user wins; unbound rows fall back to the contact the setting verifies.
pub fn participant_identity(
    prefix: &str,
    participant: &participant::Model,
    method: AuthorizationMethod,
) -> Option<String> {
    if let Some(user_id) = participant.user_id {
        return Some(user_global_id(prefix, user_id));
    }
    let contact = if method.email_required() {
        participant.email.as_deref().map(normalize_email)
    } else {
        participant.phone.as_deref().map(|phone| phone.trim().to_string())
    };
    contact.filter(|value| !value.is_empty())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keeps digits and `+` only.
pub fn sanitize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Every spelling of `phone` the census may contain once country prefixes are considered.
pub fn phone_candidates(phone: &str, prefixes: &[String]) -> Vec<String> {
    let phone = sanitize_phone(phone);
    if phone.is_empty() {
        return Vec::new();
    }

    let mut candidates = vec![phone.clone()];
    for prefix in prefixes {
        candidates.push(format!("{prefix}{phone}"));
    }
    for prefix in prefixes {
        if let Some(stripped) = phone.strip_prefix(prefix.as_str()) {
            if !stripped.is_empty() {
                candidates.push(stripped.to_string());
            }
        }
    }
    dedup_in_place(&mut candidates);
    candidates
}

pub fn emails_match(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

/// Picks `locale` from a translations object, falling back to the first non-empty entry.
pub fn translated(value: &Value, locale: &str) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get(locale)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .or_else(|| {
                map.values()
                    .filter_map(Value::as_str)
                    .find(|text| !text.is_empty())
            })
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn dedup_in_place(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    const PREFIX: &str = "gid://decidim/Decidim::User/";

    fn participant(
        user_id: Option<i64>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> participant::Model {
        participant::Model {
            id: 1,
            setting_id: 1,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            user_id,
            ponderation_id: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn bound_user_identity_wins() {
        let row = participant(Some(42), Some("a@example.org"), None);
        assert_eq!(
            participant_identity(PREFIX, &row, AuthorizationMethod::Email).as_deref(),
            Some("gid://decidim/Decidim::User/42")
        );
    }

    #[test]
    fn unbound_identity_follows_authorization_method() {
        let row = participant(None, Some(" A@Example.org"), Some("+34666666666"));
        assert_eq!(
            participant_identity(PREFIX, &row, AuthorizationMethod::Email).as_deref(),
            Some("a@example.org")
        );
        assert_eq!(
            participant_identity(PREFIX, &row, AuthorizationMethod::Phone).as_deref(),
            Some("+34666666666")
        );
        let empty = participant(None, Some("  "), None);
        assert!(participant_identity(PREFIX, &empty, AuthorizationMethod::Both).is_none());
    }

    #[test]
    fn global_ids_parse_back_to_user_ids() {
        assert_eq!(user_id_from_global_id(PREFIX, &user_global_id(PREFIX, 42)), Some(42));
        assert_eq!(user_id_from_global_id(PREFIX, "a@example.org"), None);
        assert_eq!(user_id_from_global_id(PREFIX, "gid://decidim/Decidim::User/abc"), None);
    }

    #[test]
    fn phone_sanitization_keeps_digits_and_plus() {
        assert_eq!(sanitize_phone("+34 666 666 666"), "+34666666666");
        assert_eq!(sanitize_phone("+1 (555) 123-4567"), "+15551234567");
        assert_eq!(sanitize_phone("666.555.4444"), "6665554444");
        assert_eq!(sanitize_phone(""), "");
    }

    #[test]
    fn phone_candidates_cover_prefix_variants() {
        let prefixes = vec!["+34".to_string(), "0034".to_string(), "34".to_string()];
        let candidates = phone_candidates("666 666 666", &prefixes);
        assert!(candidates.contains(&"666666666".to_string()));
        assert!(candidates.contains(&"+34666666666".to_string()));
        assert!(candidates.contains(&"0034666666666".to_string()));

        let prefixed = phone_candidates("+34666666666", &prefixes);
        assert!(prefixed.contains(&"666666666".to_string()));
        assert!(phone_candidates("", &prefixes).is_empty());
    }

    #[test]
    fn translation_falls_back_to_any_locale() {
        let value = json!({"ca": "Hola", "en": ""});
        assert_eq!(translated(&value, "en"), "Hola");
        assert_eq!(translated(&json!({"en": "Hello"}), "en"), "Hello");
        assert_eq!(translated(&json!("plain"), "en"), "plain");
        assert_eq!(translated(&json!(null), "en"), "");
    }
}
