//! Rejection reason classification.
//!
//! The authority only sends a free-text message with its rejections, in
//! French or English. This module maps that message to a [`FailureReason`]
//! through an explicit, ordered lookup table. First matching group wins;
//! no match is [`FailureReason::Unknown`].

use didi_scan_types::FailureReason;

/// Language of a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// French.
    French,
    /// English.
    English,
}

/// Keywords that identify one failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordGroup {
    /// Reason reported when any keyword matches.
    pub reason: FailureReason,
    /// Lowercase keywords, tagged by language.
    pub keywords: &'static [(Language, &'static str)],
}

/// The lookup table, in match order.
pub const REASON_TABLE: &[KeywordGroup] = &[
    KeywordGroup {
        reason: FailureReason::AlreadyUsed,
        keywords: &[
            (Language::French, "déjà utilisé"),
            (Language::English, "already used"),
        ],
    },
    KeywordGroup {
        reason: FailureReason::NotFound,
        keywords: &[
            (Language::French, "non trouvé"),
            (Language::English, "not found"),
        ],
    },
    KeywordGroup {
        reason: FailureReason::Expired,
        keywords: &[(Language::French, "expiré"), (Language::English, "expired")],
    },
    KeywordGroup {
        reason: FailureReason::Cancelled,
        keywords: &[
            (Language::French, "annulé"),
            (Language::English, "cancelled"),
        ],
    },
];

/// Classify a rejection message with [`REASON_TABLE`].
pub fn classify(message: Option<&str>) -> FailureReason {
    classify_with(REASON_TABLE, message)
}

/// Classify a rejection message against a given table.
///
/// Matching is a case-insensitive substring search.
pub fn classify_with(table: &[KeywordGroup], message: Option<&str>) -> FailureReason {
    let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
        return FailureReason::Unknown;
    };
    let lower = message.to_lowercase();

    table
        .iter()
        .find(|group| group.keywords.iter().any(|(_, kw)| lower.contains(kw)))
        .map(|group| group.reason)
        .unwrap_or(FailureReason::Unknown)
}
