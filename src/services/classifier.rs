// src/services/classifier.rs

//! Keyword-based event classification and monitor filter matching.

use crate::models::{ClassifierConfig, FilterKind, MonitorFilter};
use crate::services::identifier;

/// Outcome of classifying one publication text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub event_type: String,

    /// Keyword that decided the event type, if any
    pub matched_keyword: Option<String>,

    /// Identifiers found in the text, in order of appearance
    pub identifiers: Vec<String>,
}

impl Classification {
    /// The first identifier found in the text.
    pub fn main_identifier(&self) -> Option<&str> {
        self.identifiers.first().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct PreparedGroup {
    event_type: String,
    keywords: Vec<String>,
}

/// Ordered keyword table, lowercased once at construction.
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    groups: Vec<PreparedGroup>,
    fallback: String,
}

impl ContentClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let groups = config
            .groups
            .iter()
            .map(|g| PreparedGroup {
                event_type: g.event_type.clone(),
                keywords: g
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self {
            groups,
            fallback: config.fallback.clone(),
        }
    }

    /// Tag the text with the first group that has a keyword hit.
    ///
    /// Group order decides; where a keyword sits in the text does not.
    pub fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        let hit = self.groups.iter().find_map(|group| {
            group
                .keywords
                .iter()
                .find(|k| lowered.contains(k.as_str()))
                .map(|k| (group.event_type.clone(), k.clone()))
        });

        let (event_type, matched_keyword) = match hit {
            Some((event_type, keyword)) => (event_type, Some(keyword)),
            None => (self.fallback.clone(), None),
        };

        Classification {
            event_type,
            matched_keyword,
            identifiers: identifier::extract_all(text),
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

/// First filter matching the text, in list order.
///
/// `identifiers` are the identifiers already extracted from `text`.
pub fn match_filters<'a>(
    text: &str,
    identifiers: &[String],
    filters: &'a [MonitorFilter],
) -> Option<&'a MonitorFilter> {
    let mut text_digits: Option<String> = None;
    let mut text_lower: Option<String> = None;

    filters.iter().find(|filter| match filter.kind {
        FilterKind::CaseNumber => {
            let wanted = identifier::normalize(&filter.value);
            !wanted.is_empty()
                && identifiers
                    .iter()
                    .any(|id| identifier::normalize(id) == wanted)
        }
        FilterKind::Registration => {
            let wanted = identifier::normalize(&filter.value);
            let digits = text_digits.get_or_insert_with(|| identifier::normalize(text));
            !wanted.is_empty() && digits.contains(&wanted)
        }
        FilterKind::Keyword => {
            if filter.value.is_empty() {
                false
            } else if filter.case_sensitive {
                text.contains(&filter.value)
            } else {
                let lowered = text_lower.get_or_insert_with(|| text.to_lowercase());
                lowered.contains(&filter.value.to_lowercase())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeywordGroup;

    fn filter(id: &str, kind: FilterKind, value: &str, case_sensitive: bool) -> MonitorFilter {
        MonitorFilter {
            id: id.into(),
            org_id: None,
            kind,
            value: value.into(),
            case_sensitive,
        }
    }

    #[test]
    fn test_classify_sentenca() {
        let c = ContentClassifier::default();
        let result = c.classify("Sentença proferida nos autos 1234567-12.2023.8.26.0100");
        assert_eq!(result.event_type, "sentenca");
        assert_eq!(result.matched_keyword.as_deref(), Some("sentença"));
        assert_eq!(result.main_identifier(), Some("1234567-12.2023.8.26.0100"));
    }

    #[test]
    fn test_classify_falls_back() {
        let c = ContentClassifier::default();
        let result = c.classify("Juntada de petição");
        assert_eq!(result.event_type, "movimentacao");
        assert!(result.matched_keyword.is_none());
        assert!(result.identifiers.is_empty());
    }

    #[test]
    fn test_table_order_beats_text_position() {
        let config = ClassifierConfig {
            groups: vec![
                KeywordGroup {
                    event_type: "first".into(),
                    keywords: vec!["alpha".into()],
                },
                KeywordGroup {
                    event_type: "second".into(),
                    keywords: vec!["beta".into()],
                },
            ],
            fallback: "other".into(),
        };
        let c = ContentClassifier::new(&config);
        assert_eq!(c.classify("beta then alpha").event_type, "first");
        assert_eq!(c.classify("alpha then beta").event_type, "first");
        assert_eq!(c.classify("only BETA").event_type, "second");
    }

    #[test]
    fn test_default_table_intimacao_before_sentenca() {
        let c = ContentClassifier::default();
        assert_eq!(
            c.classify("Sentença publicada. Fica intimada a parte autora.").event_type,
            "intimacao"
        );
    }

    #[test]
    fn test_identifier_filter_is_exact() {
        let text = "Processo 1234567-12.2023.8.26.0100";
        let ids = identifier::extract_all(text);
        let filters = vec![
            filter("partial", FilterKind::CaseNumber, "1234567", false),
            filter("exact", FilterKind::CaseNumber, "12345671220238260100", false),
        ];
        assert_eq!(match_filters(text, &ids, &filters).map(|f| f.id.as_str()), Some("exact"));
    }

    #[test]
    fn test_identifier_filter_ignores_plain_text() {
        let text = "Referência 12345671220238260100 sem pontuação";
        let ids = identifier::extract_all(text);
        let filters = vec![filter("id", FilterKind::CaseNumber, "1234567-12.2023.8.26.0100", false)];
        assert!(match_filters(text, &ids, &filters).is_none());
    }

    #[test]
    fn test_registration_filter_uses_digits() {
        let text = "Advogado: Fulano (OAB/SP 123.456)";
        let filters = vec![filter("oab", FilterKind::Registration, "SP123456", false)];
        assert_eq!(
            match_filters(text, &[], &filters).map(|f| f.id.as_str()),
            Some("oab")
        );
    }

    #[test]
    fn test_keyword_case_sensitivity() {
        let text = "Banco Exemplo S.A. intimado";
        let sensitive = vec![filter("k", FilterKind::Keyword, "banco exemplo", true)];
        assert!(match_filters(text, &[], &sensitive).is_none());

        let insensitive = vec![filter("k", FilterKind::Keyword, "banco exemplo", false)];
        assert!(match_filters(text, &[], &insensitive).is_some());
    }

    #[test]
    fn test_first_matching_filter_wins() {
        let text = "Banco Exemplo";
        let filters = vec![
            filter("none", FilterKind::Keyword, "inexistente", false),
            filter("a", FilterKind::Keyword, "banco", false),
            filter("b", FilterKind::Keyword, "exemplo", false),
        ];
        assert_eq!(match_filters(text, &[], &filters).map(|f| f.id.as_str()), Some("a"));
    }

    #[test]
    fn test_empty_filter_values_never_match() {
        let filters = vec![
            filter("k", FilterKind::Keyword, "", false),
            filter("r", FilterKind::Registration, "SP", false),
        ];
        assert!(match_filters("qualquer 123", &[], &filters).is_none());
    }
}
