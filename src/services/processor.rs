// src/services/processor.rs

//! Record processor: the single entry point turning a normalized record
//! into a publication, its event and, when a rule applies, a deadline.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Deadline, EventStatus, JudicialEvent, NormalizedRecord, Publication, TenantScope, Urgency,
};
use crate::services::classifier::{self, ContentClassifier};
use crate::services::deadlines::{DeadlineEngine, UrgencyCalculator};
use crate::services::identifier;
use crate::storage::{CaseDirectory, IngestBundle, Insert, PublicationStore, RuleSource};
use crate::utils::Clock;

/// What processing one record produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub publication: Publication,
    pub event: Option<JudicialEvent>,
    pub deadline: Option<Deadline>,

    /// False when the record was already known
    pub created: bool,
}

/// Dedup, classify, match, persist, derive deadline.
pub struct RecordProcessor {
    publications: Arc<dyn PublicationStore>,
    cases: Arc<dyn CaseDirectory>,
    rules: Arc<dyn RuleSource>,
    classifier: ContentClassifier,
    deadlines: DeadlineEngine,
    clock: Arc<dyn Clock>,
}

impl RecordProcessor {
    pub fn new(
        publications: Arc<dyn PublicationStore>,
        cases: Arc<dyn CaseDirectory>,
        rules: Arc<dyn RuleSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            publications,
            cases,
            rules,
            classifier: ContentClassifier::default(),
            deadlines: DeadlineEngine::default(),
            clock,
        }
    }

    pub fn with_classifier(mut self, classifier: ContentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_deadline_engine(mut self, deadlines: DeadlineEngine) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn classifier(&self) -> &ContentClassifier {
        &self.classifier
    }

    /// Ingest one record for a tenant.
    ///
    /// Feeding the same record again returns the stored publication with
    /// `created == false`. Nothing is written unless the publication, its
    /// event and its deadline can be committed together.
    pub async fn process(
        &self,
        scope: &TenantScope,
        record: &NormalizedRecord,
    ) -> Result<ProcessOutcome> {
        let content_hash = record.content_hash();
        if let Some(existing) = self
            .publications
            .find_by_hash(&scope.org_id, &content_hash)
            .await?
        {
            log::debug!("Duplicate {} record {}", record.source, record.source_id);
            return self.duplicate(existing).await;
        }

        let classification = self.classifier.classify(&record.raw_text);

        let mut identifiers = classification.identifiers.clone();
        let case_number = match record.case_number.as_deref().map(canonical_identifier) {
            Some(explicit) if !explicit.is_empty() => {
                identifiers.retain(|id| identifier::normalize(id) != identifier::normalize(&explicit));
                identifiers.insert(0, explicit.clone());
                Some(explicit)
            }
            _ => classification.main_identifier().map(str::to_string),
        };

        let case = match case_number.as_deref() {
            Some(number) => identifier::find_case(self.cases.as_ref(), scope, number).await?,
            None => None,
        };

        let filters = self.rules.monitor_filters(scope).await?;
        let matched_filter_id = classifier::match_filters(&record.raw_text, &identifiers, &filters)
            .map(|f| f.id.clone());

        let rules = self.rules.active_rules(scope).await?;
        let plan = self.deadlines.plan(
            &rules,
            &scope.org_id,
            &classification.event_type,
            record.published_on,
        );

        let now = self.clock.now();
        let today = self.clock.today();
        let case_id = case.as_ref().map(|c| c.id.clone());
        let responsible = case.as_ref().and_then(|c| c.responsible_user_id.clone());

        let publication = Publication {
            id: Uuid::new_v4().to_string(),
            org_id: scope.org_id.clone(),
            content_hash,
            source: record.source,
            source_id: record.source_id.clone(),
            raw_text: record.raw_text.clone(),
            published_on: record.published_on,
            case_number,
            case_id: case_id.clone(),
            metadata: record.metadata.clone(),
            created_at: now,
        };

        let event_id = Uuid::new_v4().to_string();
        let deadline = plan.map(|plan| Deadline {
            id: Uuid::new_v4().to_string(),
            org_id: scope.org_id.clone(),
            case_id: case_id.clone(),
            event_id: event_id.clone(),
            rule_id: plan.rule_id,
            title: plan.title,
            due_on: plan.due_on,
            priority: plan.priority,
            assignee_id: responsible.clone(),
            created_at: now,
        });

        let event = JudicialEvent {
            id: event_id,
            org_id: scope.org_id.clone(),
            publication_id: publication.id.clone(),
            case_id,
            event_type: classification.event_type,
            status: if responsible.is_some() {
                EventStatus::Assigned
            } else {
                EventStatus::New
            },
            urgency: deadline
                .as_ref()
                .map(|d| UrgencyCalculator::calculate(d.due_on, today))
                .unwrap_or(Urgency::Normal),
            deadline_id: deadline.as_ref().map(|d| d.id.clone()),
            assignee_id: responsible,
            matched_filter_id,
            identifiers,
            created_at: now,
            updated_at: now,
        };

        let bundle = IngestBundle {
            publication,
            event: event.clone(),
            deadline: deadline.clone(),
        };

        match self.publications.commit_ingest(bundle).await? {
            Insert::Created(publication) => {
                log::info!(
                    "Ingested {} record {} as {} ({}{})",
                    record.source,
                    record.source_id,
                    event.event_type,
                    event.status,
                    deadline
                        .as_ref()
                        .map(|d| format!(", due {}", d.due_on))
                        .unwrap_or_default()
                );
                Ok(ProcessOutcome {
                    publication,
                    event: Some(event),
                    deadline,
                    created: true,
                })
            }
            Insert::AlreadyExists(existing) => {
                log::debug!(
                    "Record {} committed concurrently; using stored publication",
                    record.source_id
                );
                self.duplicate(existing).await
            }
        }
    }

    async fn duplicate(&self, publication: Publication) -> Result<ProcessOutcome> {
        let mut event = self.publications.event_for_publication(&publication.id).await?;
        let deadline = match event.as_ref().and_then(|e| e.deadline_id.as_deref()) {
            Some(id) => self.publications.get_deadline(id).await?,
            None => None,
        };
        if let (Some(event), Some(deadline)) = (event.as_mut(), deadline.as_ref()) {
            event.urgency = UrgencyCalculator::calculate(deadline.due_on, self.clock.today());
        }
        Ok(ProcessOutcome {
            publication,
            event,
            deadline,
            created: false,
        })
    }
}

/// Punctuated form when the input carries 20 digits, trimmed input otherwise.
fn canonical_identifier(input: &str) -> String {
    let digits = identifier::normalize(input);
    if digits.len() == identifier::CNJ_DIGITS {
        identifier::format(&digits)
    } else {
        input.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::{
        DeadlinePriority, DeadlineRule, FilterKind, MonitorFilter, SourceTag, TrackedCase,
    };
    use crate::storage::MemoryStore;
    use crate::utils::FixedClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sentenca_rule() -> DeadlineRule {
        DeadlineRule {
            id: "sentenca-15".into(),
            org_id: None,
            event_type: "sentenca".into(),
            days: 15,
            business_days: true,
            auto_create: true,
            default_urgency: Urgency::Normal,
            priority: 0,
            active: true,
            title: None,
        }
    }

    fn record() -> NormalizedRecord {
        NormalizedRecord::new(
            SourceTag::Manual,
            "manual-1",
            "Sentença proferida nos autos 1234567-12.2023.8.26.0100",
            date(2024, 3, 1),
        )
    }

    fn processor(store: &Arc<MemoryStore>, today: NaiveDate) -> RecordProcessor {
        RecordProcessor::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(FixedClock::on(today)),
        )
    }

    fn scope() -> TenantScope {
        TenantScope::org("org-1")
    }

    #[tokio::test]
    async fn test_end_to_end_example() {
        let store = Arc::new(MemoryStore::new().with_rules(vec![sentenca_rule()]));
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        assert!(outcome.created);

        let event = outcome.event.unwrap();
        assert_eq!(event.event_type, "sentenca");
        assert_eq!(event.status, EventStatus::New);
        assert_eq!(event.urgency, Urgency::Normal);
        assert!(event.case_id.is_none());

        let deadline = outcome.deadline.unwrap();
        assert_eq!(deadline.due_on, date(2024, 3, 22));
        assert_eq!(deadline.priority, DeadlinePriority::Medium);
        assert_eq!(deadline.event_id, event.id);
        assert_eq!(event.deadline_id.as_deref(), Some(deadline.id.as_str()));

        assert_eq!(
            outcome.publication.case_number.as_deref(),
            Some("1234567-12.2023.8.26.0100")
        );
        assert_eq!(store.publication_count(), 1);
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.deadline_count(), 1);
    }

    #[tokio::test]
    async fn test_same_record_is_ingested_once() {
        let store = Arc::new(MemoryStore::new().with_rules(vec![sentenca_rule()]));
        let p = processor(&store, date(2024, 3, 1));

        let first = p.process(&scope(), &record()).await.unwrap();
        for _ in 0..3 {
            let again = p.process(&scope(), &record()).await.unwrap();
            assert!(!again.created);
            assert_eq!(again.publication.id, first.publication.id);
            assert_eq!(
                again.event.as_ref().map(|e| &e.id),
                first.event.as_ref().map(|e| &e.id)
            );
            assert_eq!(again.deadline, first.deadline);
        }
        assert_eq!(store.publication_count(), 1);
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.deadline_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_converges() {
        let store = Arc::new(MemoryStore::new().with_rules(vec![sentenca_rule()]));
        let p = Arc::new(processor(&store, date(2024, 3, 1)));
        let scope = scope();
        let rec = record();

        let (a, b) = tokio::join!(p.process(&scope, &rec), p.process(&scope, &rec));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(u8::from(a.created) + u8::from(b.created), 1);
        assert_eq!(a.publication.id, b.publication.id);
        assert_eq!(store.publication_count(), 1);
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.deadline_count(), 1);
    }

    #[tokio::test]
    async fn test_matched_case_assigns_responsible() {
        let case = TrackedCase {
            id: "case-1".into(),
            org_id: "org-1".into(),
            office_id: None,
            case_number: "12345671220238260100".into(),
            title: "Ação de cobrança".into(),
            responsible_user_id: Some("lawyer-1".into()),
            monitoring_enabled: true,
        };
        let store = Arc::new(
            MemoryStore::new()
                .with_cases(vec![case])
                .with_rules(vec![sentenca_rule()]),
        );
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        let event = outcome.event.unwrap();
        assert_eq!(event.status, EventStatus::Assigned);
        assert_eq!(event.assignee_id.as_deref(), Some("lawyer-1"));
        assert_eq!(event.case_id.as_deref(), Some("case-1"));
        assert_eq!(outcome.publication.case_id.as_deref(), Some("case-1"));
        assert_eq!(
            outcome.deadline.unwrap().assignee_id.as_deref(),
            Some("lawyer-1")
        );
    }

    #[tokio::test]
    async fn test_case_in_other_org_is_not_matched() {
        let case = TrackedCase {
            id: "case-1".into(),
            org_id: "org-2".into(),
            office_id: None,
            case_number: "1234567-12.2023.8.26.0100".into(),
            title: String::new(),
            responsible_user_id: Some("lawyer-1".into()),
            monitoring_enabled: true,
        };
        let store = Arc::new(MemoryStore::new().with_cases(vec![case]));
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        let event = outcome.event.unwrap();
        assert_eq!(event.status, EventStatus::New);
        assert!(event.case_id.is_none());
    }

    #[tokio::test]
    async fn test_explicit_identifier_wins_over_text() {
        let case = TrackedCase {
            id: "case-explicit".into(),
            org_id: "org-1".into(),
            office_id: None,
            case_number: "0001234-71.2024.8.26.0100".into(),
            title: String::new(),
            responsible_user_id: None,
            monitoring_enabled: true,
        };
        let store = Arc::new(MemoryStore::new().with_cases(vec![case]));
        let p = processor(&store, date(2024, 3, 1));

        let rec = record().with_case_number("00012347120248260100");
        let outcome = p.process(&scope(), &rec).await.unwrap();
        assert_eq!(
            outcome.publication.case_number.as_deref(),
            Some("0001234-71.2024.8.26.0100")
        );
        let event = outcome.event.unwrap();
        assert_eq!(event.case_id.as_deref(), Some("case-explicit"));
        assert_eq!(
            event.identifiers,
            vec![
                "0001234-71.2024.8.26.0100".to_string(),
                "1234567-12.2023.8.26.0100".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_no_rule_means_no_deadline() {
        let store = Arc::new(MemoryStore::new());
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        assert!(outcome.deadline.is_none());
        let event = outcome.event.unwrap();
        assert!(event.deadline_id.is_none());
        assert_eq!(event.urgency, Urgency::Normal);
        assert_eq!(store.deadline_count(), 0);
    }

    #[tokio::test]
    async fn test_rule_without_auto_create() {
        let mut rule = sentenca_rule();
        rule.auto_create = false;
        let store = Arc::new(MemoryStore::new().with_rules(vec![rule]));
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        assert!(outcome.deadline.is_none());
    }

    #[tokio::test]
    async fn test_urgency_reflects_processing_day() {
        let store = Arc::new(MemoryStore::new().with_rules(vec![sentenca_rule()]));
        // Late delivery: processed two days before the due date
        let p = processor(&store, date(2024, 3, 20));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        assert_eq!(outcome.event.unwrap().urgency, Urgency::Critical);
    }

    #[tokio::test]
    async fn test_monitor_filter_is_recorded() {
        let filters = vec![MonitorFilter {
            id: "watch-case".into(),
            org_id: Some("org-1".into()),
            kind: FilterKind::CaseNumber,
            value: "1234567-12.2023.8.26.0100".into(),
            case_sensitive: false,
        }];
        let store = Arc::new(MemoryStore::new().with_filters(filters));
        let p = processor(&store, date(2024, 3, 1));

        let outcome = p.process(&scope(), &record()).await.unwrap();
        assert_eq!(
            outcome.event.unwrap().matched_filter_id.as_deref(),
            Some("watch-case")
        );
    }

    #[tokio::test]
    async fn test_hash_scope_is_per_org() {
        let store = Arc::new(MemoryStore::new());
        let p = processor(&store, date(2024, 3, 1));

        assert!(p.process(&scope(), &record()).await.unwrap().created);
        assert!(
            p.process(&TenantScope::org("org-2"), &record())
                .await
                .unwrap()
                .created
        );
        assert_eq!(store.publication_count(), 2);
    }
}
