// src/services/events.rs

//! Workflow actions on judicial events.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::{Deadline, EventStatus, JudicialEvent};
use crate::services::deadlines::UrgencyCalculator;
use crate::storage::PublicationStore;
use crate::utils::Clock;

/// An event together with its deadline, urgency as of today.
#[derive(Debug, Clone, PartialEq)]
pub struct EventView {
    pub event: JudicialEvent,
    pub deadline: Option<Deadline>,
}

/// Reads and moves events through their workflow.
pub struct EventService {
    publications: Arc<dyn PublicationStore>,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(publications: Arc<dyn PublicationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            publications,
            clock,
        }
    }

    /// Events of an organization still requiring attention.
    ///
    /// Urgency is recomputed from each deadline at read time. Results are
    /// ordered by due date, events without deadline last.
    pub async fn list_open(&self, org_id: &str) -> Result<Vec<EventView>> {
        let mut views = Vec::new();
        for event in self.publications.list_events(org_id).await? {
            if event.status.is_open() {
                views.push(self.view(event).await?);
            }
        }
        views.sort_by_key(|v| v.deadline.as_ref().map_or(NaiveDate::MAX, |d| d.due_on));
        Ok(views)
    }

    pub async fn get(&self, event_id: &str) -> Result<EventView> {
        let event = self.load(event_id).await?;
        self.view(event).await
    }

    /// Assign an event; the deadline follows if it has no assignee yet.
    pub async fn assign(&self, event_id: &str, user_id: &str) -> Result<EventView> {
        let mut event = self.load(event_id).await?;
        let now = self.clock.now();
        event.assign(user_id, now)?;
        self.publications.save_event(&event).await?;

        let deadline = match event.deadline_id.as_deref() {
            Some(id) => self.publications.get_deadline(id).await?,
            None => None,
        };
        if let Some(mut deadline) = deadline.filter(|d| d.assignee_id.is_none()) {
            deadline.assignee_id = Some(user_id.to_string());
            self.publications.save_deadline(&deadline).await?;
        }

        log::info!("Event {} assigned to {}", event_id, user_id);
        self.view(event).await
    }

    /// Move an event forward in its workflow.
    pub async fn advance(&self, event_id: &str, next: EventStatus) -> Result<EventView> {
        let mut event = self.load(event_id).await?;
        let previous = event.status;
        event.transition_to(next, self.clock.now())?;
        self.publications.save_event(&event).await?;
        log::info!("Event {} moved from {} to {}", event_id, previous, next);
        self.view(event).await
    }

    async fn load(&self, event_id: &str) -> Result<JudicialEvent> {
        self.publications
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::not_found("event", event_id))
    }

    async fn view(&self, mut event: JudicialEvent) -> Result<EventView> {
        let deadline = match event.deadline_id.as_deref() {
            Some(id) => self.publications.get_deadline(id).await?,
            None => None,
        };
        if let Some(deadline) = &deadline {
            event.urgency = UrgencyCalculator::calculate(deadline.due_on, self.clock.today());
        }
        Ok(EventView { event, deadline })
    }
}
