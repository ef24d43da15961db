//! Campaign lifecycle: draft -> sending -> completed | failed.
//!
//! Terminal campaigns accept no further mutation. Counters only grow, and
//! a campaign finishes on its own once every target has been processed.

use chrono::Utc;
use crm_core::{CrmError, CrmResult, Customer};
use crm_segmentation::{AudienceEvaluator, Segment};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Campaign, CampaignMessage, CampaignStatus, StatusTransition};

impl Campaign {
    /// Create a draft targeting the customers `segment` matches right now.
    /// The matched ids are frozen; later edits to the segment do not reach
    /// this campaign.
    pub fn from_segment(
        name: &str,
        segment: &Segment,
        evaluator: &AudienceEvaluator,
        customers: &[Customer],
    ) -> CrmResult<Campaign> {
        let audience = evaluator.evaluate(&segment.rules, customers)?;
        Campaign::with_target(name, segment, audience.customer_ids())
    }

    /// Create a draft with an explicit target list.
    pub fn with_target(name: &str, segment: &Segment, target: Vec<Uuid>) -> CrmResult<Campaign> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CrmError::validation("campaign name must not be empty"));
        }
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: name.to_string(),
            segment_id: segment.id,
            segment_name: segment.name.clone(),
            status: CampaignStatus::Draft,
            audience_size: target.len() as u64,
            delivered_count: 0,
            failed_count: 0,
            target,
            message: None,
            created_at: Utc::now(),
            completed_at: None,
            history: Vec::new(),
        };
        info!(
            campaign = %campaign.name,
            segment = %campaign.segment_name,
            audience = campaign.audience_size,
            "Campaign draft created"
        );
        Ok(campaign)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attach or replace the message. Only drafts can be edited.
    pub fn set_message(&mut self, message: CampaignMessage) -> CrmResult<()> {
        self.ensure_status(CampaignStatus::Draft, "edit message")?;
        if message.body.trim().is_empty() {
            return Err(CrmError::validation("message body must not be empty"));
        }
        self.message = Some(message);
        Ok(())
    }

    /// Begin delivery. A campaign with no audience completes immediately.
    pub fn start_sending(&mut self) -> CrmResult<CampaignStatus> {
        self.ensure_status(CampaignStatus::Draft, "start sending")?;
        self.transition(CampaignStatus::Sending, None)?;
        if self.audience_size == 0 {
            self.transition(CampaignStatus::Completed, Some("empty audience".into()))?;
        }
        Ok(self.status)
    }

    pub fn record_delivered(&mut self, count: u64) -> CrmResult<CampaignStatus> {
        self.record(count, 0)
    }

    pub fn record_failed(&mut self, count: u64) -> CrmResult<CampaignStatus> {
        self.record(0, count)
    }

    /// Add delivery outcomes. Rejected if it would push the processed total
    /// past the audience size.
    pub fn record(&mut self, delivered: u64, failed: u64) -> CrmResult<CampaignStatus> {
        self.ensure_status(CampaignStatus::Sending, "record deliveries")?;

        let processed = self
            .processed_count()
            .checked_add(delivered)
            .and_then(|n| n.checked_add(failed))
            .ok_or_else(|| CrmError::validation("delivery counters overflow"))?;
        if processed > self.audience_size {
            return Err(CrmError::Validation(format!(
                "campaign {} would record {} outcomes for an audience of {}",
                self.id, processed, self.audience_size
            )));
        }

        self.delivered_count += delivered;
        self.failed_count += failed;

        if processed == self.audience_size {
            let terminal = if self.delivered_count == 0 {
                CampaignStatus::Failed
            } else {
                CampaignStatus::Completed
            };
            self.transition(terminal, Some("all targets processed".into()))?;
        }
        Ok(self.status)
    }

    /// Stop a sending campaign and mark it failed. Remaining targets are
    /// left unprocessed.
    pub fn abort(&mut self, reason: &str) -> CrmResult<CampaignStatus> {
        self.ensure_status(CampaignStatus::Sending, "abort")?;
        warn!(campaign = %self.name, pending = self.pending_count(), reason, "Campaign aborted");
        self.transition(CampaignStatus::Failed, Some(reason.to_string()))?;
        Ok(self.status)
    }

    fn ensure_status(&self, expected: CampaignStatus, action: &str) -> CrmResult<()> {
        if self.status == expected {
            return Ok(());
        }
        Err(CrmError::InvalidTransition(format!(
            "cannot {} campaign {} in status {}",
            action,
            self.id,
            self.status.as_str()
        )))
    }

    fn transition(&mut self, to: CampaignStatus, reason: Option<String>) -> CrmResult<()> {
        let from = self.status;
        validate_transition(from, to)?;

        let now = Utc::now();
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.history.push(StatusTransition {
            from,
            to,
            reason,
            timestamp: now,
        });
        info!(
            campaign = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            delivered = self.delivered_count,
            failed = self.failed_count,
            "Campaign status changed"
        );
        Ok(())
    }
}

/// Validate that moving from `from` to `to` is allowed.
pub fn validate_transition(from: CampaignStatus, to: CampaignStatus) -> CrmResult<()> {
    match (from, to) {
        (CampaignStatus::Draft, CampaignStatus::Sending)
        | (CampaignStatus::Sending, CampaignStatus::Completed)
        | (CampaignStatus::Sending, CampaignStatus::Failed) => Ok(()),
        _ => Err(CrmError::InvalidTransition(format!(
            "cannot move from {} to {}",
            from.as_str(),
            to.as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_segmentation::Rule;

    fn segment_and_customers(n: usize) -> (Segment, Vec<Customer>, AudienceEvaluator) {
        let evaluator = AudienceEvaluator::new();
        let customers: Vec<Customer> = (0..n)
            .map(|i| {
                let mut c = Customer::new(format!("Customer {i}"), format!("c{i}@example.com"));
                c.total_spend = 2000.0;
                c
            })
            .collect();
        let segment = Segment::create(
            "Spenders",
            vec![Rule::parse("totalSpend", ">", 1000).unwrap()],
            &evaluator,
            &customers,
        )
        .unwrap();
        (segment, customers, evaluator)
    }

    fn campaign(n: usize) -> Campaign {
        let (segment, customers, evaluator) = segment_and_customers(n);
        Campaign::from_segment("Spring Promotion", &segment, &evaluator, &customers).unwrap()
    }

    #[test]
    fn test_full_lifecycle() {
        let mut c = campaign(10);
        assert_eq!(c.status(), CampaignStatus::Draft);
        assert_eq!(c.audience_size(), 10);

        assert_eq!(c.start_sending().unwrap(), CampaignStatus::Sending);
        assert_eq!(c.record_delivered(6).unwrap(), CampaignStatus::Sending);
        assert_eq!(c.record_failed(1).unwrap(), CampaignStatus::Sending);
        assert_eq!(c.pending_count(), 3);
        assert_eq!(c.record(3, 0).unwrap(), CampaignStatus::Completed);

        assert!(c.completed_at().is_some());
        assert_eq!(c.history().len(), 2);
        assert_eq!(c.delivered_count() + c.failed_count(), c.audience_size());
    }

    #[test]
    fn test_counters_cannot_exceed_audience() {
        let mut c = campaign(5);
        c.start_sending().unwrap();
        c.record_delivered(4).unwrap();
        assert!(matches!(c.record(1, 1), Err(CrmError::Validation(_))));
        assert_eq!(c.delivered_count(), 4);
        assert_eq!(c.failed_count(), 0);
    }

    #[test]
    fn test_terminal_rejects_mutation() {
        let mut c = campaign(2);
        c.start_sending().unwrap();
        c.record_delivered(2).unwrap();
        assert_eq!(c.status(), CampaignStatus::Completed);

        assert!(matches!(c.record_delivered(0), Err(CrmError::InvalidTransition(_))));
        assert!(matches!(c.start_sending(), Err(CrmError::InvalidTransition(_))));
        assert!(matches!(c.abort("late"), Err(CrmError::InvalidTransition(_))));
        assert!(matches!(
            c.set_message(CampaignMessage::new("Hi", "Body")),
            Err(CrmError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_all_failed_ends_failed() {
        let mut c = campaign(3);
        c.start_sending().unwrap();
        assert_eq!(c.record_failed(3).unwrap(), CampaignStatus::Failed);
        assert!(c.is_terminal());
    }

    #[test]
    fn test_abort_and_draft_rules() {
        let mut c = campaign(3);
        assert!(matches!(c.record_delivered(1), Err(CrmError::InvalidTransition(_))));
        assert!(matches!(c.abort("nope"), Err(CrmError::InvalidTransition(_))));

        c.set_message(CampaignMessage::new("We miss you", "Hi {customer.firstName}"))
            .unwrap();
        c.start_sending().unwrap();
        c.record_delivered(1).unwrap();
        assert_eq!(c.abort("provider outage").unwrap(), CampaignStatus::Failed);
        assert_eq!(c.pending_count(), 2);
        assert_eq!(
            c.history().last().and_then(|t| t.reason.as_deref()),
            Some("provider outage")
        );
    }

    #[test]
    fn test_empty_audience_completes_on_send() {
        let mut c = campaign(0);
        assert_eq!(c.start_sending().unwrap(), CampaignStatus::Completed);
    }

    #[test]
    fn test_target_is_frozen() {
        let (segment, customers, evaluator) = segment_and_customers(4);
        let c = Campaign::from_segment("Frozen", &segment, &evaluator, &customers).unwrap();

        let narrowed = segment
            .update_rules(
                vec![Rule::parse("totalSpend", ">", 5000).unwrap()],
                &evaluator,
                &customers,
            )
            .unwrap();
        assert_eq!(narrowed.audience_size, 0);
        assert_eq!(c.audience_size(), 4);
        assert_eq!(c.target().len(), 4);
    }

    #[test]
    fn test_transition_table() {
        use CampaignStatus::*;
        assert!(validate_transition(Draft, Sending).is_ok());
        assert!(validate_transition(Sending, Completed).is_ok());
        assert!(validate_transition(Sending, Failed).is_ok());
        for (from, to) in [
            (Draft, Completed),
            (Sending, Draft),
            (Completed, Sending),
            (Failed, Draft),
            (Completed, Failed),
        ] {
            assert!(validate_transition(from, to).is_err());
        }
    }
}
