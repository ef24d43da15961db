//! Simulated message delivery for sending campaigns.
//!
//! Walks a campaign's frozen target list in batches, rolls a seeded outcome
//! per recipient, writes a communication log entry, and records the batch
//! counts on the campaign.

use chrono::{Duration, Utc};
use crm_core::config::CampaignConfig;
use crm_core::{CrmError, CrmResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CommunicationLog, DeliveryStatus};

const FAILURE_REASONS: [&str; 3] = [
    "Mailbox unavailable",
    "Recipient address rejected",
    "Delivery timed out",
];

pub struct DeliverySimulator {
    rng: StdRng,
    failure_rate: f64,
    batch_size: usize,
}

impl DeliverySimulator {
    pub fn new(config: &CampaignConfig) -> Self {
        Self::with_seed(
            config.delivery_seed,
            config.delivery_failure_rate,
            config.delivery_batch_size,
        )
    }

    pub fn with_seed(seed: u64, failure_rate: f64, batch_size: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            batch_size: batch_size.max(1),
        }
    }

    /// Process up to `limit` pending recipients (all of them when `None`).
    pub fn deliver(
        &mut self,
        campaign: &mut Campaign,
        limit: Option<usize>,
    ) -> CrmResult<Vec<CommunicationLog>> {
        if campaign.status() != CampaignStatus::Sending {
            return Err(CrmError::InvalidTransition(format!(
                "campaign {} is {}, not sending",
                campaign.id,
                campaign.status().as_str()
            )));
        }

        let start = campaign.processed_count() as usize;
        let pending = campaign.target().get(start..).unwrap_or_default();
        let take = limit.map_or(pending.len(), |l| l.min(pending.len()));
        let recipients: Vec<Uuid> = pending[..take].to_vec();
        let message_id = campaign.message().map(|m| m.id);

        let mut logs = Vec::with_capacity(recipients.len());
        for batch in recipients.chunks(self.batch_size) {
            let mut delivered = 0u64;
            let mut failed = 0u64;
            for &customer_id in batch {
                let entry = self.attempt(campaign.id, customer_id, message_id);
                match entry.status {
                    DeliveryStatus::Sent => delivered += 1,
                    _ => failed += 1,
                }
                logs.push(entry);
            }
            campaign.record(delivered, failed)?;
            debug!(
                campaign = %campaign.name,
                delivered,
                failed,
                pending = campaign.pending_count(),
                "Delivery batch recorded"
            );
        }
        Ok(logs)
    }

    fn attempt(&mut self, campaign_id: Uuid, customer_id: Uuid, message_id: Option<Uuid>) -> CommunicationLog {
        let sent_at = Utc::now();
        let failed = self.rng.gen_bool(self.failure_rate);
        if failed {
            let reason = FAILURE_REASONS[self.rng.gen_range(0..FAILURE_REASONS.len())];
            CommunicationLog {
                id: Uuid::new_v4(),
                campaign_id,
                customer_id,
                message_id,
                status: DeliveryStatus::Failed,
                sent_at: Some(sent_at),
                delivery_timestamp: None,
                error_message: Some(reason.to_string()),
            }
        } else {
            let latency = Duration::milliseconds(self.rng.gen_range(50..2_000));
            CommunicationLog {
                id: Uuid::new_v4(),
                campaign_id,
                customer_id,
                message_id,
                status: DeliveryStatus::Sent,
                sent_at: Some(sent_at),
                delivery_timestamp: Some(sent_at + latency),
                error_message: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::Customer;
    use crm_segmentation::{AudienceEvaluator, Rule, Segment};

    fn sending_campaign(n: usize) -> Campaign {
        let evaluator = AudienceEvaluator::new();
        let customers: Vec<Customer> = (0..n)
            .map(|i| Customer::new(format!("C{i}"), format!("c{i}@example.com")))
            .collect();
        let segment = Segment::create(
            "Everyone",
            vec![Rule::parse("visitCount", ">=", 0).unwrap()],
            &evaluator,
            &customers,
        )
        .unwrap();
        let mut c = Campaign::from_segment("Blast", &segment, &evaluator, &customers).unwrap();
        c.start_sending().unwrap();
        c
    }

    #[test]
    fn test_full_delivery_reaches_terminal() {
        let mut c = sending_campaign(120);
        let mut sim = DeliverySimulator::with_seed(7, 0.1, 25);
        let logs = sim.deliver(&mut c, None).unwrap();

        assert_eq!(logs.len(), 120);
        assert!(c.is_terminal());
        let sent = logs.iter().filter(|l| l.status == DeliveryStatus::Sent).count() as u64;
        assert_eq!(sent, c.delivered_count());
        assert_eq!(c.delivered_count() + c.failed_count(), 120);
        assert!(logs
            .iter()
            .filter(|l| l.status == DeliveryStatus::Failed)
            .all(|l| l.error_message.is_some()));
    }

    #[test]
    fn test_partial_delivery_resumes() {
        let mut c = sending_campaign(10);
        let mut sim = DeliverySimulator::with_seed(1, 0.0, 3);

        let first = sim.deliver(&mut c, Some(4)).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(c.status(), CampaignStatus::Sending);

        let rest = sim.deliver(&mut c, None).unwrap();
        assert_eq!(rest.len(), 6);
        assert_eq!(rest[0].customer_id, c.target()[4]);
        assert_eq!(c.status(), CampaignStatus::Completed);
        assert_eq!(c.delivered_count(), 10);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let mut a = sending_campaign(50);
        let mut b = sending_campaign(50);
        DeliverySimulator::with_seed(99, 0.3, 10).deliver(&mut a, None).unwrap();
        DeliverySimulator::with_seed(99, 0.3, 10).deliver(&mut b, None).unwrap();
        assert_eq!(a.failed_count(), b.failed_count());
    }

    #[test]
    fn test_finished_campaign_is_rejected() {
        let mut c = sending_campaign(1);
        c.record_delivered(1).unwrap();
        let mut sim = DeliverySimulator::with_seed(1, 0.0, 1);
        assert!(matches!(
            sim.deliver(&mut c, None),
            Err(CrmError::InvalidTransition(_))
        ));
    }
}
