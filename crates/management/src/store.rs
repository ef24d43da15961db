//! In-memory CRM store backed by DashMap.
//!
//! Holds customers, saved segments, campaigns and the delivery log. Seeded
//! with demo data so the console and tests have something to work with.

use std::cmp::Ordering;

use chrono::{Duration, Utc};
use crm_core::config::CampaignConfig;
use crm_core::{CrmError, CrmResult, Customer};
use crm_segmentation::{AudienceEvaluator, Conjunction, Rule, Segment};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::delivery::DeliverySimulator;
use crate::models::{
    Campaign, CampaignMessage, CampaignStatus, CommunicationLog, CustomerQuery, CustomerSortField,
    DashboardStats, SortDirection,
};

/// Thread-safe in-memory store for customers, segments, campaigns and delivery logs.
pub struct CrmStore {
    customers: DashMap<Uuid, Customer>,
    segments: DashMap<Uuid, Segment>,
    campaigns: DashMap<Uuid, Campaign>,
    logs: DashMap<Uuid, Vec<CommunicationLog>>,
    /// Held across the name check and insert in `save_segment`.
    segment_writes: Mutex<()>,
}

impl CrmStore {
    pub fn new() -> Self {
        Self {
            customers: DashMap::new(),
            segments: DashMap::new(),
            campaigns: DashMap::new(),
            logs: DashMap::new(),
            segment_writes: Mutex::new(()),
        }
    }

    /// A store pre-populated with demo customers, segments and campaigns.
    pub fn with_demo_data(config: &CampaignConfig) -> CrmResult<Self> {
        let store = Self::new();
        store.seed_demo_data(config)?;
        info!(
            customers = store.customers.len(),
            segments = store.segments.len(),
            campaigns = store.campaigns.len(),
            "CRM store initialized (in-memory, demo data)"
        );
        Ok(store)
    }

    // ─── Customers ─────────────────────────────────────────────────────────

    /// All customers, ordered by name for stable output.
    pub fn list_customers(&self) -> Vec<Customer> {
        self.search_customers(&CustomerQuery::default())
    }

    /// Customers matching `query.search`, ordered by `query.sort_by`.
    pub fn search_customers(&self, query: &CustomerQuery) -> Vec<Customer> {
        let needle = query.search.trim().to_lowercase();
        let mut customers: Vec<Customer> = self
            .customers
            .iter()
            .filter(|r| matches_search(r.value(), &needle))
            .map(|r| r.value().clone())
            .collect();
        customers.sort_by(|a, b| {
            let ord = compare_customers(query.sort_by, a, b).then_with(|| a.id.cmp(&b.id));
            match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        customers
    }

    pub fn get_customer(&self, id: Uuid) -> Option<Customer> {
        self.customers.get(&id).map(|r| r.value().clone())
    }

    pub fn upsert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn customer_count(&self) -> u64 {
        self.customers.len() as u64
    }

    // ─── Segments ──────────────────────────────────────────────────────────

    pub fn list_segments(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self.segments.iter().map(|r| r.value().clone()).collect();
        segments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        segments
    }

    pub fn get_segment(&self, id: Uuid) -> Option<Segment> {
        self.segments.get(&id).map(|r| r.value().clone())
    }

    pub fn find_segment(&self, name: &str) -> Option<Segment> {
        self.segments
            .iter()
            .find(|r| r.value().name.eq_ignore_ascii_case(name.trim()))
            .map(|r| r.value().clone())
    }

    /// Save a whole segment value. Replaces any previous version with the same id.
    pub fn save_segment(&self, segment: Segment) -> CrmResult<Segment> {
        let _guard = self.segment_writes.lock();
        if let Some(existing) = self.find_segment(&segment.name) {
            if existing.id != segment.id {
                return Err(CrmError::Validation(format!(
                    "a segment named '{}' already exists",
                    segment.name
                )));
            }
        }
        self.segments.insert(segment.id, segment.clone());
        info!(segment = %segment.name, audience = segment.audience_size, "Segment saved");
        Ok(segment)
    }

    pub fn delete_segment(&self, id: Uuid) -> bool {
        self.segments.remove(&id).is_some()
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    /// Campaigns, most recent first.
    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self.campaigns.iter().map(|r| r.value().clone()).collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns
    }

    /// Campaigns whose name contains `query` (case-insensitive), optionally
    /// limited to one status. Most recent first.
    pub fn search_campaigns(&self, query: &str, status: Option<CampaignStatus>) -> Vec<Campaign> {
        let needle = query.trim().to_lowercase();
        self.list_campaigns()
            .into_iter()
            .filter(|c| needle.is_empty() || c.name.to_lowercase().contains(&needle))
            .filter(|c| status.map_or(true, |s| c.status() == s))
            .collect()
    }

    pub fn recent_campaigns(&self, limit: usize) -> Vec<Campaign> {
        let mut campaigns = self.list_campaigns();
        campaigns.truncate(limit);
        campaigns
    }

    pub fn get_campaign(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.value().clone())
    }

    pub fn save_campaign(&self, campaign: Campaign) -> Campaign {
        self.campaigns.insert(campaign.id, campaign.clone());
        campaign
    }

    /// Apply `f` to a copy of the stored campaign and keep the result only
    /// if `f` succeeds.
    pub fn update_campaign<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Campaign) -> CrmResult<T>,
    ) -> CrmResult<(Campaign, T)> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| CrmError::not_found("campaign", id))?;
        let mut working = entry.value().clone();
        let out = f(&mut working)?;
        *entry.value_mut() = working.clone();
        Ok((working, out))
    }

    // ─── Delivery Log ──────────────────────────────────────────────────────

    pub fn append_logs(&self, campaign_id: Uuid, logs: Vec<CommunicationLog>) {
        self.logs.entry(campaign_id).or_default().extend(logs);
    }

    pub fn logs_for(&self, campaign_id: Uuid) -> Vec<CommunicationLog> {
        self.logs
            .get(&campaign_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Start delivery for a draft and run `simulator` over the whole target list.
    pub fn send_campaign(&self, id: Uuid, simulator: &mut DeliverySimulator) -> CrmResult<Campaign> {
        let (campaign, logs) = self.update_campaign(id, |c| {
            c.start_sending()?;
            if c.is_terminal() {
                return Ok(Vec::new());
            }
            simulator.deliver(c, None)
        })?;
        self.append_logs(id, logs);
        Ok(campaign)
    }

    // ─── Dashboard ─────────────────────────────────────────────────────────

    pub fn dashboard_stats(&self) -> DashboardStats {
        let active = self
            .campaigns
            .iter()
            .filter(|r| r.value().status() == CampaignStatus::Sending)
            .count() as u64;

        let (delivered, processed) = self.campaigns.iter().fold((0u64, 0u64), |(d, p), r| {
            let c = r.value();
            (d + c.delivered_count(), p + c.processed_count())
        });
        let delivery_rate = if processed > 0 {
            delivered as f64 / processed as f64 * 100.0
        } else {
            0.0
        };

        let visits: Vec<u32> = self.customers.iter().map(|r| r.value().visit_count).collect();
        let max_visits = visits.iter().copied().max().unwrap_or(0);
        let avg_engagement = if max_visits > 0 {
            let mean = visits.iter().map(|&v| f64::from(v)).sum::<f64>() / visits.len() as f64;
            mean / f64::from(max_visits) * 100.0
        } else {
            0.0
        };

        DashboardStats {
            total_customers: self.customer_count(),
            active_campaigns: active,
            delivery_rate: round1(delivery_rate),
            avg_engagement: round1(avg_engagement),
        }
    }

    // ─── Demo Data ─────────────────────────────────────────────────────────

    fn seed_demo_data(&self, config: &CampaignConfig) -> CrmResult<()> {
        let now = Utc::now();
        let evaluator = AudienceEvaluator::at(now);

        // (name, email, phone, spend, visits, idle days, tenure days, tags)
        let customers = [
            ("Alex Johnson", "alex.johnson@example.com", Some("+1-555-123-4567"), 12450.0, 28, 2, 194, &["vip", "frequent-buyer"][..]),
            ("Samantha Williams", "sam.williams@example.com", Some("+1-555-987-6543"), 8975.0, 15, 7, 156, &["regular"][..]),
            ("Michael Chen", "michael.chen@example.com", None, 4350.0, 9, 26, 87, &["new-customer"][..]),
            ("Emily Rodriguez", "emily.rodriguez@example.com", Some("+1-555-234-5678"), 16780.0, 34, 1, 245, &["vip", "loyalty-program"][..]),
            ("David Kim", "david.kim@example.com", None, 2150.0, 5, 58, 128, &["inactive"][..]),
            ("Priya Patel", "priya.patel@example.com", Some("+1-555-345-6789"), 5400.0, 11, 200, 410, &["lapsed"][..]),
            ("Jordan Lee", "jordan.lee@example.com", None, 320.0, 2, 4, 12, &["new-customer"][..]),
        ];
        for (name, email, phone, spend, visits, idle, tenure, tags) in customers {
            let mut c = Customer::new(name, email);
            c.phone = phone.map(str::to_string);
            c.total_spend = spend;
            c.visit_count = visits;
            c.last_activity = now - Duration::days(idle);
            c.created_at = now - Duration::days(tenure);
            c.tags = tags.iter().map(|t| t.to_string()).collect();
            self.upsert_customer(c);
        }
        let customers = self.list_customers();

        let high_spenders = Segment::create(
            "High Spenders",
            vec![Rule::parse("totalSpend", ">", 10000)?],
            &evaluator,
            &customers,
        )?;
        let active_spenders = Segment::create(
            "Active Spenders",
            vec![
                Rule::parse("lastActivity", "<", "90")?,
                Rule::parse("totalSpend", ">", 1000)?.with_conjunction(Conjunction::And),
            ],
            &evaluator,
            &customers,
        )?;
        let new_customers = Segment::create(
            "New Customers",
            vec![Rule::parse("createdAt", "<", "30")?],
            &evaluator,
            &customers,
        )?;
        for segment in [&high_spenders, &active_spenders, &new_customers] {
            self.save_segment(segment.clone())?;
        }

        let mut simulator = DeliverySimulator::new(config);

        let mut completed = Campaign::from_segment("Spring Promotion", &active_spenders, &evaluator, &customers)?;
        completed.set_message(CampaignMessage::new(
            "Spring is here",
            "Hi {customer.firstName}, our spring collection just landed.",
        ))?;
        completed.start_sending()?;
        let logs = simulator.deliver(&mut completed, None)?;
        self.append_logs(completed.id, logs);
        self.save_campaign(completed);

        let mut sending = Campaign::from_segment("Loyalty Rewards", &high_spenders, &evaluator, &customers)?;
        sending.set_message(CampaignMessage::new(
            "Thank you",
            "{customer.firstName}, thanks for being one of our best customers.",
        ))?;
        sending.start_sending()?;
        let logs = simulator.deliver(&mut sending, Some(1))?;
        self.append_logs(sending.id, logs);
        self.save_campaign(sending);

        let draft = Campaign::from_segment("Welcome Series", &new_customers, &evaluator, &customers)?;
        self.save_campaign(draft);

        Ok(())
    }
}

impl Default for CrmStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_search(customer: &Customer, needle: &str) -> bool {
    needle.is_empty()
        || customer.name.to_lowercase().contains(needle)
        || customer.email.to_lowercase().contains(needle)
        || customer.phone.as_deref().is_some_and(|p| p.contains(needle))
}

fn compare_customers(field: CustomerSortField, a: &Customer, b: &Customer) -> Ordering {
    match field {
        CustomerSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        CustomerSortField::Email => a.email.to_lowercase().cmp(&b.email.to_lowercase()),
        CustomerSortField::TotalSpend => a.total_spend.total_cmp(&b.total_spend),
        CustomerSortField::VisitCount => a.visit_count.cmp(&b.visit_count),
        CustomerSortField::LastActivity => a.last_activity.cmp(&b.last_activity),
        CustomerSortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> CrmStore {
        CrmStore::with_demo_data(&CampaignConfig::default()).unwrap()
    }

    #[test]
    fn test_demo_segments_are_evaluated() {
        let store = demo();
        assert_eq!(store.find_segment("high spenders").unwrap().audience_size, 2);
        // Priya is lapsed (200 days) and Jordan spends too little.
        assert_eq!(store.find_segment("Active Spenders").unwrap().audience_size, 5);
        assert_eq!(store.find_segment("New Customers").unwrap().audience_size, 1);
    }

    #[test]
    fn test_demo_campaign_states() {
        let store = demo();
        let campaigns = store.list_campaigns();
        assert_eq!(campaigns.len(), 3);
        let by_name = |n: &str| campaigns.iter().find(|c| c.name == n).unwrap().clone();

        assert!(by_name("Spring Promotion").is_terminal());
        assert_eq!(by_name("Loyalty Rewards").status(), CampaignStatus::Sending);
        assert_eq!(by_name("Loyalty Rewards").processed_count(), 1);
        assert_eq!(by_name("Welcome Series").status(), CampaignStatus::Draft);

        let spring = by_name("Spring Promotion");
        assert_eq!(store.logs_for(spring.id).len() as u64, spring.audience_size());
    }

    #[test]
    fn test_duplicate_segment_name_rejected() {
        let store = demo();
        let evaluator = AudienceEvaluator::new();
        let dup = Segment::create(
            "HIGH SPENDERS",
            vec![Rule::parse("visitCount", ">", 1).unwrap()],
            &evaluator,
            &store.list_customers(),
        )
        .unwrap();
        assert!(matches!(store.save_segment(dup), Err(CrmError::Validation(_))));
    }

    #[test]
    fn test_failed_update_leaves_campaign_unchanged() {
        let store = demo();
        let draft = store
            .list_campaigns()
            .into_iter()
            .find(|c| c.status() == CampaignStatus::Draft)
            .unwrap();

        let result = store.update_campaign(draft.id, |c| c.record_delivered(1));
        assert!(matches!(result, Err(CrmError::InvalidTransition(_))));
        assert_eq!(store.get_campaign(draft.id).unwrap().status(), CampaignStatus::Draft);

        assert!(matches!(
            store.update_campaign(Uuid::new_v4(), |c| c.start_sending()),
            Err(CrmError::NotFound { .. })
        ));
    }

    #[test]
    fn test_send_campaign_runs_to_terminal() {
        let store = demo();
        let segment = store.find_segment("New Customers").unwrap();
        let campaign = Campaign::from_segment(
            "Onboarding",
            &segment,
            &AudienceEvaluator::new(),
            &store.list_customers(),
        )
        .unwrap();
        let id = store.save_campaign(campaign).id;

        let mut sim = DeliverySimulator::with_seed(3, 0.0, 10);
        let sent = store.send_campaign(id, &mut sim).unwrap();
        assert_eq!(sent.status(), CampaignStatus::Completed);
        assert_eq!(store.logs_for(id).len(), 1);
    }

    #[test]
    fn test_concurrent_saves_keep_names_unique() {
        let store = CrmStore::new();
        let customers = vec![Customer::new("Ann Lee", "ann@example.com")];
        let (store_ref, customers) = (&store, &customers);
        let saved: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        let segment = Segment::create(
                            "Regulars",
                            vec![Rule::parse("visitCount", ">", 1).unwrap()],
                            &AudienceEvaluator::new(),
                            customers,
                        )
                        .unwrap();
                        store_ref.save_segment(segment).is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(saved.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.list_segments().len(), 1);
    }

    #[test]
    fn test_lookup_and_delete_by_id() {
        let store = demo();
        let alex = store.search_customers(&CustomerQuery {
            search: "alex".into(),
            ..CustomerQuery::default()
        });
        assert_eq!(alex.len(), 1);
        assert_eq!(
            store.get_customer(alex[0].id).unwrap().email,
            "alex.johnson@example.com"
        );
        assert!(store.get_customer(Uuid::new_v4()).is_none());

        let segment = store.find_segment("New Customers").unwrap();
        assert_eq!(store.get_segment(segment.id).unwrap().name, "New Customers");
        assert!(store.delete_segment(segment.id));
        assert!(store.get_segment(segment.id).is_none());
        assert!(!store.delete_segment(segment.id));
    }

    #[test]
    fn test_search_campaigns_by_name_and_status() {
        let store = demo();
        let names = |found: Vec<Campaign>| found.into_iter().map(|c| c.name).collect::<Vec<_>>();

        assert_eq!(names(store.search_campaigns("PROMO", None)), vec!["Spring Promotion"]);
        assert_eq!(
            names(store.search_campaigns("", Some(CampaignStatus::Draft))),
            vec!["Welcome Series"]
        );
        assert!(store.search_campaigns("promo", Some(CampaignStatus::Draft)).is_empty());
        assert_eq!(store.search_campaigns("  ", None).len(), 3);
    }

    #[test]
    fn test_search_and_sort_customers() {
        let store = demo();
        let query = |search: &str, sort_by, direction| CustomerQuery {
            search: search.to_string(),
            sort_by,
            direction,
        };

        let by_spend = store.search_customers(&query("", CustomerSortField::TotalSpend, SortDirection::Desc));
        assert_eq!(by_spend[0].name, "Emily Rodriguez");
        assert_eq!(by_spend[by_spend.len() - 1].name, "Jordan Lee");

        let by_email = store.search_customers(&query("EXAMPLE.COM", CustomerSortField::Email, SortDirection::Asc));
        assert_eq!(by_email.len(), 7);
        assert_eq!(by_email[0].email, "alex.johnson@example.com");

        let by_phone = store.search_customers(&query("555-9", CustomerSortField::Name, SortDirection::Asc));
        assert_eq!(by_phone.len(), 1);
        assert_eq!(by_phone[0].name, "Samantha Williams");

        let recent = store.search_customers(&query("", CustomerSortField::LastActivity, SortDirection::Desc));
        assert_eq!(recent[0].name, "Emily Rodriguez");
    }

    #[test]
    fn test_dashboard_stats() {
        let store = demo();
        let stats = store.dashboard_stats();
        assert_eq!(stats.total_customers, 7);
        assert_eq!(stats.active_campaigns, 1);
        assert!(stats.delivery_rate >= 0.0 && stats.delivery_rate <= 100.0);
        assert!(stats.avg_engagement > 0.0 && stats.avg_engagement <= 100.0);

        assert_eq!(CrmStore::new().dashboard_stats(), DashboardStats::empty());
    }
}
