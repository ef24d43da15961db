//! Async data provider over the in-memory store.
//!
//! Every call waits out a configured latency and fails with
//! `DataUnavailable` while the provider is offline. The `*_or_empty`
//! helpers log the failure and fall back to an empty value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crm_core::config::ProviderConfig;
use crm_core::{CrmError, CrmResult, Customer};
use crm_segmentation::{AudienceEvaluator, RawRule, Segment};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::insights;
use crate::models::{Campaign, CampaignStatus, CustomerQuery, DashboardStats};
use crate::store::CrmStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub stats: DashboardStats,
    pub recent_campaigns: Vec<Campaign>,
}

pub struct MockDataProvider {
    store: Arc<CrmStore>,
    config: ProviderConfig,
    evaluator: AudienceEvaluator,
    recent_limit: usize,
    offline: AtomicBool,
}

impl MockDataProvider {
    pub fn new(store: Arc<CrmStore>, config: ProviderConfig, recent_limit: usize) -> Self {
        let offline = AtomicBool::new(config.offline);
        Self {
            store,
            config,
            evaluator: AudienceEvaluator::new(),
            recent_limit,
            offline,
        }
    }

    pub fn with_evaluator(mut self, evaluator: AudienceEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn store(&self) -> &Arc<CrmStore> {
        &self.store
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn fetch_dashboard_stats(&self) -> CrmResult<DashboardStats> {
        self.simulate("dashboard_stats", self.config.stats_latency_ms).await?;
        Ok(self.store.dashboard_stats())
    }

    pub async fn fetch_recent_campaigns(&self) -> CrmResult<Vec<Campaign>> {
        self.simulate("recent_campaigns", self.config.campaigns_latency_ms).await?;
        Ok(self.store.recent_campaigns(self.recent_limit))
    }

    /// Campaign history filtered by name and status.
    pub async fn search_campaigns(
        &self,
        query: &str,
        status: Option<CampaignStatus>,
    ) -> CrmResult<Vec<Campaign>> {
        self.simulate("campaign_history", self.config.campaigns_latency_ms).await?;
        Ok(self.store.search_campaigns(query, status))
    }

    pub async fn fetch_segments(&self) -> CrmResult<Vec<Segment>> {
        self.simulate("segments", self.config.segments_latency_ms).await?;
        Ok(self.store.list_segments())
    }

    pub async fn fetch_customers(&self) -> CrmResult<Vec<Customer>> {
        self.simulate("customers", self.config.customers_latency_ms).await?;
        Ok(self.store.list_customers())
    }

    pub async fn search_customers(&self, query: &CustomerQuery) -> CrmResult<Vec<Customer>> {
        self.simulate("customers", self.config.customers_latency_ms).await?;
        Ok(self.store.search_customers(query))
    }

    /// Exact audience size for wire-form rules against the stored customers.
    pub async fn calculate_audience_size(&self, rules: &[RawRule]) -> CrmResult<u64> {
        self.simulate("audience_size", self.config.estimate_latency_ms).await?;
        let customers = self.store.list_customers();
        let matched = self.evaluator.evaluate_raw(rules, &customers)?;
        Ok(matched.count())
    }

    pub async fn generate_message_suggestions(
        &self,
        segment_name: &str,
        objective: &str,
    ) -> CrmResult<Vec<String>> {
        self.simulate("message_suggestions", self.config.assistant_latency_ms).await?;
        Ok(insights::message_suggestions(segment_name, objective))
    }

    pub async fn generate_campaign_summary(&self, campaign_id: Uuid) -> CrmResult<String> {
        self.simulate("campaign_summary", self.config.assistant_latency_ms).await?;
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .ok_or_else(|| CrmError::not_found("campaign", campaign_id))?;
        Ok(insights::campaign_summary(&campaign))
    }

    /// Load stats and recent campaigns concurrently. Either half degrades to
    /// empty on failure instead of failing the whole view.
    pub async fn load_dashboard(&self) -> DashboardView {
        let (stats, recent) = tokio::join!(self.fetch_dashboard_stats(), self.fetch_recent_campaigns());
        DashboardView {
            stats: or_empty("dashboard_stats", stats, DashboardStats::empty()),
            recent_campaigns: or_empty("recent_campaigns", recent, Vec::new()),
        }
    }

    pub async fn segments_or_empty(&self) -> Vec<Segment> {
        or_empty("segments", self.fetch_segments().await, Vec::new())
    }

    pub async fn customers_or_empty(&self, query: &CustomerQuery) -> Vec<Customer> {
        or_empty("customers", self.search_customers(query).await, Vec::new())
    }

    pub async fn campaign_history_or_empty(
        &self,
        query: &str,
        status: Option<CampaignStatus>,
    ) -> Vec<Campaign> {
        or_empty("campaign_history", self.search_campaigns(query, status).await, Vec::new())
    }

    async fn simulate(&self, call: &'static str, latency_ms: u64) -> CrmResult<()> {
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(CrmError::DataUnavailable(format!("{call}: provider offline")));
        }
        debug!(call, latency_ms, "Provider call served");
        Ok(())
    }
}

fn or_empty<T>(call: &'static str, result: CrmResult<T>, empty: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(call, error = %err, "Data fetch failed, showing empty state");
            empty
        }
    }
}
