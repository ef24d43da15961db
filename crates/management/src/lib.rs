//! Campaign management: lifecycle state machine, simulated delivery,
//! insights, in-memory store and the async data provider.

pub mod delivery;
pub mod insights;
pub mod lifecycle;
pub mod models;
pub mod provider;
pub mod store;

pub use delivery::DeliverySimulator;
pub use models::{
    Campaign, CampaignMessage, CampaignStatus, CommunicationLog, CustomerQuery, CustomerSortField,
    DashboardStats, SortDirection,
};
pub use provider::{DashboardView, MockDataProvider};
pub use store::CrmStore;
