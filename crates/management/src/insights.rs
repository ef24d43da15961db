//! Campaign insights: delivery rate, status summaries, message suggestions
//! and personalization placeholders.

use crm_core::Customer;

use crate::models::{Campaign, CampaignStatus};

/// Expected delivery rate quoted for drafts.
const EXPECTED_DELIVERY_RATE: f64 = 96.0;

/// Delivered messages as a percentage of the audience. Zero for an empty audience.
pub fn delivery_rate(campaign: &Campaign) -> f64 {
    if campaign.audience_size() == 0 {
        return 0.0;
    }
    campaign.delivered_count() as f64 / campaign.audience_size() as f64 * 100.0
}

pub fn campaign_summary(campaign: &Campaign) -> String {
    let rate = delivery_rate(campaign);
    let audience = format_count(campaign.audience_size());
    match campaign.status() {
        CampaignStatus::Completed => format!(
            "Your campaign \"{}\" reached {} customers with a {:.1}% delivery rate. \
             Out of all messages, {} failed to deliver.",
            campaign.name,
            audience,
            rate,
            format_count(campaign.failed_count())
        ),
        CampaignStatus::Failed => format!(
            "Your campaign \"{}\" stopped after delivering {} of {} messages ({:.1}% delivery rate); \
             {} failed and {} were never sent.",
            campaign.name,
            format_count(campaign.delivered_count()),
            audience,
            rate,
            format_count(campaign.failed_count()),
            format_count(campaign.pending_count())
        ),
        CampaignStatus::Sending => format!(
            "Your campaign \"{}\" is currently in progress. So far, {} out of {} messages \
             have been delivered ({:.1}% delivery rate).",
            campaign.name,
            format_count(campaign.delivered_count()),
            audience,
            rate
        ),
        CampaignStatus::Draft => format!(
            "Your draft campaign \"{}\" is ready to be sent to {} customers. Based on previous \
             campaigns, we expect a delivery rate of approximately {:.0}%.",
            campaign.name, audience, EXPECTED_DELIVERY_RATE
        ),
    }
}

/// Three message templates for a segment and campaign objective.
/// Templates use `{customer.firstName}` and are filled by [`render_message`].
pub fn message_suggestions(segment_name: &str, objective: &str) -> Vec<String> {
    let objective = objective.trim().trim_end_matches('.');
    let focus = if objective.is_empty() {
        String::new()
    } else {
        format!(" {}", lowercase_first(objective))
    };
    vec![
        format!(
            "Hi {{customer.firstName}}, as one of our {segment_name} we have something special for you{focus}. Here's 10% off your next purchase!"
        ),
        format!(
            "{{customer.firstName}}, we saved an exclusive offer for our {segment_name}{focus}. Come back and enjoy it today."
        ),
        format!(
            "Hey {{customer.firstName}}! It's been a while. Here's a special offer to welcome you back{focus}."
        ),
    ]
}

/// Fill personalization placeholders for one customer.
pub fn render_message(template: &str, customer: &Customer) -> String {
    template
        .replace("{customer.firstName}", customer.first_name())
        .replace("{customer.name}", &customer.name)
        .replace("{customer.email}", &customer.email)
}

/// Group digits with commas: `1242` -> `1,242`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
