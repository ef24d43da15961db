//! CRM console: segment, campaign and session commands over the demo store.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crm_core::config::AppConfig;
use crm_core::CrmError;
use crm_management::{
    Campaign, CampaignMessage, CampaignStatus, CrmStore, CustomerQuery, DeliverySimulator, MockDataProvider,
    SortDirection,
};
use crm_platform::{FileSessionStore, IdentityClaims, SessionContext};
use crm_segmentation::{AudienceEstimator, AudienceEvaluator, EstimateOutcome, RawRule, Rule, Segment};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "crm-console")]
#[command(about = "Customer segments, audience estimates and campaign delivery")]
#[command(version)]
struct Cli {
    /// Simulate an unreachable data provider
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Drop simulated provider latency
    #[arg(long, default_value_t = false)]
    instant: bool,

    /// Session file (overrides config)
    #[arg(long, env = "CRM__SESSION__STORE_PATH")]
    session_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dashboard stats and recent campaigns
    Dashboard,
    /// Saved segments with their audience sizes
    Segments,
    /// Customer list, searched and sorted
    Customers {
        /// Matches name, email or phone
        #[arg(long, default_value = "")]
        search: String,
        /// name, email, totalSpend, visitCount, lastActivity or createdAt
        #[arg(long, default_value = "name")]
        sort: String,
        #[arg(long, default_value_t = false)]
        desc: bool,
    },
    /// Campaign history filtered by name and status
    Campaigns {
        #[arg(long, default_value = "")]
        search: String,
        /// draft, sending, completed or failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Exact audience size for a JSON array of rules
    Estimate {
        #[arg(long)]
        rules: String,
    },
    /// Create a segment from a JSON array of rules
    CreateSegment {
        #[arg(long)]
        name: String,
        #[arg(long)]
        rules: String,
    },
    /// Delete a saved segment by name
    DeleteSegment {
        #[arg(long)]
        name: String,
    },
    /// Create a campaign for a saved segment and send it
    Send {
        #[arg(long)]
        segment: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        objective: String,
    },
    /// Sign in with an identity token
    Login {
        #[arg(long)]
        token: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_console=info,crm_segmentation=info,crm_management=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_input_error(&err) => {
            warn!(error = %format!("{err:#}"), "Rejected input");
            eprintln!("invalid input: {err:#}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "Command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if cli.instant {
        config.provider = crm_core::config::ProviderConfig {
            offline: config.provider.offline,
            ..crm_core::config::ProviderConfig::instant()
        };
    }
    if cli.offline {
        config.provider.offline = true;
    }
    if let Some(path) = cli.session_file {
        config.session.store_path = path;
    }

    info!(
        offline = config.provider.offline,
        session = %config.session.store_path,
        "Configuration loaded"
    );

    let mut session = match SessionContext::restore(
        FileSessionStore::new(&config.session.store_path),
        config.session.storage_key.clone(),
    ) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(error = %e, "Session store unavailable, continuing signed out");
            None
        }
    };

    let store = Arc::new(CrmStore::with_demo_data(&config.campaigns)?);
    let provider = MockDataProvider::new(store.clone(), config.provider.clone(), config.campaigns.recent_limit);

    match cli.command {
        Command::Dashboard => {
            let view = provider.load_dashboard().await;
            print_json(&view)?;
        }
        Command::Segments => {
            let segments: Vec<SegmentRow> = provider
                .segments_or_empty()
                .await
                .iter()
                .map(SegmentRow::from)
                .collect();
            print_json(&segments)?;
        }
        Command::Customers { search, sort, desc } => {
            let query = CustomerQuery {
                search,
                sort_by: sort.parse()?,
                direction: if desc { SortDirection::Desc } else { SortDirection::Asc },
            };
            print_json(&provider.customers_or_empty(&query).await)?;
        }
        Command::Campaigns { search, status } => {
            let status = status
                .as_deref()
                .map(str::parse::<CampaignStatus>)
                .transpose()?;
            print_json(&provider.campaign_history_or_empty(&search, status).await)?;
        }
        Command::Estimate { rules } => {
            let raw: Vec<RawRule> = serde_json::from_str(&rules).context("parsing --rules")?;
            let size = provider.calculate_audience_size(&raw).await?;
            print_json(&serde_json::json!({ "audienceSize": size }))?;
        }
        Command::CreateSegment { name, rules } => {
            let rules: Vec<Rule> = serde_json::from_str(&rules).context("parsing --rules")?;
            let customers = Arc::new(provider.fetch_customers().await?);

            let estimator = AudienceEstimator::new(AudienceEvaluator::new(), &config.estimator);
            if let EstimateOutcome::Published(estimate) =
                estimator.recompute(rules.clone(), customers.clone()).await?
            {
                info!(audience = estimate.audience_size, "Audience estimate ready");
            }

            let segment = Segment::create(&name, rules, &AudienceEvaluator::new(), &customers)?;
            let segment = store.save_segment(segment)?;
            print_json(&SegmentRow::from(&segment))?;
        }
        Command::DeleteSegment { name } => {
            let segment = store
                .find_segment(&name)
                .ok_or_else(|| CrmError::not_found("segment", &name))?;
            let deleted = store.delete_segment(segment.id);
            print_json(&serde_json::json!({ "name": segment.name, "deleted": deleted }))?;
        }
        Command::Send {
            segment,
            name,
            objective,
        } => {
            let segment = store
                .find_segment(&segment)
                .with_context(|| format!("no segment named '{segment}'"))?;
            let customers = provider.fetch_customers().await?;

            let mut campaign = Campaign::from_segment(&name, &segment, &AudienceEvaluator::new(), &customers)?;
            let suggestions = provider
                .generate_message_suggestions(&segment.name, &objective)
                .await?;
            if let Some(body) = suggestions.into_iter().next() {
                campaign.set_message(CampaignMessage::new(name.clone(), body))?;
            }
            let id = store.save_campaign(campaign).id;

            let mut simulator = DeliverySimulator::new(&config.campaigns);
            let sent = store.send_campaign(id, &mut simulator)?;
            let summary = provider.generate_campaign_summary(sent.id).await?;
            print_json(&serde_json::json!({
                "campaign": sent,
                "summary": summary,
            }))?;
        }
        Command::Login { token } => {
            let claims = IdentityClaims::from_id_token(&token)?;
            let session = session.as_mut().context("session store unavailable")?;
            print_json(session.sign_in(claims)?)?;
        }
        Command::Logout => {
            session
                .as_mut()
                .context("session store unavailable")?
                .sign_out()?;
            print_json(&serde_json::json!({ "authenticated": false }))?;
        }
        Command::Whoami => match session.as_ref().and_then(|s| s.user()) {
            Some(user) => print_json(user)?,
            None => print_json(&serde_json::json!({ "authenticated": false }))?,
        },
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentRow {
    id: uuid::Uuid,
    name: String,
    audience_size: u64,
    rules: String,
}

impl From<&Segment> for SegmentRow {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id,
            name: segment.name.clone(),
            audience_size: segment.audience_size,
            rules: segment.describe(),
        }
    }
}

/// Caller mistakes (bad rules JSON, invalid values, illegal transitions)
/// exit with status 2 instead of 1.
fn is_input_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CrmError>().is_some_and(CrmError::is_input_error)
        || err.downcast_ref::<serde_json::Error>().is_some()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
