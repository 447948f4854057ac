use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod api;
mod config;
mod error;
mod fetch;
mod import;
mod models;
mod report;
mod trend;

use crate::api::ApiClient;
use crate::config::Settings;
use crate::error::FetchError;
use crate::models::{Filters, GroupField, Metric, PredictionRecord, RegionScope};
use crate::trend::ForecastPolicy;

#[derive(Parser)]
#[command(name = "household-trends")]
#[command(about = "Trend aggregation and forecasts over household target predictions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the values available for each filter
    Options {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Print per-group trends, forecasts and the overall trend
    Trends {
        #[command(flatten)]
        args: TrendArgs,
        /// Print the projection as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown trend report
    Report {
        #[command(flatten)]
        args: TrendArgs,
        #[arg(long, default_value = "trends.md")]
        out: PathBuf,
    },
    /// Write households with valid coordinates as JSON map points
    Map {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "points.json")]
        out: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    #[arg(long, value_delimiter = ',')]
    cohort: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    region: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    district: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    cluster: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    cycle: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    evaluation_month: Vec<i64>,
    #[arg(long, value_delimiter = ',')]
    village: Vec<String>,
}

impl FilterArgs {
    fn to_filters(&self) -> Filters {
        Filters {
            cohorts: self.cohort.clone(),
            regions: self.region.clone(),
            districts: self.district.clone(),
            clusters: self.cluster.clone(),
            cycles: self.cycle.clone(),
            evaluation_months: self.evaluation_month.clone(),
            villages: self.village.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    #[command(flatten)]
    filters: FilterArgs,
    /// Restrict every request and result to one region
    #[arg(long)]
    scope_region: Option<String>,
    /// Fetch a single page instead of the full dataset
    #[arg(long, conflicts_with = "csv")]
    page: Option<u32>,
    /// Read records from a CSV file instead of the API
    #[arg(long)]
    csv: Option<PathBuf>,
}

impl SourceArgs {
    fn scope(&self) -> RegionScope {
        match &self.scope_region {
            Some(region) => RegionScope::Region(region.clone()),
            None => RegionScope::All,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct TrendArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Fields to group by, the evaluation month is always included
    #[arg(long, value_delimiter = ',', default_value = "cluster")]
    group_by: Vec<GroupField>,
    /// Statistic to fit trends over: income or achievement
    #[arg(long, default_value = "income")]
    metric: Metric,
    /// Keep forecasts that fall to zero or below
    #[arg(long)]
    unfiltered_forecast: bool,
}

impl TrendArgs {
    fn forecast_policy(&self) -> ForecastPolicy {
        if self.unfiltered_forecast {
            ForecastPolicy::Unfiltered
        } else {
            ForecastPolicy::PositiveOnly
        }
    }

    fn project(&self, series: &[models::TimeSeries]) -> models::TrendProjection {
        let points = aggregate::series_points(series, self.metric);
        trend::project_all(&points, self.forecast_policy())
    }
}

fn with_retry_hint<T>(result: Result<T, FetchError>) -> anyhow::Result<T> {
    result.map_err(|error| {
        if error.is_retryable() {
            warn!(%error, "predictions API request failed");
            anyhow::Error::new(error)
                .context("predictions API request failed, retry once the backend is reachable")
        } else {
            anyhow::Error::new(error).context("predictions API returned an unusable response")
        }
    })
}

async fn load_records(
    settings: &Settings,
    source: &SourceArgs,
) -> anyhow::Result<Vec<PredictionRecord>> {
    let filters = source.filters.to_filters();
    let scope = source.scope();

    if let Some(path) = &source.csv {
        let records = import::load_csv(path)?;
        let scoped = filters.scoped(&scope);
        return Ok(records
            .into_iter()
            .filter(|record| scoped.matches(record) && scope.admits(record))
            .collect());
    }

    let client = ApiClient::new(settings)?;
    let records = match source.page {
        Some(page) => {
            fetch::fetch_single(&client, &filters, &scope, page, settings.page_size).await
        }
        None => fetch::fetch_all(&client, &filters, &scope, settings.page_size).await,
    };
    with_retry_hint(records)
}

fn print_trends(args: &TrendArgs, projection: &models::TrendProjection) {
    let header = report::group_header(&args.group_by);
    println!("Trends by {header} ({}):", args.metric.label());

    for group in &projection.groups {
        let forecast = match &group.forecast {
            Some(forecast) => format!("next {:.2} at period {}", forecast.value, forecast.period),
            None => "no forecast".to_string(),
        };
        println!(
            "- {}: {} periods, slope {:.3}, {}",
            report::group_name(&group.labels),
            group.points.len(),
            group.actual.slope,
            forecast
        );
    }

    for labels in &projection.unfitted {
        println!("- {}: not enough periods to fit", report::group_name(labels));
    }

    match &projection.overall {
        Some(line) => println!(
            "Overall: slope {:.3} from period {} to {}",
            line.slope, line.start.period, line.end.period
        ),
        None => println!("Overall: not enough distinct periods."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "household_trends=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    info!(api = %settings.api_url, page_size = settings.page_size, "settings loaded");

    match cli.command {
        Commands::Options { filters } => {
            let client = ApiClient::new(&settings)?;
            let options =
                with_retry_hint(client.fetch_filter_options(&filters.to_filters()).await)?;
            let dimensions = [
                ("Cohorts", &options.cohorts),
                ("Regions", &options.regions),
                ("Districts", &options.districts),
                ("Clusters", &options.clusters),
                ("Cycles", &options.cycles),
                ("Evaluation months", &options.evaluation_months),
                ("Villages", &options.villages),
            ];
            for (name, values) in dimensions {
                if values.is_empty() {
                    println!("{name}: none");
                } else {
                    println!("{name}: {}", values.join(", "));
                }
            }
        }
        Commands::Trends { args, json } => {
            let records = load_records(&settings, &args.source).await?;
            if records.is_empty() {
                println!("No records matched this selection.");
                return Ok(());
            }

            let series = aggregate::aggregate(&records, &args.group_by);
            let projection = args.project(&series);

            if json {
                println!("{}", serde_json::to_string_pretty(&projection)?);
            } else {
                print_trends(&args, &projection);
            }
        }
        Commands::Report { args, out } => {
            let records = load_records(&settings, &args.source).await?;
            let series = aggregate::aggregate(&records, &args.group_by);
            let projection = args.project(&series);

            let scope = args.source.scope();
            let context = report::ReportContext {
                scope: scope.describe(),
                fields: &args.group_by,
                metric: args.metric,
                record_count: records.len(),
                generated_at: chrono::Utc::now(),
            };
            let report = report::build_report(&context, &series, &projection);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Map { source, out } => {
            let records = load_records(&settings, &source).await?;
            let points = aggregate::map_points(&records);
            let skipped = records.len() - points.len();
            if skipped > 0 {
                warn!(skipped, "records without valid coordinates left off the map");
            }
            std::fs::write(&out, serde_json::to_string_pretty(&points)?)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote {} map points to {}.", points.len(), out.display());
        }
    }

    Ok(())
}
