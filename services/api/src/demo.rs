use crate::infra::{import_entries, load_stores};
use chrono::{Datelike, Local};
use clap::Args;
use kpi_tracker::config::KpiConfig;
use kpi_tracker::error::AppError;
use kpi_tracker::kpi::domain::{Actor, KpiEntry, RawValue, TemplateId, UserId, ValueSubmission};
use kpi_tracker::kpi::memory::{InMemoryStores, KpiSeed};
use kpi_tracker::kpi::stats::{write_csv, Statistics};
use kpi_tracker::kpi::{
    EntryQuery, FixedClock, KpiApi, KpiError, Period, StatisticsQuery, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_SEED: &str = include_str!("../fixtures/demo_seed.json");
const DEMO_ADMIN: &str = "admin-1";
const DEMO_SUPERVISOR: &str = "sdm-1";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reporting month to simulate (defaults to the current month)
    #[arg(long)]
    pub(crate) month: Option<u32>,
    /// Reporting year to simulate (defaults to the current year)
    #[arg(long)]
    pub(crate) year: Option<i32>,
}

#[derive(Args, Debug)]
pub(crate) struct StatsArgs {
    /// Seed file with templates and members
    #[arg(long)]
    pub(crate) seed: PathBuf,
    /// JSON array of entries to rank
    #[arg(long)]
    pub(crate) entries: Option<PathBuf>,
    /// Month, or an offset from the current month when zero or negative
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub(crate) month: i32,
    /// Year, or an offset from the current year when zero or negative
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub(crate) year: i32,
    /// Restrict to the population of one template
    #[arg(long)]
    pub(crate) template: Option<String>,
    #[arg(long)]
    pub(crate) department: Option<String>,
    #[arg(long)]
    pub(crate) role: Option<String>,
    /// Print CSV instead of a table
    #[arg(long)]
    pub(crate) csv: bool,
}

pub(crate) fn demo_stores() -> Result<InMemoryStores, AppError> {
    let seed = KpiSeed::from_reader(DEMO_SEED.as_bytes())?;
    Ok(InMemoryStores::seeded(seed)?)
}

fn demo_config() -> KpiConfig {
    KpiConfig {
        supervisors: vec![
            ("sdm".to_string(), "tehsildar".to_string()),
            ("sdm".to_string(), "patwari".to_string()),
        ],
        ..KpiConfig::default()
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = Local::now().date_naive();
    let period = Period::new(
        args.month.unwrap_or_else(|| today.month()),
        args.year.unwrap_or_else(|| today.year()),
    );
    let config = demo_config();
    let period = period.validate(config.min_year).map_err(KpiError::from)?;

    let clock = Arc::new(
        FixedClock::on(period.year, period.month, 10)
            .ok_or_else(|| KpiError::Validation(format!("cannot simulate {period}")))?,
    );
    let stores = demo_stores()?;
    let api = KpiApi::new(stores.bundle(), &config, clock.clone());
    let admin = api.entries.resolve_actor(&UserId(DEMO_ADMIN.to_string())).await?;
    let supervisor = api
        .entries
        .resolve_actor(&UserId(DEMO_SUPERVISOR.to_string()))
        .await?;

    println!("KPI tracker demo for {period}");
    let template_ids = [
        TemplateId("tpl-tehsildar-monthly".to_string()),
        TemplateId("tpl-patwari-monthly".to_string()),
    ];
    for template_id in &template_ids {
        let report = api
            .batch
            .generate_default_entries(template_id, period, &admin)
            .await?;
        println!(
            "- {}: {} entries for {} members ({} excluded)",
            report.template_id, report.entries_created, report.eligible_members, report.excluded_members
        );
    }

    let entries = api
        .entries
        .get_entries(&EntryQuery {
            month: Some(period.month as i32),
            year: Some(period.year),
            ..EntryQuery::default()
        })
        .await?;
    println!("\nSubmitting sample values as {}", supervisor.user_id);
    for (index, entry) in entries.iter().enumerate() {
        submit_sample(&api, entry, index, &supervisor).await;
    }

    let open = api.statistics.rank(&StatisticsQuery::default()).await?;
    println!("\nLeaderboard while the month is open");
    render_statistics(&open);

    for template_id in &template_ids {
        let sealed = api
            .batch
            .generate_final_reports(template_id, period, &admin)
            .await?;
        println!(
            "\nSealed {} entries for {}",
            sealed.entries_sealed, sealed.template_id
        );
    }

    let next_month = period
        .next()
        .first_day()
        .and_then(|day| day.and_hms_opt(9, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset());
    if let Some(moment) = next_month {
        clock.set(moment);
    }
    let closed = api
        .statistics
        .rank(&StatisticsQuery {
            month: -1,
            ..StatisticsQuery::default()
        })
        .await?;
    println!("\nFinal leaderboard");
    render_statistics(&closed);

    Ok(())
}

async fn submit_sample(api: &KpiApi, entry: &KpiEntry, index: usize, actor: &Actor) {
    let values = sample_values(&entry.template_id, index);
    let reference = entry.kpirefs.as_deref().unwrap_or("N/A");
    match api.entries.submit_values(&entry.id, values, actor).await {
        Ok(scored) => println!(
            "- {} [{}] scored {:.2} ({})",
            scored.created_for,
            reference,
            scored.total_score,
            scored.status.label()
        ),
        Err(err) => println!("- {} [{}] rejected: {}", entry.created_for, reference, err),
    }
}

/// Rotates through a few value sets so the leaderboard has a spread.
fn sample_values(template_id: &TemplateId, index: usize) -> Vec<ValueSubmission> {
    if template_id.0 == "tpl-patwari-monthly" {
        let quality = ["good", "fair", "poor"][index % 3];
        return vec![
            ValueSubmission::new("girdawari_complete", RawValue::Boolean(index % 2 == 0)),
            ValueSubmission::new("record_quality", RawValue::Text(quality.to_string())),
        ];
    }

    let recovery = [94.0, 81.0, 58.0][index % 3];
    let disposed = [62.0, 35.0, 12.0][index % 3];
    let mut values = vec![
        ValueSubmission::new("revenue_recovery", RawValue::Number(recovery)),
        ValueSubmission::new("mutations_disposed", RawValue::Number(disposed)),
        ValueSubmission::new("field_inspection", RawValue::Boolean(index % 2 == 0)),
    ];
    if index == 0 {
        values.push(ValueSubmission::bypassed("special_drive", 1.5));
    }
    values
}

pub(crate) async fn run_stats(args: StatsArgs) -> Result<(), AppError> {
    let config = KpiConfig::from_env()?;
    let stores = load_stores(Some(&args.seed))?;
    if let Some(path) = &args.entries {
        import_entries(&stores, path).await?;
    }

    let clock = Arc::new(SystemClock::new(config.utc_offset()?));
    let api = KpiApi::new(stores.bundle(), &config, clock);
    let statistics = api
        .statistics
        .rank(&StatisticsQuery {
            template_id: args.template.map(TemplateId),
            department: args.department,
            role: args.role,
            month: args.month,
            year: args.year,
        })
        .await?;

    if args.csv {
        write_csv(std::io::stdout().lock(), &statistics.rows)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    } else {
        render_statistics(&statistics);
    }
    Ok(())
}

pub(crate) fn render_statistics(statistics: &Statistics) {
    println!(
        "{} ({:?} ranking, {} rows)",
        statistics.period,
        statistics.policy,
        statistics.rows.len()
    );
    for row in &statistics.rows {
        let rank = if row.rank > 0 {
            format!("#{}", row.rank)
        } else {
            "-".to_string()
        };
        println!(
            "  {:>4} {:<28} {:<10} {:>7.2} {}",
            rank,
            format!("{} [{}]", row.name, row.kpiref),
            row.role,
            row.total_score,
            row.status_label
        );
    }

    let summary = &statistics.summary;
    println!(
        "  {} with entries / {} without | avg {:.2} | high {:.2} | low {:.2} | {:.0}% complete",
        summary.with_entry,
        summary.without_entry,
        summary.average_score,
        summary.highest_score,
        summary.lowest_score,
        summary.completion_rate * 100.0
    );
}
