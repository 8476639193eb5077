use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use grid_client::{
    config::{load_settings, load_settings_from, GridSettings},
    AlwaysConfirm, Confirmation, GridController, GridEvent, GridResource, GridView,
    MutationOutcome, MutationPrompt,
};
use shared::{
    domain::{GridRow, JsonRow},
    query::{ColumnFilters, FilterValue, QueryChange, SortKey},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to ./grid.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the host identity from settings.
    #[arg(long)]
    host_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ResourceArgs {
    #[arg(long)]
    service: String,
    #[arg(long)]
    action: String,
    /// Reply field holding the rows, e.g. `apps`.
    #[arg(long)]
    list_field: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long)]
        limit: Option<u32>,
        /// `field` or `field:desc`, repeatable.
        #[arg(long)]
        sort: Vec<String>,
        /// `field=value`, repeatable.
        #[arg(long)]
        filter: Vec<String>,
        #[arg(long, default_value = "")]
        search: String,
    },
    Delete {
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(long)]
        delete_action: String,
        /// Row identity as printed by `list`.
        #[arg(long)]
        key: String,
        #[arg(long)]
        yes: bool,
    },
}

struct PromptConfirm;

#[async_trait]
impl Confirmation for PromptConfirm {
    async fn confirm(&self, prompt: &MutationPrompt) -> bool {
        let text = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(text).default(false).interact()
        })
        .await;
        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(err)) => {
                warn!(error = %err, "confirmation prompt failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "confirmation prompt task failed");
                false
            }
        }
    }
}

fn resource(args: &ResourceArgs) -> GridResource {
    GridResource::new(&args.service, &args.action, &args.list_field)
}

fn parse_filters(raw: &[String]) -> Result<ColumnFilters> {
    let mut filters = ColumnFilters::new();
    for entry in raw {
        let (field, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("filter `{entry}` is not field=value"))?;
        filters.set(field.trim(), FilterValue::parse(value.trim()));
    }
    Ok(filters)
}

fn parse_sorting(raw: &[String]) -> Result<Vec<SortKey>> {
    raw.iter()
        .map(|entry| SortKey::parse(entry).ok_or_else(|| anyhow!("invalid sort `{entry}`")))
        .collect()
}

/// Supplies the request context and waits for the first reply to land.
async fn load_page(
    grid: &GridController<JsonRow>,
    settings: &GridSettings,
) -> Result<GridView<JsonRow>> {
    let mut view = grid.subscribe();
    if grid.set_context(settings.request_context()).await.is_none() {
        bail!("no host id configured; set host_id in grid.toml, GRID_HOST_ID, or --host-id");
    }
    let settled = view
        .wait_for(|view| !view.in_flight())
        .await
        .context("grid controller dropped")?
        .clone();
    if let Some(err) = &settled.last_error {
        bail!("query failed: {err}");
    }
    Ok(settled)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(host_id) = cli.host_id {
        settings.host_id = Some(host_id);
    }

    match cli.command {
        Command::List {
            resource: args,
            offset,
            limit,
            sort,
            filter,
            search,
        } => {
            let grid = GridController::from_settings(resource(&args), &settings);
            let mut change = QueryChange::default()
                .sorting(parse_sorting(&sort)?)
                .column_filters(parse_filters(&filter)?)
                .global_filter(search);
            if let Some(limit) = limit {
                change = change.limit(limit);
            }
            grid.apply_change(change).await;
            // Offset last so the reshaping change above cannot reset it.
            grid.apply_change(QueryChange::default().offset(offset)).await;

            let page = load_page(&grid, &settings).await?;
            println!(
                "total={} showing={} offset={}",
                page.result.total,
                page.result.rows.len(),
                grid.query_state().await.pagination.offset
            );
            for row in &page.result.rows {
                println!("{}\t{}", row.key(), serde_json::to_string(row)?);
            }
        }
        Command::Delete {
            resource: args,
            delete_action,
            key,
            yes,
        } => {
            let grid = GridController::from_settings(
                resource(&args).with_delete_action(delete_action),
                &settings,
            );
            let mut events = grid.subscribe_events();
            let page = load_page(&grid, &settings).await?;
            let row = page
                .result
                .rows
                .iter()
                .find(|row| row.key().to_string() == key)
                .cloned()
                .with_context(|| format!("no row with key `{key}` on the first page"))?;

            let outcome = if yes {
                grid.delete(&row, &AlwaysConfirm).await?
            } else {
                grid.delete(&row, &PromptConfirm).await?
            };
            match outcome {
                MutationOutcome::Cancelled => println!("cancelled"),
                MutationOutcome::Committed => println!(
                    "deleted {key}; {} rows remain",
                    grid.view().result.total
                ),
                MutationOutcome::RolledBack { reason } => {
                    while let Ok(event) = events.try_recv() {
                        if let GridEvent::MutationRolledBack { key, .. } = event {
                            warn!(%key, "delete reverted");
                        }
                    }
                    bail!("delete failed: {reason}");
                }
            }
        }
    }

    Ok(())
}
