//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crmrelay_api::ApiClient;
use crmrelay_bulkops::{BatchDisposition, BulkCoordinator, BulkReport, CoordinatorOptions};
use crmrelay_selector::Selection;
use crmrelay_shared::{
    AppConfig, BulkAction, Cursor, EntityRef, Outcome, RelationKind, Resource, SearchQuery,
    SelectionMode, TargetContext, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// crmrelay — bulk relationship operations for CRM records.
#[derive(Parser)]
#[command(
    name = "crmrelay",
    version,
    about = "Search CRM listings and run batch sequence, tag, link, and delete operations.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search a resource listing with server-side pagination.
    Search {
        /// Resource to search: contacts, companies, emails, sequences,
        /// tags, products, appointments, or notes.
        resource: String,

        /// Free-text query.
        query: String,

        /// Page size per request.
        #[arg(long)]
        limit: Option<u32>,

        /// Number of pages to fetch.
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Entity ids to exclude from the results.
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Add or remove contacts in a follow-up sequence.
    Sequence {
        /// Operation: add or remove.
        action: String,

        /// Sequence id.
        target: String,

        /// Contact ids to operate on (repeatable).
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },

    /// Apply or remove a tag on contacts.
    Tag {
        /// Operation: add or remove.
        action: String,

        /// Tag id.
        target: String,

        /// Contact ids to operate on (repeatable).
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },

    /// Link or unlink contacts against a target record.
    Link {
        /// Operation: add or remove.
        action: String,

        /// Record id being linked to.
        target: String,

        /// Contact ids to operate on (repeatable).
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },

    /// Batch-delete records from a resource collection.
    Delete {
        /// Resource to delete from.
        resource: String,

        /// Record ids to delete (repeatable).
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "crmrelay=info",
        1 => "crmrelay=debug",
        _ => "crmrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Search {
            resource,
            query,
            limit,
            pages,
            exclude,
        } => cmd_search(&resource, &query, limit, pages, &exclude).await,
        Command::Sequence { action, target, ids } => {
            cmd_membership(RelationKind::Sequence, &action, &target, &ids).await
        }
        Command::Tag { action, target, ids } => {
            cmd_membership(RelationKind::Tag, &action, &target, &ids).await
        }
        Command::Link { action, target, ids } => {
            cmd_membership(RelationKind::Link, &action, &target, &ids).await
        }
        Command::Delete { resource, ids } => cmd_delete(&resource, &ids).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

fn parse_resource(s: &str) -> Result<Resource> {
    match s {
        "contacts" => Ok(Resource::Contacts),
        "companies" => Ok(Resource::Companies),
        "emails" => Ok(Resource::Emails),
        "sequences" => Ok(Resource::Sequences),
        "tags" => Ok(Resource::Tags),
        "products" => Ok(Resource::Products),
        "appointments" => Ok(Resource::Appointments),
        "notes" => Ok(Resource::Notes),
        other => Err(eyre!(
            "unknown resource '{other}': expected contacts, companies, emails, \
             sequences, tags, products, appointments, or notes"
        )),
    }
}

fn parse_membership_action(s: &str) -> Result<BulkAction> {
    match s {
        "add" => Ok(BulkAction::Add),
        "remove" => Ok(BulkAction::Remove),
        other => Err(eyre!("unknown operation '{other}': expected 'add' or 'remove'")),
    }
}

fn selection_from_ids(ids: &[String]) -> Selection {
    let mut selection = Selection::new(SelectionMode::Multiple);
    for id in ids {
        selection.toggle(EntityRef::new(id.clone(), id.clone()));
    }
    selection
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    resource: &str,
    query_text: &str,
    limit: Option<u32>,
    pages: u32,
    exclude: &[String],
) -> Result<()> {
    let config = load_config()?;
    let resource = parse_resource(resource)?;
    let client = ApiClient::from_config(&config)?;
    let limit = limit.unwrap_or(config.search.page_size);

    let mut query = SearchQuery::text(query_text);
    for id in exclude {
        query.exclusions.insert(id.clone().into());
    }

    info!(resource = resource.path(), q = query_text, limit, "searching");

    let spinner = spinner();
    let mut cursor: Option<Cursor> = None;
    let mut shown = 0usize;

    for page_index in 0..pages {
        spinner.set_message(format!("Fetching page {}", page_index + 1));
        let page = client.list(resource, &query, cursor.as_ref(), limit).await?;
        spinner.finish_and_clear();

        for item in page
            .items
            .iter()
            .filter(|item| !query.exclusions.contains(&item.id))
        {
            println!("  {}  {}", item.id, item.display_name);
            shown += 1;
        }

        cursor = page.next_cursor.clone();
        if cursor.is_none() {
            break;
        }
    }

    println!();
    match cursor {
        Some(c) => println!("  {shown} shown, more available (cursor: {})", c.as_str()),
        None => println!("  {shown} shown, end of results"),
    }

    Ok(())
}

async fn cmd_membership(
    kind: RelationKind,
    action: &str,
    target: &str,
    ids: &[String],
) -> Result<()> {
    let action = parse_membership_action(action)?;
    let context = TargetContext::relation(kind, target);
    run_bulk(action, context, ids).await
}

async fn cmd_delete(resource: &str, ids: &[String]) -> Result<()> {
    let resource = parse_resource(resource)?;
    let context = TargetContext::collection(resource);
    run_bulk(BulkAction::Delete, context, ids).await
}

async fn run_bulk(action: BulkAction, context: TargetContext, ids: &[String]) -> Result<()> {
    let config = load_config()?;
    let client = ApiClient::from_config(&config)?;
    let coordinator = BulkCoordinator::new(client, CoordinatorOptions::default());
    let selection = selection_from_ids(ids);

    info!(
        action = action.verb(),
        count = selection.len(),
        "submitting bulk operation"
    );

    let spinner = spinner();
    spinner.set_message(format!("Submitting {} operation", action.verb()));
    let report = coordinator.submit(action, &context, &selection).await?;
    spinner.finish_and_clear();

    print_report(&report);

    if report.reconciliation.disposition == BatchDisposition::TransportError {
        return Err(eyre!("operation failed: {}", report.summary.message));
    }

    Ok(())
}

fn print_report(report: &BulkReport) {
    println!();
    println!("  {}", report.summary.message);

    let failures: Vec<_> = report
        .result
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            Outcome::Failed(reason) => Some((id, reason)),
            _ => None,
        })
        .collect();

    if !failures.is_empty() {
        println!();
        for (id, reason) in failures {
            println!("    {id}: {reason}");
        }
    }
    println!();
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
