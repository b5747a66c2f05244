use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockledger_core::{LocationId, PendingProductId, ProductId, UserId};
use stockledger_infra::{
    Catalog, InMemoryLedgerStore, LedgerConfig, LedgerQueries, LedgerSnapshot, MovementRegistrar,
    PurchaseReceipt, PurchaseReceiving, Resolution,
};
use stockledger_inventory::{MovementRequest, NewLocation, NewProduct, StockRecord};
use stockledger_observability::LogFormat;

fn main() -> Result<()> {
    let cli = Cli::parse();
    stockledger_observability::tracing::init(if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    });
    run(cli)
}

#[derive(Parser)]
#[command(name = "stockledger", about = "Inventory ledger maintenance and offline replay", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "stockledger.json",
        help = "Ledger snapshot file; created on first write"
    )]
    state: PathBuf,
    #[arg(long, global = true, help = "Configuration file (defaults to config/stockledger.*)")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured default locations that are missing
    SeedLocations,
    /// Create products and locations from a JSON file
    ImportCatalog(FileArgs),
    /// Replay a queued batch of movement requests, in order
    Replay(ReplayArgs),
    /// Register the inventory lines of a purchase receipt
    Receive(FileArgs),
    #[command(subcommand)]
    Pending(PendingCommands),
    /// Show stock balances
    Stock(StockArgs),
    /// Show movement history, newest first
    History(HistoryArgs),
    /// List active low-stock alerts
    Alerts,
    /// Replay the journal and compare it with stored balances
    Verify,
}

#[derive(Subcommand)]
enum PendingCommands {
    /// List unresolved pending products
    List,
    /// Map a pending product to a catalog product and enter its stock
    Approve(ApproveArgs),
    /// Discard a pending product
    Reject(RejectArgs),
}

#[derive(Args)]
struct FileArgs {
    #[arg(help = "Path to the JSON input")]
    file: PathBuf,
}

#[derive(Args)]
struct ReplayArgs {
    #[arg(help = "JSON array of movement requests")]
    file: PathBuf,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Stop at the first rejected request instead of continuing"
    )]
    fail_fast: bool,
}

#[derive(Args)]
struct ApproveArgs {
    #[arg(help = "Pending product identifier")]
    id: PendingProductId,
    #[arg(long, help = "Catalog product the item corresponds to")]
    product: ProductId,
    #[arg(long, help = "Approving user")]
    by: UserId,
}

#[derive(Args)]
struct RejectArgs {
    #[arg(help = "Pending product identifier")]
    id: PendingProductId,
}

#[derive(Args)]
struct StockArgs {
    #[arg(long, conflicts_with = "location", help = "Balances of one product across locations")]
    product: Option<ProductId>,
    #[arg(long, help = "Balances held at one location")]
    location: Option<LocationId>,
}

#[derive(Args)]
struct HistoryArgs {
    #[arg(long, help = "Only movements of this product")]
    product: Option<ProductId>,
    #[arg(long, help = "Maximum entries (defaults to the configured history limit)")]
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogImport {
    #[serde(default)]
    products: Vec<NewProduct>,
    #[serde(default)]
    locations: Vec<NewLocation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayLine {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    movement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct CliContext {
    store: Arc<InMemoryLedgerStore>,
    config: LedgerConfig,
    state: PathBuf,
    json: bool,
}

impl CliContext {
    fn initialize(cli: &Cli) -> Result<Self> {
        let config = LedgerConfig::load_from(cli.config.as_deref())
            .context("failed to load configuration")?;
        let snapshot = LedgerSnapshot::load(&cli.state)
            .with_context(|| format!("failed to read {}", cli.state.display()))?;
        let store = InMemoryLedgerStore::from_snapshot(snapshot)
            .with_context(|| format!("invalid ledger snapshot {}", cli.state.display()))?;

        Ok(Self {
            store: Arc::new(store),
            config,
            state: cli.state.clone(),
            json: cli.json,
        })
    }

    fn registrar(&self) -> MovementRegistrar<Arc<InMemoryLedgerStore>> {
        MovementRegistrar::new(self.store.clone()).configured(&self.config)
    }

    fn catalog(&self) -> Catalog<Arc<InMemoryLedgerStore>> {
        Catalog::new(self.store.clone()).configured(&self.config)
    }

    fn queries(&self) -> LedgerQueries<Arc<InMemoryLedgerStore>> {
        LedgerQueries::new(self.store.clone()).with_history_limit(self.config.history_limit)
    }

    fn save(&self) -> Result<()> {
        self.store
            .snapshot()?
            .save(&self.state)
            .with_context(|| format!("failed to write {}", self.state.display()))
    }
}

fn run(cli: Cli) -> Result<()> {
    let context = CliContext::initialize(&cli)?;

    match cli.command {
        Commands::SeedLocations => handle_seed_locations(&context)?,
        Commands::ImportCatalog(args) => handle_import_catalog(&context, &args.file)?,
        Commands::Replay(args) => handle_replay(&context, args)?,
        Commands::Receive(args) => handle_receive(&context, &args.file)?,
        Commands::Pending(command) => handle_pending(&context, command)?,
        Commands::Stock(args) => handle_stock(&context, args)?,
        Commands::History(args) => handle_history(&context, args)?,
        Commands::Alerts => handle_alerts(&context)?,
        Commands::Verify => handle_verify(&context)?,
    }

    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn handle_seed_locations(context: &CliContext) -> Result<()> {
    let created = context.catalog().ensure_default_locations()?;
    context.save()?;

    if context.json {
        print_json(&created)?;
    } else if created.is_empty() {
        println!("Default locations already present");
    } else {
        for location in &created {
            println!("Created {} ({:?}) {}", location.name, location.location_type, location.id);
        }
    }
    Ok(())
}

fn handle_import_catalog(context: &CliContext, file: &Path) -> Result<()> {
    let import: CatalogImport = read_json(file)?;
    let catalog = context.catalog();

    let mut products = Vec::with_capacity(import.products.len());
    for input in import.products {
        let sku = input.sku.clone();
        products.push(
            catalog
                .create_product(input)
                .with_context(|| format!("failed to import product {sku}"))?,
        );
    }
    let mut locations = Vec::with_capacity(import.locations.len());
    for input in import.locations {
        locations.push(catalog.create_location(input)?);
    }
    context.save()?;

    if context.json {
        print_json(&serde_json::json!({ "products": products, "locations": locations }))?;
    } else {
        println!("Imported {} products and {} locations", products.len(), locations.len());
    }
    Ok(())
}

fn handle_replay(context: &CliContext, args: ReplayArgs) -> Result<()> {
    let requests: Vec<MovementRequest> = read_json(&args.file)?;
    let registrar = context.registrar();

    let mut lines = Vec::with_capacity(requests.len());
    let mut failed = 0usize;
    for (index, request) in requests.into_iter().enumerate() {
        match registrar.register_movement(request) {
            Ok(registered) => lines.push(ReplayLine {
                index,
                movement_id: Some(registered.movement.id.to_string()),
                error: None,
            }),
            Err(e) => {
                failed += 1;
                warn!(index, error = %e, "queued movement rejected");
                lines.push(ReplayLine {
                    index,
                    movement_id: None,
                    error: Some(e.to_string()),
                });
                if args.fail_fast {
                    break;
                }
            }
        }
    }
    // Committed movements are kept even when a later one fails.
    context.save()?;
    info!(replayed = lines.len(), failed, "replay finished");

    if context.json {
        print_json(&lines)?;
    } else {
        for line in &lines {
            match (&line.movement_id, &line.error) {
                (Some(id), _) => println!("#{} committed {}", line.index, id),
                (None, Some(error)) => println!("#{} rejected: {}", line.index, error),
                (None, None) => {}
            }
        }
    }

    if failed > 0 {
        bail!("{failed} queued movement(s) were rejected");
    }
    Ok(())
}

fn handle_receive(context: &CliContext, file: &Path) -> Result<()> {
    let receipt: PurchaseReceipt = read_json(file)?;
    let registrar = context.registrar();
    let outcome = PurchaseReceiving::new(&registrar).receive(&receipt);
    context.save()?;

    if context.json {
        print_json(&serde_json::json!({
            "movements": outcome.registered.iter().map(|r| &r.movement).collect::<Vec<_>>(),
            "pending": outcome.pending,
            "failures": outcome.failures.iter().map(|f| serde_json::json!({
                "line": f.line,
                "description": f.description,
                "error": f.error,
            })).collect::<Vec<_>>(),
        }))?;
    } else {
        println!(
            "{} entered, {} pending approval, {} failed",
            outcome.registered.len(),
            outcome.pending.len(),
            outcome.failures.len()
        );
        for failure in &outcome.failures {
            println!("- line {} ({}): {}", failure.line, failure.description, failure.error);
        }
    }
    Ok(())
}

fn handle_pending(context: &CliContext, command: PendingCommands) -> Result<()> {
    let registrar = context.registrar();
    let receiving = PurchaseReceiving::new(&registrar);

    match command {
        PendingCommands::List => {
            let items = receiving.pending_products()?;
            if context.json {
                print_json(&items)?;
            } else {
                for item in &items {
                    println!(
                        "- {} • {} x{} • ticket {}",
                        item.id, item.detected_name, item.quantity, item.ticket_id
                    );
                }
            }
        }
        PendingCommands::Approve(args) => {
            let resolved = receiving.resolve(
                args.id,
                Resolution::Approve {
                    product_id: args.product,
                    approved_by: args.by,
                },
            )?;
            context.save()?;
            println!("Approved {} as product {}", resolved.id, args.product);
        }
        PendingCommands::Reject(args) => {
            let resolved = receiving.resolve(args.id, Resolution::Reject)?;
            context.save()?;
            println!("Rejected {}", resolved.id);
        }
    }
    Ok(())
}

fn handle_stock(context: &CliContext, args: StockArgs) -> Result<()> {
    let queries = context.queries();
    let records = match (args.product, args.location) {
        (Some(product), _) => queries.stock_by_product(product)?,
        (None, Some(location)) => queries.stock_by_location(location)?,
        (None, None) => context.store.snapshot()?.stock.into_iter().map(|v| v.value).collect(),
    };

    if context.json {
        print_json(&records)?;
    } else {
        records.iter().for_each(render_stock);
    }
    Ok(())
}

fn handle_history(context: &CliContext, args: HistoryArgs) -> Result<()> {
    let movements = context.queries().movements(args.product, args.limit)?;

    if context.json {
        print_json(&movements)?;
    } else {
        for m in &movements {
            println!(
                "- {} • {} {} • {} • {}",
                m.created_at.format("%Y-%m-%d %H:%M"),
                m.movement_type(),
                m.quantity,
                m.product_id,
                m.reason
            );
        }
    }
    Ok(())
}

fn handle_alerts(context: &CliContext) -> Result<()> {
    let alerts = context.queries().active_alerts()?;

    if context.json {
        print_json(&alerts)?;
    } else {
        for a in &alerts {
            println!(
                "- {:?} • product {} @ {} • {} / min {}",
                a.alert_type, a.product_id, a.location_id, a.current_qty, a.threshold
            );
        }
    }
    Ok(())
}

fn handle_verify(context: &CliContext) -> Result<()> {
    let report = context.queries().reconcile()?;

    if context.json {
        print_json(&report)?;
    } else {
        println!(
            "Checked {} movements against {} stock records",
            report.movements_checked, report.records_checked
        );
        for d in &report.discrepancies {
            println!(
                "- drift at {}: recorded {}, journal {}",
                d.key,
                d.recorded.map_or_else(|| "none".to_string(), |q| q.to_string()),
                d.replayed
            );
        }
        for n in &report.negative_balances {
            println!("- negative balance {} at {} after movement {}", n.balance, n.key, n.movement_id);
        }
        for a in &report.alert_mismatches {
            println!(
                "- alert at {}: {} (alert {}, stock {}, threshold {})",
                a.key,
                a.issue,
                a.alert_qty.map_or_else(|| "none".to_string(), |q| q.to_string()),
                a.stock_qty,
                a.threshold
            );
        }
    }

    if !report.is_consistent() {
        bail!("ledger verification failed");
    }
    Ok(())
}

fn render_stock(record: &StockRecord) {
    println!(
        "- {} @ {} • {}",
        record.product_id, record.location_id, record.quantity
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
