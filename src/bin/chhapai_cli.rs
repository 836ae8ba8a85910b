use std::sync::Arc;

use anyhow::{Context, Result};
use chhapai_orders::{
    config::{self, AppConfig},
    db::{self, DbPool},
    documents::{GeneratedDocument, TextDocumentGenerator},
    entities::{custom_stage, order, order_stage},
    events::EventSender,
    models::{OrderPriority, OrderStatus, StageStatus},
    services::{
        order_lifecycle::{
            CreateOrderRequest, OrderFilter, OrderWithStages, ScheduleOrderRequest,
            UpdateStageRequest,
        },
        stage_catalog::{CreateStageRequest, MoveDirection},
        OrderLifecycleService, StageCatalogService,
    },
};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Orders(command) => handle_orders_command(&context, command, cli.json).await?,
        Commands::Stages(command) => handle_stages_command(&context, command, cli.json).await?,
        Commands::Catalog(command) => handle_catalog_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "chhapai", about = "Chhapai order lifecycle CLI", version)]
struct Cli {
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
    /// Apply pending database migrations
    Migrate,
    #[command(subcommand)]
    Orders(OrdersCommands),
    #[command(subcommand)]
    Stages(StagesCommands),
    #[command(subcommand)]
    Catalog(CatalogCommands),
}

#[derive(Subcommand)]
enum OrdersCommands {
    Create(CreateOrderArgs),
    List(ListOrdersArgs),
    Show(OrderIdArgs),
    Schedule(ScheduleOrderArgs),
    Complete(OrderIdArgs),
    Progress(OrderIdArgs),
    Challan(OrderIdArgs),
}

#[derive(Subcommand)]
enum StagesCommands {
    Toggle(ToggleStageArgs),
    Update(UpdateStageArgs),
}

#[derive(Subcommand)]
enum CatalogCommands {
    List(ListCatalogArgs),
    Add(AddCatalogStageArgs),
    Toggle(CatalogStageIdArgs),
    Move(MoveCatalogStageArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Normal,
    Express,
}

impl From<PriorityArg> for OrderPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Normal => OrderPriority::Normal,
            PriorityArg::Express => OrderPriority::Express,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for MoveDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Up => MoveDirection::Up,
            DirectionArg::Down => MoveDirection::Down,
        }
    }
}

#[derive(Args)]
struct CreateOrderArgs {
    #[arg(long, help = "Order number; generated when omitted")]
    order_no: Option<String>,
    #[arg(long)]
    customer: String,
    #[arg(long, help = "Phone or email of the customer")]
    contact: Option<String>,
    #[arg(long)]
    product: String,
    #[arg(long)]
    sku: Option<String>,
    #[arg(long)]
    sub_type: Option<String>,
    #[arg(long, default_value_t = 1)]
    quantity: i32,
    #[arg(long)]
    price_per_unit: Option<Decimal>,
    #[arg(long)]
    shipping_address: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, value_enum, default_value = "normal")]
    priority: PriorityArg,
    #[arg(long)]
    created_by: Option<String>,
}

#[derive(Args)]
struct ListOrdersArgs {
    #[arg(long, help = "pending, in_progress, completed or cancelled")]
    status: Option<OrderStatus>,
    #[arg(long, help = "Match order number or customer name")]
    search: Option<String>,
}

#[derive(Args)]
struct OrderIdArgs {
    #[arg(help = "Order id")]
    id: Uuid,
}

#[derive(Args)]
struct ScheduleOrderArgs {
    #[arg(help = "Order id")]
    id: Uuid,
    #[arg(long, help = "Delivery date (YYYY-MM-DD)")]
    delivery_date: Option<NaiveDate>,
    #[arg(
        long = "stage",
        help = "Stage to run; repeat for several. Defaults to the active catalog"
    )]
    stages: Vec<String>,
}

#[derive(Args)]
struct ToggleStageArgs {
    #[arg(help = "Stage id")]
    id: Uuid,
    #[arg(long, help = "Status currently shown for the stage")]
    current: StageStatus,
}

#[derive(Args)]
struct UpdateStageArgs {
    #[arg(help = "Stage id")]
    id: Uuid,
    #[arg(long)]
    status: Option<StageStatus>,
    #[arg(long)]
    assigned_to: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    quality_remarks: Option<String>,
    #[arg(long)]
    wastage: Option<Decimal>,
    #[arg(long)]
    time_taken_hours: Option<Decimal>,
    #[arg(long)]
    estimated_hours: Option<Decimal>,
}

#[derive(Args)]
struct ListCatalogArgs {
    #[arg(long, action = ArgAction::SetTrue, help = "Include inactive stages")]
    all: bool,
}

#[derive(Args)]
struct AddCatalogStageArgs {
    #[arg(help = "Stage name")]
    name: String,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    estimated_hours: Option<Decimal>,
}

#[derive(Args)]
struct CatalogStageIdArgs {
    #[arg(help = "Catalog stage id")]
    id: Uuid,
}

#[derive(Args)]
struct MoveCatalogStageArgs {
    #[arg(help = "Catalog stage id")]
    id: Uuid,
    #[arg(value_enum)]
    direction: DirectionArg,
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
) -> Result<()> {
    let service = context.lifecycle_service();

    match command {
        OrdersCommands::Create(args) => {
            let request = CreateOrderRequest {
                order_no: args.order_no,
                customer_name: args.customer,
                customer_contact: args.contact,
                product_name: args.product,
                sku: args.sku,
                sub_type: args.sub_type,
                quantity: args.quantity,
                price_per_unit: args.price_per_unit,
                shipping_address: args.shipping_address,
                order_notes: args.notes,
                priority: args.priority.into(),
                created_by: args.created_by,
            };
            let order = service
                .create_order(request)
                .await
                .context("failed to create order")?;
            if json {
                print_json(&order)?;
            } else {
                println!("Created order {} ({})", order.order_no, order.id);
            }
        }
        OrdersCommands::List(args) => {
            let orders = service
                .list_orders(OrderFilter {
                    status: args.status,
                    search: args.search,
                })
                .await
                .context("failed to list orders")?;
            if json {
                print_json(&orders)?;
            } else if orders.is_empty() {
                println!("No orders found");
            } else {
                orders.iter().for_each(render_order);
            }
        }
        OrdersCommands::Show(args) => {
            let order = service
                .get_order(args.id)
                .await
                .context("failed to load order")?;
            if json {
                print_json(&order)?;
            } else {
                render_order_with_stages(&order);
            }
        }
        OrdersCommands::Schedule(args) => {
            let stage_names = if args.stages.is_empty() {
                context
                    .catalog_service()
                    .active_stage_names()
                    .await
                    .context("failed to load stage catalog")?
            } else {
                args.stages
            };
            let outcome = service
                .schedule_order(
                    args.id,
                    ScheduleOrderRequest {
                        delivery_date: args.delivery_date,
                        stage_names,
                    },
                )
                .await
                .context("failed to schedule order")?;
            if json {
                print_json(&outcome)?;
            } else {
                render_order_with_stages(&outcome.order);
                render_document("Job card", outcome.job_card.as_ref());
            }
        }
        OrdersCommands::Complete(args) => {
            let outcome = service
                .complete_order_by_id(args.id)
                .await
                .context("failed to complete order")?;
            if json {
                print_json(&outcome)?;
            } else {
                println!("Order {} completed", outcome.order.order_no);
                render_document("Delivery challan", outcome.delivery_challan.as_ref());
            }
        }
        OrdersCommands::Progress(args) => {
            let order = service
                .get_order(args.id)
                .await
                .context("failed to load order")?;
            let estimate = service
                .estimated_completion(args.id)
                .await
                .context("failed to estimate completion")?;
            if json {
                print_json(&serde_json::json!({
                    "progress": order.progress,
                    "estimate": estimate,
                }))?;
            } else {
                println!(
                    "{}: {}% ({} of {} stages), ETD {} ({} h remaining)",
                    order.order.order_no,
                    order.progress.percentage,
                    order.progress.completed,
                    order.progress.total,
                    estimate.estimated_completion.format("%d/%m/%Y %H:%M"),
                    estimate.remaining_hours
                );
            }
        }
        OrdersCommands::Challan(args) => {
            let document = service
                .regenerate_delivery_challan(args.id)
                .await
                .context("failed to generate delivery challan")?;
            if json {
                print_json(&document)?;
            } else {
                render_document("Delivery challan", Some(&document));
            }
        }
    }

    Ok(())
}

async fn handle_stages_command(
    context: &CliContext,
    command: StagesCommands,
    json: bool,
) -> Result<()> {
    let service = context.lifecycle_service();

    let stage = match command {
        StagesCommands::Toggle(args) => service
            .toggle_stage(args.id, args.current)
            .await
            .context("failed to toggle stage")?,
        StagesCommands::Update(args) => service
            .update_stage(
                args.id,
                UpdateStageRequest {
                    status: args.status,
                    assigned_to: args.assigned_to,
                    notes: args.notes,
                    quality_remarks: args.quality_remarks,
                    wastage_percentage: args.wastage,
                    time_taken_hours: args.time_taken_hours,
                    estimated_time_hours: args.estimated_hours,
                },
            )
            .await
            .context("failed to update stage")?,
    };

    if json {
        print_json(&stage)?;
    } else {
        render_stage(&stage);
    }
    Ok(())
}

async fn handle_catalog_command(
    context: &CliContext,
    command: CatalogCommands,
    json: bool,
) -> Result<()> {
    let service = context.catalog_service();

    let stages = match command {
        CatalogCommands::List(args) => service
            .list_stages(args.all)
            .await
            .context("failed to list stage catalog")?,
        CatalogCommands::Add(args) => vec![service
            .create_stage(CreateStageRequest {
                stage_name: args.name,
                department: args.department,
                estimated_hours: args.estimated_hours,
            })
            .await
            .context("failed to add catalog stage")?],
        CatalogCommands::Toggle(args) => vec![service
            .toggle_active(args.id)
            .await
            .context("failed to toggle catalog stage")?],
        CatalogCommands::Move(args) => service
            .move_stage(args.id, args.direction.into())
            .await
            .context("failed to move catalog stage")?,
    };

    if json {
        print_json(&stages)?;
    } else {
        stages.iter().for_each(render_catalog_stage);
    }
    Ok(())
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(&config.log_level, config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let (event_sender, mut event_rx) = EventSender::channel(32);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "chhapai_cli", event = ?event, "received lifecycle event");
            }
        });

        Ok(Self {
            config,
            db,
            event_sender: Arc::new(event_sender),
        })
    }

    fn lifecycle_service(&self) -> OrderLifecycleService {
        let documents = Arc::new(TextDocumentGenerator::new(
            self.config.documents_dir.clone(),
            self.config.company_name.clone(),
        ));
        OrderLifecycleService::new(
            self.db.clone(),
            documents,
            Some(self.event_sender.clone()),
            self.config.order_number_prefix.clone(),
        )
    }

    fn catalog_service(&self) -> StageCatalogService {
        StageCatalogService::new(self.db.clone(), Some(self.event_sender.clone()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &order::Model) {
    println!(
        "- {} • {} • {} x{} • {} • {}",
        order.order_no,
        order.customer_name,
        order.product_name,
        order.quantity,
        order.priority,
        order.status
    );
}

fn render_order_with_stages(order: &OrderWithStages) {
    render_order(&order.order);
    if let Some(date) = order.order.delivery_date {
        println!("  delivery {}", date.format("%d/%m/%Y"));
    }
    println!(
        "  progress {}% ({}/{})",
        order.progress.percentage, order.progress.completed, order.progress.total
    );
    order.stages.iter().for_each(render_stage);
}

fn render_stage(stage: &order_stage::Model) {
    let mark = if stage.status.is_completed() { "x" } else { " " };
    println!(
        "  [{}] {} ({}) {}",
        mark, stage.stage_name, stage.status, stage.id
    );
}

fn render_catalog_stage(stage: &custom_stage::Model) {
    println!(
        "{:>2}. {} • {} • {} h{} • {}",
        stage.display_order,
        stage.stage_name,
        stage.department.as_deref().unwrap_or("-"),
        stage.estimated_hours,
        if stage.is_active { "" } else { " (inactive)" },
        stage.id
    );
}

fn render_document(label: &str, document: Option<&GeneratedDocument>) {
    match document {
        Some(document) => match &document.path {
            Some(path) => println!("{} {} written to {}", label, document.document_id, path.display()),
            None => println!("{} {} generated", label, document.document_id),
        },
        None => println!("{} could not be generated; see logs", label),
    }
}
