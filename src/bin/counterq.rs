//! counterq CLI: operator interface to the ticket dispatcher.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use counterq::catalog::ServiceCatalog;
use counterq::config::Config;
use counterq::config::secrets::redacted_url;
use counterq::db::Db;
use counterq::dispatch::{Dispatcher, QueueScope, ReportFilter};
use counterq::model::*;
use counterq::notify::{PgNotifier, pg};
use counterq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;

type App = Dispatcher<Db, PgNotifier>;

#[derive(Parser)]
#[command(name = "counterq", about = "Ticket dispatch for service counters")]
struct Cli {
    #[command(flatten)]
    actor: ActorArgs,
    #[command(subcommand)]
    command: Command,
}

/// Who is acting. Authentication happens upstream.
#[derive(Args)]
struct ActorArgs {
    #[arg(long, global = true, default_value = "cli")]
    actor_id: String,
    #[arg(long, global = true, default_value = "Operator")]
    actor_name: String,
    /// admin, staff or frontdesk
    #[arg(long, global = true, default_value = "admin")]
    role: Role,
    /// Services a staff member may call (repeatable)
    #[arg(long, global = true)]
    assigned: Vec<ServiceId>,
    /// Fixed desk of the acting staff member
    #[arg(long, global = true)]
    desk: Option<String>,
}

impl ActorArgs {
    fn identity(&self) -> Identity {
        let identity = Identity::new(&self.actor_id, &self.actor_name, self.role)
            .assigned(self.assigned.iter().copied());
        match &self.desk {
            Some(desk) => identity.at_desk(desk),
            None => identity,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Service administration
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Ticket operations
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },
    /// Show the pending queue in dispatch order
    Queue {
        /// Limit to one service
        #[arg(long)]
        service: Option<ServiceId>,
    },
    /// Most recently called tickets
    Recent {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Everything issued today
    Today,
    /// Attention report
    Report {
        /// First day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        service: Option<ServiceId>,
        #[arg(long)]
        staff: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Look up a requester by document number
    Party { document_number: String },
    /// Site settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print ticket events as they happen
    Watch,
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Register a service
    Add { name: String, prefix: String },
    /// List services
    List,
    /// Change a service
    Set {
        id: ServiceId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Create services from a TOML catalog, skipping known prefixes
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum TicketAction {
    /// Issue a ticket
    Create {
        service: ServiceId,
        #[arg(long)]
        document_number: String,
        #[arg(long, default_value = "ID")]
        document_type: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Call a ticket to a desk
    Call {
        id: TicketId,
        #[arg(long)]
        at: Option<String>,
    },
    /// Call the head of the queue
    Next {
        #[arg(long)]
        at: Option<String>,
    },
    /// Start serving a called ticket
    Attend { id: TicketId },
    /// Finish a ticket
    Close { id: TicketId },
    /// Withdraw a waiting ticket
    Cancel { id: TicketId },
    /// Move a ticket to another service
    Redirect { id: TicketId, service: ServiceId },
    /// Show a ticket
    Show { id: TicketId },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        /// Replace the priority labels (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        print_on_create: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "counterq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    tracing::debug!(database = %redacted_url(&config.database_url), "connecting");
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    if let Command::Migrate = cli.command {
        println!("Migrations applied.");
        return Ok(());
    }

    let notifier = PgNotifier::new(&db);
    let app: App = Dispatcher::new(db, notifier, config.dispatch.clone());
    let actor = cli.actor.identity();

    match cli.command {
        Command::Migrate => Ok(()),
        Command::Service { action } => cmd_service(&app, &actor, action).await,
        Command::Ticket { action } => cmd_ticket(&app, &actor, action).await,
        Command::Queue { service } => {
            let scope = service.map_or(QueueScope::Assigned, QueueScope::Service);
            let queue = app.pending_queue(&actor, scope).await?;
            print_tickets(&queue.to_vec());
            Ok(())
        }
        Command::Recent { limit } => {
            print_tickets(&app.recently_called(limit).await?);
            Ok(())
        }
        Command::Today => {
            print_tickets(&app.todays_tickets(&actor).await?);
            Ok(())
        }
        Command::Report {
            from,
            to,
            service,
            staff,
            priority,
        } => {
            let filter = ReportFilter {
                from,
                to,
                service_id: service,
                staff_id: staff,
                priority,
            };
            let report = app.report(&actor, filter).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Party { document_number } => {
            let party = app.lookup_party(&document_number).await?;
            println!("{}", serde_json::to_string_pretty(&party)?);
            Ok(())
        }
        Command::Settings { action } => cmd_settings(&app, &actor, action).await,
        Command::Watch => cmd_watch(&app).await,
    }
}

async fn cmd_service(app: &App, actor: &Identity, action: ServiceAction) -> anyhow::Result<()> {
    match action {
        ServiceAction::Add { name, prefix } => {
            let service = app
                .create_service(actor, NewService::new(name, prefix))
                .await?;
            println!("Created: {} {} ({})", service.prefix, service.name, service.id);
        }
        ServiceAction::List => {
            let services = app.list_services().await?;
            if services.is_empty() {
                println!("No services registered.");
                return Ok(());
            }
            println!("{:<6}  {:<36}  {:<6}  NAME", "PREFIX", "ID", "ACTIVE");
            println!("{}", "-".repeat(72));
            for s in &services {
                println!("{:<6}  {:<36}  {:<6}  {}", s.prefix, s.id, s.active, s.name);
            }
        }
        ServiceAction::Set {
            id,
            name,
            prefix,
            active,
        } => {
            let update = ServiceUpdate {
                name,
                prefix,
                active,
            };
            let service = app.update_service(actor, id, update).await?;
            println!(
                "Updated: {} {} (active: {})",
                service.prefix, service.name, service.active
            );
        }
        ServiceAction::Import { file } => {
            let catalog = ServiceCatalog::load_from_file(&file)?;
            let summary = catalog.import(app, actor).await?;
            println!(
                "Imported {} service(s), skipped {} existing: {}",
                summary.created.len(),
                summary.skipped.len(),
                summary.skipped.join(", ")
            );
        }
    }
    Ok(())
}

async fn cmd_ticket(app: &App, actor: &Identity, action: TicketAction) -> anyhow::Result<()> {
    let ticket = match action {
        TicketAction::Create {
            service,
            document_number,
            document_type,
            name,
            phone,
            email,
            category,
            priority,
            notes,
        } => {
            let requester = Requester {
                document_type,
                document_number,
                full_name: name,
                phone,
                email,
                category,
            };
            let mut request = NewTicket::new(service, requester);
            if let Some(label) = priority {
                request = request.priority(label);
            }
            if let Some(notes) = notes {
                request = request.notes(notes);
            }
            let ticket = app.create(actor, request).await?;
            if app.settings().await?.print_on_create {
                print_receipt(&ticket);
            }
            ticket
        }
        TicketAction::Call { id, at } => app.call(actor, id, at).await?,
        TicketAction::Next { at } => match app.call_next(actor, at).await? {
            Some(ticket) => ticket,
            None => {
                println!("Queue is empty.");
                return Ok(());
            }
        },
        TicketAction::Attend { id } => app.attend(actor, id).await?,
        TicketAction::Close { id } => app.close(actor, id).await?,
        TicketAction::Cancel { id } => app.cancel(actor, id).await?,
        TicketAction::Redirect { id, service } => app.redirect(actor, id, service).await?,
        TicketAction::Show { id } => app.get_ticket(id).await?,
    };
    print_ticket(&ticket);
    Ok(())
}

async fn cmd_settings(app: &App, actor: &Identity, action: SettingsAction) -> anyhow::Result<()> {
    let settings = match action {
        SettingsAction::Show => app.settings().await?,
        SettingsAction::Set {
            labels,
            print_on_create,
        } => {
            let update = SettingsUpdate {
                priority_labels: (!labels.is_empty()).then_some(labels),
                print_on_create,
            };
            app.update_settings(actor, update).await?
        }
    };
    println!("Priority labels:  {}", settings.priority_labels.join(", "));
    println!("Print on create:  {}", settings.print_on_create);
    Ok(())
}

async fn cmd_watch(app: &App) -> anyhow::Result<()> {
    let mut listener = pg::listen(app.store()).await?;
    println!("Listening on {} (ctrl-c to stop)", pg::CHANNEL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            notification = listener.recv() => {
                let notification = notification?;
                match pg::decode(notification.payload()) {
                    Ok(event) => println!(
                        "{}  {:<10}  {:<8}  {:<8}  {}",
                        event.timestamp.format("%H:%M:%S"),
                        event.kind,
                        event.ticket.code,
                        event.ticket.state,
                        event.ticket.desk.as_deref().unwrap_or("-"),
                    ),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed event"),
                }
            }
        }
    }
}

fn print_tickets(tickets: &[Ticket]) {
    if tickets.is_empty() {
        println!("No tickets.");
        return;
    }
    println!(
        "{:<8}  {:<8}  {:<20}  {:<12}  {:<10}  CREATED",
        "CODE", "STATE", "SERVICE", "PRIORITY", "DESK"
    );
    println!("{}", "-".repeat(84));
    for t in tickets {
        println!(
            "{:<8}  {:<8}  {:<20}  {:<12}  {:<10}  {}",
            t.code,
            t.state,
            t.service_name,
            t.priority.as_deref().unwrap_or("-"),
            t.desk.as_deref().unwrap_or("-"),
            t.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} ticket(s)", tickets.len());
}

fn print_ticket(t: &Ticket) {
    println!("ID:         {}", t.id);
    println!("Code:       {}", t.code);
    println!("State:      {}", t.state);
    println!("Service:    {}", t.service_name);
    println!("Requester:  {} ({} {})", t.requester.full_name, t.requester.document_type, t.requester.document_number);
    println!("Priority:   {}", t.priority.as_deref().unwrap_or("-"));
    println!("Staff:      {}", t.staff_name.as_deref().unwrap_or("-"));
    println!("Desk:       {}", t.desk.as_deref().unwrap_or("-"));
    println!("Created:    {}", t.created_at);
    if let Some(at) = t.called_at {
        println!("Called:     {at}");
    }
    if let Some(at) = t.attended_at {
        println!("Attended:   {at}");
    }
    if let Some(at) = t.closed_at {
        println!("Closed:     {at}");
    }
    if let Some(s) = t.wait_seconds {
        println!("Waited:     {s}s");
    }
    if let Some(s) = t.service_seconds {
        println!("Served:     {s}s");
    }
}

fn print_receipt(t: &Ticket) {
    println!("================================");
    println!("  {}", t.service_name);
    println!();
    println!("        {}", t.code);
    println!();
    println!("  {}", t.created_at.format("%Y-%m-%d %H:%M"));
    println!("================================");
}
