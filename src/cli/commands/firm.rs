use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::audit::{self, diff_records, snapshot, AuditActor, AuditAction, AuditEntry};
use crate::cli::output::{output_empty_collection, output_success, truncate};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::models::{Firm, FirmStatus};
use crate::database::{Database, Repository};
use crate::filter::ListQuery;
use crate::services::firm_service::{self, NewFirm};

#[derive(Subcommand)]
pub enum FirmCommands {
    #[command(about = "Create a firm and its first admin")]
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Defaults to a slug derived from the name")]
        slug: Option<String>,
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        admin_name: String,
        #[arg(long, env = "DOCKET_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },

    #[command(about = "List firms")]
    List {
        #[arg(long, help = "Include soft-deleted firms")]
        all: bool,
    },

    #[command(about = "Suspend a firm; its users can no longer sign in")]
    Suspend { id: Uuid },

    #[command(about = "Reactivate a suspended firm")]
    Activate { id: Uuid },
}

pub async fn handle(cmd: FirmCommands, db: &Database, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        FirmCommands::Create {
            name,
            slug,
            plan,
            admin_email,
            admin_name,
            admin_password,
        } => {
            let input = NewFirm {
                name,
                slug,
                plan,
                admin_email,
                admin_name,
                admin_password,
            };
            create_firm(db, input, output_format).await
        }
        FirmCommands::List { all } => list_firms(db, all, output_format).await,
        FirmCommands::Suspend { id } => set_status(db, id, FirmStatus::Suspended, AuditAction::Suspend, output_format).await,
        FirmCommands::Activate { id } => set_status(db, id, FirmStatus::Active, AuditAction::Activate, output_format).await,
    }
}

async fn create_firm(db: &Database, input: NewFirm, output_format: OutputFormat) -> anyhow::Result<()> {
    let mut tx = db.pool().begin().await?;
    let (firm, admin) =
        firm_service::create_firm_with_admin(&mut tx, input, config().security.bcrypt_cost, super::limit_policy()).await?;

    let actor = AuditActor::default().in_firm(Some(firm.id));
    audit::record(&mut tx, &actor, AuditEntry::new(AuditAction::Create, "firm", firm.id).changes(snapshot(&firm))).await?;
    audit::record(&mut tx, &actor, AuditEntry::new(AuditAction::Create, "user", admin.id).changes(snapshot(&admin))).await?;
    tx.commit().await?;

    output_success(
        output_format,
        &format!("Firm '{}' created ({}) with admin {}", firm.slug, firm.id, admin.email),
        Some(json!({ "firm": firm, "admin": admin })),
    )
}

async fn list_firms(db: &Database, all: bool, output_format: OutputFormat) -> anyhow::Result<()> {
    let mut params = std::collections::HashMap::new();
    params.insert("limit".to_string(), super::limit_policy().max_limit.to_string());
    if all {
        params.insert("include_deleted".to_string(), "true".to_string());
    }
    let list = ListQuery::from_params(params)?;

    let mut conn = db.acquire().await?;
    let page = Repository::<Firm>::new(None, super::limit_policy())
        .with_deleted(list.deleted)
        .page(&mut conn, &list, json!({}))
        .await?;

    if page.items.is_empty() {
        return output_empty_collection(output_format, "firms", "No firms found");
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        OutputFormat::Text => {
            println!("{:<36}  {:<24}  {:<10}  {:<10}  {}", "ID", "SLUG", "STATUS", "PLAN", "NAME");
            for firm in &page.items {
                let status = if firm.deleted_at.is_some() { "deleted" } else { firm.status.as_str() };
                println!(
                    "{:<36}  {:<24}  {:<10}  {:<10}  {}",
                    firm.id,
                    truncate(&firm.slug, 24),
                    status,
                    truncate(&firm.plan, 10),
                    truncate(&firm.name, 40)
                );
            }
            if page.total > page.items.len() as i64 {
                println!("... {} of {} shown", page.items.len(), page.total);
            }
        }
    }
    Ok(())
}

async fn set_status(
    db: &Database,
    id: Uuid,
    status: FirmStatus,
    action: AuditAction,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let mut tx = db.pool().begin().await?;
    let (before, after) = firm_service::set_status(&mut tx, id, status, super::limit_policy()).await?;
    audit::record(
        &mut tx,
        &AuditActor::default().in_firm(Some(id)),
        AuditEntry::new(action, "firm", id).changes(diff_records(&before, &after)),
    )
    .await?;
    tx.commit().await?;

    output_success(
        output_format,
        &format!("Firm '{}' is now {}", after.slug, after.status),
        Some(json!({ "firm": after })),
    )
}
