use clap::Subcommand;
use serde_json::json;

use crate::audit::{self, snapshot, AuditActor, AuditAction, AuditEntry};
use crate::auth::{hash_password, Role};
use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::models::{user::normalize_email, User};
use crate::database::{Changeset, Database, Repository};
use crate::services::validation;

#[derive(Subcommand)]
pub enum SuperadminCommands {
    #[command(about = "Create a platform SuperAdmin (no firm)")]
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "DOCKET_SUPERADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

pub async fn handle(cmd: SuperadminCommands, db: &Database, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SuperadminCommands::Create { email, name, password } => {
            create_superadmin(db, &email, &name, &password, output_format).await
        }
    }
}

async fn create_superadmin(
    db: &Database,
    email: &str,
    name: &str,
    password: &str,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let email = validation::email("email", &normalize_email(email))?;
    let name = validation::required_text("name", name, 200)?;
    validation::password("password", password)?;
    let password_hash = hash_password(password, config().security.bcrypt_cost)?;

    let mut tx = db.pool().begin().await?;
    let user: User = Repository::<User>::new(None, super::limit_policy())
        .insert(
            &mut tx,
            Changeset::new()
                .set("email", email)
                .set("name", name)
                .set("password_hash", password_hash)
                .set("role", Role::Admin.as_str())
                .set("super_admin", true),
        )
        .await?;
    audit::record(
        &mut tx,
        &AuditActor::default(),
        AuditEntry::new(AuditAction::Create, "user", user.id).changes(snapshot(&user)),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Created SuperAdmin");
    output_success(
        output_format,
        &format!("SuperAdmin '{}' created ({})", user.email, user.id),
        Some(json!({ "user": user })),
    )
}
