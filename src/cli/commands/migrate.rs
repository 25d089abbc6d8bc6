use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::database::Database;

pub async fn handle(db: &Database, output_format: OutputFormat) -> anyhow::Result<()> {
    tracing::info!("Applying migrations");
    db.migrate().await?;
    output_success(output_format, "Migrations applied", Some(json!({ "migrated": true })))
}
