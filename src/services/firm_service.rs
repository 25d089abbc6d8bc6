use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::{hash_password, Role};
use crate::database::models::{Firm, FirmStatus, User};
use crate::database::{Changeset, DatabaseError, Repository};
use crate::error::ApiError;
use crate::filter::LimitPolicy;
use crate::services::validation;

/// A new firm together with its first admin
#[derive(Debug, Clone)]
pub struct NewFirm {
    pub name: String,
    pub slug: Option<String>,
    pub plan: Option<String>,
    pub admin_email: String,
    pub admin_name: String,
    pub admin_password: String,
}

/// Lower-case, with runs of non-alphanumerics collapsed to `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

pub fn validate_slug(slug: &str) -> Result<String, ApiError> {
    let slug = slug.trim();
    let valid = !slug.is_empty()
        && slug.len() <= 63
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if !valid {
        return Err(ApiError::invalid_field(
            "slug",
            "must be 1-63 lower-case letters, digits or dashes",
        ));
    }
    Ok(slug.to_string())
}

/// Create the firm and its admin on one connection; callers supply the transaction
pub async fn create_firm_with_admin(
    conn: &mut PgConnection,
    input: NewFirm,
    bcrypt_cost: u32,
    policy: LimitPolicy,
) -> Result<(Firm, User), ApiError> {
    let name = validation::required_text("name", &input.name, 200)?;
    let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => validate_slug(slug)?,
        None => validate_slug(&slugify(&name))?,
    };
    let plan = validation::optional_text("plan", input.plan.as_deref(), 50)?.unwrap_or_else(|| "standard".to_string());
    let admin_email = validation::email("admin.email", &input.admin_email)?;
    let admin_name = validation::required_text("admin.name", &input.admin_name, 200)?;
    validation::password("admin.password", &input.admin_password)?;
    let password_hash = hash_password(&input.admin_password, bcrypt_cost)?;

    let firm: Firm = Repository::<Firm>::new(None, policy)
        .insert(
            conn,
            Changeset::new()
                .set("name", name)
                .set("slug", slug)
                .set("plan", plan)
                .set("status", FirmStatus::Active),
        )
        .await?;

    let admin: User = Repository::<User>::new(Some(firm.id), policy)
        .insert(
            conn,
            Changeset::new()
                .set("email", admin_email)
                .set("name", admin_name)
                .set("password_hash", password_hash)
                .set("role", Role::Admin.as_str()),
        )
        .await?;

    tracing::info!(firm_id = %firm.id, slug = %firm.slug, admin_id = %admin.id, "Created firm");
    Ok((firm, admin))
}

/// Move a firm between `active` and `suspended`; returns the row before and after
pub async fn set_status(
    conn: &mut PgConnection,
    firm_id: Uuid,
    status: FirmStatus,
    policy: LimitPolicy,
) -> Result<(Firm, Firm), DatabaseError> {
    let repo = Repository::<Firm>::new(None, policy);
    let before = repo.select_404(conn, firm_id).await?;
    let after = repo.update(conn, firm_id, Changeset::new().set("status", status)).await?;
    if before.status != after.status {
        tracing::warn!(firm_id = %firm_id, "Firm status changed {} -> {}", before.status, after.status);
    }
    Ok((before, after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Smith & Jones, LLP"), "smith-jones-llp");
        assert_eq!(slugify("  --Acme--  "), "acme");
        assert_eq!(slugify("Müller Law"), "m-ller-law");
    }

    #[test]
    fn slug_validation() {
        assert_eq!(validate_slug("acme-law").unwrap(), "acme-law");
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("").is_err());
    }
}
