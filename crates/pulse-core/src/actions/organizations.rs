//! Organization onboarding

use serde_json::json;
use tracing::info;

use super::{mismatch, ActionHandler, ActionParams, CreateOrganizationParams, Preview};
use crate::context::{OrgContext, Permission};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::ActionType;

const DEFAULT_CURRENCY: &str = "USD";

pub struct CreateOrganizationHandler;

impl CreateOrganizationHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a CreateOrganizationParams> {
        match params {
            ActionParams::CreateOrganization(p) => Ok(p),
            other => Err(mismatch(ActionType::CreateOrganization, other)),
        }
    }

    fn currency(p: &CreateOrganizationParams) -> String {
        p.currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase()
    }
}

impl ActionHandler for CreateOrganizationHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateOrganization
    }

    fn category(&self) -> &'static str {
        "organization"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageOrganization
    }

    fn validate(&self, db: &Database, _ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        let name = p.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("An organization needs a name".to_string()));
        }
        let currency = Self::currency(p);
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Validation(format!(
                "Currency must be a three-letter code, got {}",
                currency
            )));
        }
        if db.find_organization_by_name(name)?.is_some() {
            return Err(Error::Validation(format!(
                "An organization named {} already exists",
                name
            )));
        }
        Ok(())
    }

    fn preview(&self, _db: &Database, _ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        Ok(Preview::new(format!("Create organization {}", p.name.trim()))
            .item("Currency", Self::currency(p))
            .item("Tone", p.tone.unwrap_or_default()))
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let p = self.params(params)?;
        let name = p.name.trim();
        let currency = Self::currency(p);
        let tone = p.tone.unwrap_or_default();

        let id = db.create_organization(name, &currency, tone, ctx.now())?;
        db.log_audit(
            id,
            Some(ctx.user_id),
            "organization.created",
            "organization",
            Some(id),
            Some(&format!("Created from organization {}", ctx.organization_id)),
        )?;

        info!(organization_id = id, name = %name, "Organization created");

        Ok(json!({
            "organization_id": id,
            "name": name,
            "currency": currency,
            "tone": tone,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::personalization::Tone;

    fn ctx() -> OrgContext {
        OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14))
    }

    fn params(name: &str, currency: Option<&str>) -> ActionParams {
        ActionParams::CreateOrganization(CreateOrganizationParams {
            name: name.to_string(),
            currency: currency.map(String::from),
            tone: None,
        })
    }

    #[test]
    fn test_create_organization() {
        let db = Database::in_memory().unwrap();
        let p = params("Mama Mboga Grocers", Some("kes"));
        CreateOrganizationHandler.validate(&db, &ctx(), &p).unwrap();

        let preview = CreateOrganizationHandler.preview(&db, &ctx(), &p).unwrap();
        assert_eq!(preview.items[0].value, "KES");

        let result = CreateOrganizationHandler.execute(&db, &ctx(), &p).unwrap();
        let id = result["organization_id"].as_i64().unwrap();
        let org = db.get_organization(id).unwrap().unwrap();
        assert_eq!(org.currency, "KES");
        assert_eq!(org.tone, Tone::Friendly);

        // Names are unique, case-insensitively
        let again = params("mama mboga grocers", None);
        assert!(matches!(
            CreateOrganizationHandler.validate(&db, &ctx(), &again),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_bad_input() {
        let db = Database::in_memory().unwrap();
        for p in [params("  ", None), params("Shop", Some("shillings"))] {
            assert!(matches!(
                CreateOrganizationHandler.validate(&db, &ctx(), &p),
                Err(Error::Validation(_))
            ));
        }
    }
}
