//! Operation context
//!
//! Every engine operation receives an [`OrgContext`] carrying the tenant, the acting
//! user, the permissions the caller was granted upstream, and the clock to read
//! "now" from. Nothing in the engine reads ambient time or request globals, which
//! keeps tenant isolation and time-dependent rules testable.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Noon UTC on the given day
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        let at = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Capabilities an action handler may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Record movements and categorize transactions
    ManageMoney,
    /// Create invoices, record payments, chase customers
    ManageSales,
    /// Generate reports
    ViewReports,
    /// Create organizations
    ManageOrganization,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageMoney => "manage_money",
            Self::ManageSales => "manage_sales",
            Self::ViewReports => "view_reports",
            Self::ManageOrganization => "manage_organization",
        }
    }

    pub fn all() -> &'static [Permission] {
        &[
            Self::ManageMoney,
            Self::ManageSales,
            Self::ViewReports,
            Self::ManageOrganization,
        ]
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manage_money" => Ok(Self::ManageMoney),
            "manage_sales" => Ok(Self::ManageSales),
            "view_reports" => Ok(Self::ViewReports),
            "manage_organization" => Ok(Self::ManageOrganization),
            _ => Err(format!("Unknown permission: {}", s)),
        }
    }
}

/// Tenant, actor, grants and clock for one engine operation
#[derive(Clone)]
pub struct OrgContext {
    pub organization_id: i64,
    pub user_id: i64,
    pub permissions: HashSet<Permission>,
    clock: Arc<dyn Clock>,
}

impl OrgContext {
    /// Context with no permissions on the system clock
    pub fn new(organization_id: i64, user_id: i64) -> Self {
        Self {
            organization_id,
            user_id,
            permissions: HashSet::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Context holding every permission (scheduler, CLI, tests)
    pub fn system(organization_id: i64, user_id: i64) -> Self {
        Self::new(organization_id, user_id).with_permissions(Permission::all().iter().copied())
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl fmt::Debug for OrgContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgContext")
            .field("organization_id", &self.organization_id)
            .field("user_id", &self.user_id)
            .field("permissions", &self.permissions)
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let ctx = OrgContext::new(1, 1).with_clock(FixedClock::on(2025, 3, 14));
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn test_permissions() {
        let ctx = OrgContext::new(1, 1).with_permissions([Permission::ViewReports]);
        assert!(ctx.can(Permission::ViewReports));
        assert!(!ctx.can(Permission::ManageMoney));

        let system = OrgContext::system(1, 1);
        assert!(Permission::all().iter().all(|p| system.can(*p)));
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(
            "Manage_Sales".parse::<Permission>().unwrap(),
            Permission::ManageSales
        );
        assert!("root".parse::<Permission>().is_err());
    }
}
