//! Domain agents
//!
//! One agent per business area. An agent aggregates its area's data into typed
//! metrics (`gather`) and turns those metrics into insight drafts (`analyze`).
//! `perceive` wraps `gather` so a failing data source degrades to empty metrics
//! instead of aborting the decision cycle.

use tracing::warn;

use crate::config::Thresholds;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Area, AreaMetrics, InsightDraft};

mod inventory;
mod money;
mod people;
mod sales;

pub use inventory::InventoryAgent;
pub use money::MoneyAgent;
pub use people::PeopleAgent;
pub use sales::SalesAgent;

/// What one agent saw
#[derive(Debug, Clone, PartialEq)]
pub struct Perception {
    pub metrics: AreaMetrics,
    /// The data source failed and `metrics` is empty
    pub failed: bool,
}

/// Capability contract for a business-area agent
pub trait Agent: Send + Sync {
    fn area(&self) -> Area;

    /// Read-only aggregation for the context's organization
    fn gather(&self, db: &Database, ctx: &OrgContext) -> Result<AreaMetrics>;

    /// Pure function of the metrics returning zero or more drafts
    fn analyze(&self, metrics: &AreaMetrics, ctx: &OrgContext) -> Vec<InsightDraft>;

    /// Gather, absorbing failures into empty-but-typed metrics
    fn perceive(&self, db: &Database, ctx: &OrgContext) -> Perception {
        match self.gather(db, ctx) {
            Ok(metrics) => Perception {
                metrics,
                failed: false,
            },
            Err(e) => {
                warn!(
                    organization_id = ctx.organization_id,
                    area = %self.area(),
                    error = %e,
                    "Agent perception failed, continuing with empty metrics"
                );
                Perception {
                    metrics: AreaMetrics::empty(self.area()),
                    failed: true,
                }
            }
        }
    }
}

/// The built-in agents in perception order
pub fn default_agents(thresholds: &Thresholds) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(MoneyAgent::new(thresholds.clone())),
        Box::new(SalesAgent::new(thresholds.clone())),
        Box::new(PeopleAgent::new(thresholds.clone())),
        Box::new(InventoryAgent::new()),
    ]
}

/// Look up the built-in agent for an area
pub fn agent_for(area: Area, thresholds: &Thresholds) -> Box<dyn Agent> {
    match area {
        Area::Money => Box::new(MoneyAgent::new(thresholds.clone())),
        Area::Sales => Box::new(SalesAgent::new(thresholds.clone())),
        Area::People => Box::new(PeopleAgent::new(thresholds.clone())),
        Area::Inventory => Box::new(InventoryAgent::new()),
    }
}
