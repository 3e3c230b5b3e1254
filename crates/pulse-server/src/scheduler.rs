//! Background decision-cycle scheduler
//!
//! Optional periodic cycles, enabled via environment variables:
//!
//! - `PULSE_CYCLE_INTERVAL_MINUTES`: Interval in minutes (e.g., "60" for hourly)
//! - `PULSE_CYCLE_PREDICT`: Also regenerate forecasts each tick (default: true)
//!
//! Each tick cycles every organization, regenerates its forecasts and sweeps
//! closed insights past the retention window. One failing organization does
//! not stop the others.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use pulse_core::{Database, DecisionCore, EngineConfig, OrgContext, PredictiveEngine};

/// Configuration for scheduled cycles
#[derive(Debug, Clone)]
pub struct CycleScheduleConfig {
    /// Interval between cycles in minutes
    pub interval_minutes: u64,
    /// Regenerate forecasts after each cycle
    pub predict: bool,
}

impl CycleScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (PULSE_CYCLE_INTERVAL_MINUTES not set)
    pub fn from_env() -> Option<Self> {
        let interval_minutes: u64 = std::env::var("PULSE_CYCLE_INTERVAL_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())?;

        if interval_minutes == 0 {
            warn!("PULSE_CYCLE_INTERVAL_MINUTES is 0, scheduled cycles disabled");
            return None;
        }

        let predict = std::env::var("PULSE_CYCLE_PREDICT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Some(Self {
            interval_minutes,
            predict,
        })
    }
}

/// Outcome of one scheduler tick
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickSummary {
    pub cycled: usize,
    pub failed: usize,
    pub predictions: usize,
    pub purged: usize,
}

/// Start the cycle scheduler as a background task
pub fn start_cycle_scheduler(db: Database, engine: EngineConfig, config: CycleScheduleConfig) {
    info!(
        "Starting cycle scheduler: every {} minutes (forecasts: {})",
        config.interval_minutes, config.predict
    );

    tokio::spawn(async move {
        let core = DecisionCore::new(db.clone(), engine.clone());
        let predictor = PredictiveEngine::new(db.clone(), engine.forecast);
        let mut ticker = interval(Duration::from_secs(config.interval_minutes * 60));

        // Skip the first immediate tick - cycles run on demand at startup
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match run_scheduled_tick(&db, &core, &predictor, config.predict) {
                Ok(summary) => info!(
                    cycled = summary.cycled,
                    failed = summary.failed,
                    predictions = summary.predictions,
                    purged = summary.purged,
                    "Scheduled cycle completed"
                ),
                Err(e) => error!("Scheduled cycle failed: {}", e),
            }
        }
    });
}

/// Cycle, forecast and sweep every organization once
pub fn run_scheduled_tick(
    db: &Database,
    core: &DecisionCore,
    predictor: &PredictiveEngine,
    predict: bool,
) -> pulse_core::Result<TickSummary> {
    let mut summary = TickSummary::default();

    for org in db.list_organization_ids()? {
        let ctx = OrgContext::system(org, 0);

        if let Err(e) = core.run_cycle(&ctx) {
            summary.failed += 1;
            warn!(organization_id = org, error = %e, "Scheduled cycle failed for organization");
            continue;
        }
        summary.cycled += 1;

        if predict {
            match predictor.generate(&ctx) {
                Ok(saved) => summary.predictions += saved.len(),
                Err(e) => warn!(organization_id = org, error = %e, "Scheduled forecast failed"),
            }
        }

        match core.retention_sweep(&ctx) {
            Ok(purged) => summary.purged += purged,
            Err(e) => warn!(organization_id = org, error = %e, "Retention sweep failed"),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::Tone;

    #[test]
    fn test_config_from_env_not_set() {
        // When PULSE_CYCLE_INTERVAL_MINUTES is not set, should return None
        std::env::remove_var("PULSE_CYCLE_INTERVAL_MINUTES");
        assert!(CycleScheduleConfig::from_env().is_none());
    }

    #[test]
    fn test_config_from_env_zero() {
        // When PULSE_CYCLE_INTERVAL_MINUTES is 0, should return None
        std::env::set_var("PULSE_CYCLE_INTERVAL_MINUTES", "0");
        assert!(CycleScheduleConfig::from_env().is_none());
        std::env::remove_var("PULSE_CYCLE_INTERVAL_MINUTES");
    }

    #[test]
    fn test_tick_cycles_every_organization() {
        let db = Database::in_memory().unwrap();
        let now = chrono::Utc::now();
        let a = db.create_organization("A", "USD", Tone::Friendly, now).unwrap();
        let b = db.create_organization("B", "EUR", Tone::Concise, now).unwrap();
        db.create_stock_item(b, "Flour", None, 0.0, 5.0, 1.0).unwrap();

        let engine = EngineConfig::default();
        let core = DecisionCore::new(db.clone(), engine.clone());
        let predictor = PredictiveEngine::new(db.clone(), engine.forecast);

        let summary = run_scheduled_tick(&db, &core, &predictor, true).unwrap();
        assert_eq!(summary.cycled, 2);
        assert_eq!(summary.failed, 0);
        // Cash forecasts exist even for an empty organization
        assert!(summary.predictions > 0);

        for org in [a, b] {
            let state = db.get_or_create_state(org, now).unwrap();
            assert!(state.last_cycle_at.is_some());
        }
        assert!(db.count_active_insights(b).unwrap() > 0);
    }

    #[test]
    fn test_tick_and_on_demand_cycle_exclude_each_other() {
        let db = Database::in_memory().unwrap();
        let org = db
            .create_organization("A", "USD", Tone::Friendly, chrono::Utc::now())
            .unwrap();
        let flour = db.create_stock_item(org, "Flour", None, 0.0, 5.0, 1.0).unwrap();

        let engine = EngineConfig::default();
        let scheduled = DecisionCore::new(db.clone(), engine.clone());
        let predictor = PredictiveEngine::new(db.clone(), engine.forecast.clone());
        // Stands in for the request-serving core
        let on_demand = DecisionCore::new(db.clone(), engine);
        let ctx = OrgContext::system(org, 0);

        for round in 0..20 {
            let quantity = if round % 2 == 0 { 0.0 } else { 50.0 };
            db.set_stock_quantity(org, flour, quantity).unwrap();

            let barrier = std::sync::Barrier::new(2);
            let (tick, cycle) = std::thread::scope(|s| {
                let tick = s.spawn(|| {
                    barrier.wait();
                    run_scheduled_tick(&db, &scheduled, &predictor, false)
                });
                let cycle = s.spawn(|| {
                    barrier.wait();
                    on_demand.run_cycle(&ctx)
                });
                (tick.join().unwrap(), cycle.join().unwrap())
            });

            let tick = tick.unwrap();
            assert_eq!(tick.cycled, 1, "round {}", round);
            assert_eq!(tick.failed, 0, "round {}", round);
            assert!(cycle.is_ok(), "round {}: {:?}", round, cycle.err());
        }
    }
}
