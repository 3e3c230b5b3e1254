//! Prediction records

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{fmt_datetime, parse_date, parse_datetime, parse_text, Database};
use crate::error::{Error, Result};
use crate::models::{NewPrediction, Prediction, PredictionType};

const PREDICTION_COLUMNS: &str = "id, organization_id, prediction_type, category, prediction_date, \
     target_date, predicted_value, confidence, factors, metadata, actual_value, accuracy";

fn row_to_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    let prediction_type: String = row.get(2)?;
    let prediction_date: String = row.get(4)?;
    let target_date: String = row.get(5)?;
    let factors: String = row.get(8)?;
    let metadata: String = row.get(9)?;
    Ok(Prediction {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        prediction_type: parse_text(2, &prediction_type)?,
        category: row.get(3)?,
        prediction_date: parse_datetime(&prediction_date),
        target_date: parse_date(&target_date)?,
        predicted_value: row.get(6)?,
        confidence: row.get(7)?,
        factors: serde_json::from_str(&factors).unwrap_or(serde_json::Value::Null),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        actual_value: row.get(10)?,
        accuracy: row.get(11)?,
    })
}

impl Database {
    /// Persist one generation run; all records share `run_at` as prediction date
    ///
    /// Re-running at the same instant overwrites the run instead of duplicating it.
    pub fn insert_predictions(
        &self,
        organization_id: i64,
        run_at: DateTime<Utc>,
        predictions: &[NewPrediction],
    ) -> Result<Vec<Prediction>> {
        let run_at = fmt_datetime(run_at);
        let mut ids = Vec::with_capacity(predictions.len());

        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            for p in predictions {
                tx.execute(
                    r#"
                    INSERT INTO predictions (organization_id, prediction_type, category,
                                             prediction_date, target_date, predicted_value,
                                             confidence, factors, metadata)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(organization_id, prediction_type, category, target_date, prediction_date)
                    DO UPDATE SET
                        predicted_value = excluded.predicted_value,
                        confidence = excluded.confidence,
                        factors = excluded.factors,
                        metadata = excluded.metadata,
                        actual_value = NULL,
                        accuracy = NULL
                    "#,
                    params![
                        organization_id,
                        p.prediction_type.as_str(),
                        p.category,
                        run_at,
                        p.target_date.to_string(),
                        p.predicted_value,
                        p.confidence,
                        serde_json::to_string(&p.factors)?,
                        serde_json::to_string(&p.metadata)?,
                    ],
                )?;
                let id: i64 = tx.query_row(
                    r#"
                    SELECT id FROM predictions
                    WHERE organization_id = ? AND prediction_type = ? AND category = ?
                      AND target_date = ? AND prediction_date = ?
                    "#,
                    params![
                        organization_id,
                        p.prediction_type.as_str(),
                        p.category,
                        p.target_date.to_string(),
                        run_at,
                    ],
                    |row| row.get(0),
                )?;
                ids.push(id);
            }
            tx.commit()?;
        }

        let mut saved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.get_prediction(organization_id, id)? {
                saved.push(p);
            }
        }
        Ok(saved)
    }

    pub fn get_prediction(&self, organization_id: i64, id: i64) -> Result<Option<Prediction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM predictions WHERE organization_id = ? AND id = ?",
            PREDICTION_COLUMNS
        );
        let prediction = conn
            .query_row(&sql, params![organization_id, id], row_to_prediction)
            .optional()?;
        Ok(prediction)
    }

    /// Predictions, newest run first, optionally of one type
    pub fn list_predictions(
        &self,
        organization_id: i64,
        prediction_type: Option<PredictionType>,
        limit: i64,
    ) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let predictions = match prediction_type {
            Some(t) => {
                let sql = format!(
                    "SELECT {} FROM predictions WHERE organization_id = ? AND prediction_type = ? \
                     ORDER BY prediction_date DESC, target_date, id LIMIT ?",
                    PREDICTION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(params![organization_id, t.as_str(), limit], row_to_prediction)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM predictions WHERE organization_id = ? \
                     ORDER BY prediction_date DESC, target_date, id LIMIT ?",
                    PREDICTION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![organization_id, limit], row_to_prediction)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(predictions)
    }

    /// Predictions of the most recent generation run
    pub fn latest_predictions(&self, organization_id: i64) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM predictions
            WHERE organization_id = ?1
              AND prediction_date = (SELECT MAX(prediction_date) FROM predictions WHERE organization_id = ?1)
            ORDER BY prediction_type, target_date, id
            "#,
            PREDICTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let predictions = stmt
            .query_map(params![organization_id], row_to_prediction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(predictions)
    }

    /// Backfill the observed value and accuracy
    pub fn record_prediction_actual(
        &self,
        organization_id: i64,
        id: i64,
        actual_value: f64,
        accuracy: f64,
    ) -> Result<Prediction> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE predictions SET actual_value = ?, accuracy = ? WHERE organization_id = ? AND id = ?",
            params![actual_value, accuracy, organization_id, id],
        )?;
        drop(conn);

        if updated == 0 {
            return Err(Error::NotFound(format!("Prediction {}", id)));
        }
        self.get_prediction(organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Prediction {}", id)))
    }
}
