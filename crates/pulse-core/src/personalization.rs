//! Tone, greetings, money formatting and quiet hours
//!
//! Preferences come from the organization row, falling back to the configured
//! defaults. Hours are read from the operation clock.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PersonalizationDefaults;
use crate::db::Database;
use crate::error::Result;
use crate::models::Mood;

/// How responses are phrased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Friendly,
    Formal,
    Concise,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friendly => "friendly",
            Self::Formal => "formal",
            Self::Concise => "concise",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "friendly" => Ok(Self::Friendly),
            "formal" => Ok(Self::Formal),
            "concise" => Ok(Self::Concise),
            _ => Err(format!("Unknown tone: {}", s)),
        }
    }
}

/// Resolved presentation preferences for one organization
#[derive(Debug, Clone, PartialEq)]
pub struct Personalization {
    pub tone: Tone,
    pub currency: String,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,
}

impl From<&PersonalizationDefaults> for Personalization {
    fn from(d: &PersonalizationDefaults) -> Self {
        Self {
            tone: d.tone,
            currency: d.currency.clone(),
            quiet_hours_start: d.quiet_hours_start,
            quiet_hours_end: d.quiet_hours_end,
        }
    }
}

impl Personalization {
    /// Organization preferences over config defaults
    pub fn for_organization(
        db: &Database,
        organization_id: i64,
        defaults: &PersonalizationDefaults,
    ) -> Result<Self> {
        let mut p = Self::from(defaults);
        if let Some(org) = db.get_organization(organization_id)? {
            p.tone = org.tone;
            p.currency = org.currency;
        }
        Ok(p)
    }

    /// Greeting for the hour of `now`
    pub fn greeting(&self, now: DateTime<Utc>) -> String {
        let part = match now.hour() {
            5..=11 => "morning",
            12..=16 => "afternoon",
            17..=21 => "evening",
            _ => "",
        };

        match (self.tone, part) {
            (Tone::Concise, "") => "Hi.".to_string(),
            (Tone::Concise, p) => format!("{}{}.", p[..1].to_uppercase(), &p[1..]),
            (Tone::Formal, "") => "Hello.".to_string(),
            (Tone::Formal, p) => format!("Good {}.", p),
            (Tone::Friendly, "") => "Hi there!".to_string(),
            (Tone::Friendly, p) => format!("Good {}!", p),
        }
    }

    /// Currency amount with thousands separators and two decimals
    pub fn format_money(&self, amount: f64) -> String {
        format_money(amount, &self.currency)
    }

    /// Whether proactive suggestions should wait
    pub fn is_quiet_hour(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        let (start, end) = (self.quiet_hours_start, self.quiet_hours_end);
        if start == end {
            false
        } else if start < end {
            hour >= start && hour < end
        } else {
            // Wraps midnight, e.g. 21 -> 7
            hour >= start || hour < end
        }
    }

    /// Phrase the state context in the organization's tone
    pub fn frame_context(&self, context: &str, mood: Mood) -> String {
        match self.tone {
            Tone::Friendly => {
                let lead = match mood {
                    Mood::Concerned => "Heads up: ",
                    Mood::Attentive => "Worth a look: ",
                    Mood::Optimistic => "Good news: ",
                    Mood::Neutral => "",
                };
                format!("{}{}", lead, context)
            }
            Tone::Formal => format!("Current assessment ({}): {}", mood, context),
            Tone::Concise => context
                .split_terminator(". ")
                .next()
                .unwrap_or(context)
                .trim_end_matches('.')
                .to_string(),
        }
    }
}

/// Format an amount for a currency code
pub fn format_money(amount: f64, currency: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match currency.to_uppercase().as_str() {
        "USD" => format!("{}${}.{:02}", sign, grouped, frac),
        "EUR" => format!("{}€{}.{:02}", sign, grouped, frac),
        "GBP" => format!("{}£{}.{:02}", sign, grouped, frac),
        code => format!("{}{} {}.{:02}", sign, code, grouped, frac),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, 0, 0).unwrap()
    }

    fn prefs(tone: Tone) -> Personalization {
        Personalization {
            tone,
            ..Personalization::from(&PersonalizationDefaults::default())
        }
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(1234567.891, "USD"), "$1,234,567.89");
        assert_eq!(format_money(-50.0, "usd"), "-$50.00");
        assert_eq!(format_money(999.999, "EUR"), "€1,000.00");
        assert_eq!(format_money(0.0, "GBP"), "£0.00");
        assert_eq!(format_money(12500.5, "KES"), "KES 12,500.50");
    }

    #[test]
    fn test_greeting_by_hour_and_tone() {
        assert_eq!(prefs(Tone::Friendly).greeting(at(9)), "Good morning!");
        assert_eq!(prefs(Tone::Formal).greeting(at(14)), "Good afternoon.");
        assert_eq!(prefs(Tone::Concise).greeting(at(19)), "Evening.");
        assert_eq!(prefs(Tone::Friendly).greeting(at(2)), "Hi there!");
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let p = prefs(Tone::Friendly); // 21 -> 7
        assert!(p.is_quiet_hour(at(23)));
        assert!(p.is_quiet_hour(at(3)));
        assert!(!p.is_quiet_hour(at(7)));
        assert!(!p.is_quiet_hour(at(12)));

        let day = Personalization {
            quiet_hours_start: 12,
            quiet_hours_end: 13,
            ..p
        };
        assert!(day.is_quiet_hour(at(12)));
        assert!(!day.is_quiet_hour(at(13)));
    }

    #[test]
    fn test_frame_context() {
        let ctx = "Cash is tight. Payroll is due Friday.";
        assert_eq!(
            prefs(Tone::Friendly).frame_context(ctx, Mood::Concerned),
            "Heads up: Cash is tight. Payroll is due Friday."
        );
        assert_eq!(prefs(Tone::Concise).frame_context(ctx, Mood::Concerned), "Cash is tight");
        assert!(prefs(Tone::Formal)
            .frame_context(ctx, Mood::Concerned)
            .starts_with("Current assessment (concerned)"));
    }

    #[test]
    fn test_org_preferences_override_defaults() {
        let db = Database::in_memory().unwrap();
        let org = db
            .create_organization("Acme", "eur", Tone::Concise, Utc::now())
            .unwrap();

        let p = Personalization::for_organization(&db, org, &PersonalizationDefaults::default())
            .unwrap();
        assert_eq!(p.tone, Tone::Concise);
        assert_eq!(p.currency, "EUR");

        let fallback =
            Personalization::for_organization(&db, 999, &PersonalizationDefaults::default())
                .unwrap();
        assert_eq!(fallback.tone, Tone::Friendly);
        assert_eq!(fallback.currency, "USD");
    }
}
