//! Rule-based transaction categorizer
//!
//! An ordered rule table maps movement descriptions to categories; the first rule
//! whose direction filter and pattern both match wins. Unmatched movements fall back
//! to `other_expense` / `other_income` at low confidence.

use regex::Regex;

use crate::error::Result;
use crate::models::Direction;

pub const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Case-insensitive substring; `|` separates alternatives
    Contains,
    Regex,
}

/// One row of the rule table
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: &'static str,
    /// `None` matches both directions
    pub direction: Option<Direction>,
    pub kind: PatternKind,
    pub pattern: &'static str,
    pub confidence: f64,
}

const fn rule(
    category: &'static str,
    direction: Option<Direction>,
    kind: PatternKind,
    pattern: &'static str,
    confidence: f64,
) -> CategoryRule {
    CategoryRule {
        category,
        direction,
        kind,
        pattern,
        confidence,
    }
}

const IN: Option<Direction> = Some(Direction::Income);
const OUT: Option<Direction> = Some(Direction::Expense);

/// Built-in rules, most specific first
pub fn default_rules() -> Vec<CategoryRule> {
    use PatternKind::*;
    vec![
        rule("bank_fees", OUT, Regex, r"(?i)\b(bank|transaction|service|ledger)\s+(fee|charge)s?\b", 0.95),
        rule("payroll", OUT, Contains, "salary|salaries|payroll|wages|stipend", 0.9),
        rule("rent", OUT, Contains, "rent|lease|landlord", 0.9),
        rule("tax", OUT, Regex, r"(?i)\b(tax|vat|paye|kra|irs)\b", 0.9),
        rule("utilities", OUT, Contains, "electric|water bill|internet|utility|utilities|power bill|airtime", 0.85),
        rule("inventory", OUT, Contains, "stock|inventory|wholesale|supplier|restock|purchase order", 0.85),
        rule("marketing", OUT, Contains, "advert|marketing|facebook ads|google ads|promotion|flyers", 0.85),
        rule("software", OUT, Contains, "subscription|software|saas|hosting|domain", 0.8),
        rule("transport", OUT, Contains, "fuel|petrol|diesel|uber|bolt|taxi|transport|delivery|courier", 0.8),
        rule("meals", OUT, Contains, "lunch|dinner|restaurant|cafe|coffee|meal", 0.75),
        rule("refunds", IN, Contains, "refund|reversal|chargeback", 0.85),
        rule("interest", IN, Contains, "interest|dividend", 0.85),
        rule("sales", IN, Regex, r"(?i)\b(sale|sales|invoice|inv-\d+|payment received|received from|pos)\b", 0.85),
        rule("loans", None, Contains, "loan", 0.7),
        rule("transfers", None, Contains, "transfer|withdrawal|deposit", 0.6),
    ]
}

struct CompiledRule {
    rule: CategoryRule,
    matcher: Matcher,
}

enum Matcher {
    Contains(Vec<String>),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, description: &str, lower: &str) -> bool {
        match self {
            Self::Contains(needles) => needles.iter().any(|n| lower.contains(n.as_str())),
            Self::Regex(re) => re.is_match(description),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category: String,
    pub confidence: f64,
    /// False when the fallback category was used
    pub matched: bool,
}

pub struct Categorizer {
    rules: Vec<CompiledRule>,
}

impl Categorizer {
    /// Categorizer with the built-in rule table
    pub fn new() -> Result<Self> {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<CategoryRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let matcher = match rule.kind {
                    PatternKind::Contains => Matcher::Contains(
                        rule.pattern
                            .split('|')
                            .map(|p| p.trim().to_lowercase())
                            .filter(|p| !p.is_empty())
                            .collect(),
                    ),
                    PatternKind::Regex => Matcher::Regex(Regex::new(rule.pattern)?),
                };
                Ok(CompiledRule { rule, matcher })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    fn first_match(&self, description: &str, direction: Option<Direction>) -> Option<&CategoryRule> {
        let lower = description.to_lowercase();
        self.rules
            .iter()
            .filter(|c| match (c.rule.direction, direction) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            })
            .find(|c| c.matcher.is_match(description, &lower))
            .map(|c| &c.rule)
    }

    /// Category for a movement description
    pub fn categorize(&self, description: &str, direction: Direction) -> Categorization {
        match self.first_match(description, Some(direction)) {
            Some(rule) => Categorization {
                category: rule.category.to_string(),
                confidence: rule.confidence,
                matched: true,
            },
            None => Categorization {
                category: match direction {
                    Direction::Income => "other_income",
                    Direction::Expense => "other_expense",
                }
                .to_string(),
                confidence: FALLBACK_CONFIDENCE,
                matched: false,
            },
        }
    }

    /// All category names the table can produce
    pub fn categories(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for c in &self.rules {
            if !names.contains(&c.rule.category) {
                names.push(c.rule.category);
            }
        }
        names
    }

    /// Expense category mentioned in free text, by name or by rule keyword
    pub fn detect_category(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        if let Some(name) = self
            .categories()
            .into_iter()
            .find(|name| words.iter().any(|w| w == name))
        {
            return Some(name.to_string());
        }

        self.first_match(text, Some(Direction::Expense))
            .map(|rule| rule.category.to_string())
    }
}
