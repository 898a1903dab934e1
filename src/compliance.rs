//! Keyword policy applied to chat text and product copy.
//!
//! The policy is a fixed, ordered list of [`Rule`]s. Every rule sees the
//! lower-cased text and may add violations, warnings or a disclaimer to the
//! [`Verdict`]; none of them stop the others from running. Matching is plain
//! substring search, so false positives are expected.

use rust_decimal::Decimal;
use serde::Serialize;

pub const PROHIBITED_TERMS: &[&str] = &[
    "alcohol-based",
    "pork-derived",
    "gelatin",
    "non-halal",
    "inappropriate content",
    "political topics",
    "excessive luxury",
    "gambling",
    "adult content",
    "religious insensitivity",
];

pub const HALAL_CONTEXT_TERMS: &[&str] = &[
    "makeup",
    "cosmetics",
    "skincare",
    "personal care",
    "beauty products",
    "fragrance",
    "perfume",
];

pub const CULTURALLY_RESTRICTED_TERMS: &[&str] = &[
    "revealing",
    "immodest",
    "provocative",
    "nightlife",
    "party makeup",
];

const PRICE_TERMS: &[&str] = &["price", "aed", "$"];
const TAX_TERMS: &[&str] = &["vat", "tax"];
const AGE_SENSITIVE_TERMS: &[&str] = &["teen", "young", "child"];

pub const HALAL_DISCLAIMER: &str = "Halal certification status available on request";
pub const VAT_DISCLAIMER: &str = "All prices include 5% UAE VAT";

pub const STANDING_DISCLAIMER: &str = "This service operates in compliance with UAE regulations and Islamic values. All product recommendations are subject to halal verification and UAE import compliance.";

pub const BUSINESS_HOURS: &str = "Our customer service is available Sunday to Thursday, 9:00 AM to 6:00 PM UAE time, respecting local prayer times.";

/// UAE VAT, 5%.
pub const VAT_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_compliant: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub required_disclaimer: Option<String>,
}

impl Verdict {
    fn finish(mut self) -> Self {
        self.is_compliant = self.violations.is_empty();
        self
    }
}

struct Rule {
    name: &'static str,
    apply: fn(text: &str, customer: bool, verdict: &mut Verdict),
}

const RULES: &[Rule] = &[
    Rule {
        name: "prohibited",
        apply: |text, _, verdict| {
            for term in PROHIBITED_TERMS.iter().filter(|t| text.contains(*t)) {
                verdict
                    .violations
                    .push(format!("Contains prohibited content: {term}"));
            }
        },
    },
    Rule {
        name: "halal-disclosure",
        apply: |text, _, verdict| {
            if contains_any(text, HALAL_CONTEXT_TERMS) && !text.contains("halal") {
                verdict
                    .warnings
                    .push("Product recommendation should include halal verification".into());
                verdict.required_disclaimer = Some(HALAL_DISCLAIMER.into());
            }
        },
    },
    Rule {
        name: "vat-disclosure",
        apply: |text, _, verdict| {
            if contains_any(text, PRICE_TERMS) && !contains_any(text, TAX_TERMS) {
                verdict
                    .warnings
                    .push("Price mentions should include VAT information".into());
                verdict.required_disclaimer = Some(VAT_DISCLAIMER.into());
            }
        },
    },
    Rule {
        name: "age-sensitive",
        apply: |text, customer, verdict| {
            if customer && contains_any(text, AGE_SENSITIVE_TERMS) {
                verdict
                    .warnings
                    .push("Age-sensitive content - parental guidance may be required".into());
            }
        },
    },
    Rule {
        name: "cultural",
        apply: |text, _, verdict| {
            for term in CULTURALLY_RESTRICTED_TERMS
                .iter()
                .filter(|t| text.contains(*t))
            {
                verdict
                    .violations
                    .push(format!("Culturally inappropriate content: {term}"));
            }
        },
    },
];

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// Evaluates `text` against every rule. `customer` is false for staff-facing
/// text, which skips the age-sensitivity warning.
pub fn check_message(text: &str, customer: bool) -> Verdict {
    let normalized = text.to_lowercase();
    let mut verdict = Verdict::default();
    for rule in RULES {
        (rule.apply)(&normalized, customer, &mut verdict);
    }
    verdict.finish()
}

/// Names of the rules in evaluation order.
#[cfg(test)]
fn rule_names() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|r| r.name)
}

/// Checks product copy before it is listed.
pub fn check_product(description: &str) -> Verdict {
    check_message(description, true)
}

/// `AED 105.00 (inc. 5% VAT)` for a net price of 100.
pub fn format_price_aed(price: Decimal) -> String {
    let gross = (price * (Decimal::ONE + VAT_RATE)).round_dp(2);
    format!("AED {gross:.2} (inc. 5% VAT)")
}
