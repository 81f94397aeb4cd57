use std::fmt;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A monthly allowance: either a fixed quota or unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Allowance {
    Limited(u32),
    Unlimited,
}

impl fmt::Display for Allowance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(amount) => write!(f, "{amount}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl From<Allowance> for String {
    fn from(value: Allowance) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Allowance {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        trimmed
            .parse::<u32>()
            .map(Self::Limited)
            .map_err(|_| format!("invalid allowance `{value}` (expected a number or `unlimited`)"))
    }
}

/// A named service offering with fixed attributes. Static and read-only for
/// the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TariffPlan {
    pub name: String,
    pub minutes: Allowance,
    pub data_gb: Allowance,
    pub sms: Allowance,
    pub price_eur: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TariffCatalog {
    pub plans: Vec<TariffPlan>,
}

impl TariffCatalog {
    /// The default plan set used when no catalog file is configured.
    pub fn builtin() -> Self {
        fn plan(
            name: &str,
            minutes: Allowance,
            data_gb: Allowance,
            sms: Allowance,
            cents: i64,
        ) -> TariffPlan {
            TariffPlan {
                name: name.to_string(),
                minutes,
                data_gb,
                sms,
                price_eur: Decimal::new(cents, 2),
            }
        }

        use Allowance::{Limited, Unlimited};
        Self {
            plans: vec![
                plan("Basic 5GB", Limited(200), Limited(5), Limited(100), 14_95),
                plan("Smart 15GB", Unlimited, Limited(15), Unlimited, 24_95),
                plan("Comfort 50GB", Unlimited, Limited(50), Unlimited, 39_95),
                plan("Business 100GB", Unlimited, Limited(100), Unlimited, 54_95),
                plan("Unlimited Max", Unlimited, Unlimited, Unlimited, 84_95),
            ],
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, DomainError> {
        let catalog: Self = toml::from_str(raw)
            .map_err(|error| DomainError::InvalidCatalog(error.to_string()))?;
        if catalog.plans.is_empty() {
            return Err(DomainError::InvalidCatalog(
                "catalog must define at least one plan".to_string(),
            ));
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            DomainError::InvalidCatalog(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn plan_names(&self) -> Vec<&str> {
        self.plans.iter().map(|plan| plan.name.as_str()).collect()
    }

    /// Case-insensitive substring match of a catalog plan name inside free
    /// text. Returns the first plan, in catalog order, whose full name
    /// appears in the text.
    pub fn find_plan_in(&self, text: &str) -> Option<&TariffPlan> {
        let haystack = text.to_lowercase();
        self.plans.iter().find(|plan| haystack.contains(&plan.name.to_lowercase()))
    }

    /// Markdown table supplied as context to the assistant prompt.
    pub fn render_markdown(&self) -> String {
        let mut out = String::from(
            "| Plan | Minutes | Data | SMS | Price/month |\n|---|---|---|---|---|\n",
        );
        for plan in &self.plans {
            out.push_str(&format!(
                "| {} | {} | {} | {} | €{} |\n",
                plan.name, plan.minutes, render_data(&plan.data_gb), plan.sms, plan.price_eur
            ));
        }
        out.push_str("\nAdd-on: International Calls (€10/month) can be combined with any plan.\n");
        out
    }
}

fn render_data(allowance: &Allowance) -> String {
    match allowance {
        Allowance::Limited(gb) => format!("{gb} GB"),
        Allowance::Unlimited => "unlimited".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Allowance, TariffCatalog};

    #[test]
    fn builtin_catalog_contains_expected_plans() {
        let catalog = TariffCatalog::builtin();
        let names = catalog.plan_names();
        assert!(names.contains(&"Comfort 50GB"));
        assert!(names.contains(&"Business 100GB"));
        assert_eq!(catalog.plans.len(), 5);
    }

    #[test]
    fn plan_matching_is_case_insensitive_substring() {
        let catalog = TariffCatalog::builtin();
        let plan = catalog
            .find_plan_in("Great, I'll take the business 100gb plan.")
            .expect("plan should match");
        assert_eq!(plan.name, "Business 100GB");

        assert!(catalog.find_plan_in("I'll take it.").is_none());
    }

    #[test]
    fn markdown_rendering_lists_every_plan() {
        let catalog = TariffCatalog::builtin();
        let markdown = catalog.render_markdown();
        for plan in &catalog.plans {
            assert!(markdown.contains(&plan.name), "missing plan {}", plan.name);
        }
        assert!(markdown.contains("€39.95"));
    }

    #[test]
    fn catalog_parses_from_toml() {
        let raw = r#"
[[plans]]
name = "Test 10GB"
minutes = "unlimited"
data_gb = "10"
sms = "300"
price_eur = "19.99"
"#;
        let catalog = TariffCatalog::from_toml_str(raw).expect("parse catalog");
        assert_eq!(catalog.plans.len(), 1);
        assert_eq!(catalog.plans[0].minutes, Allowance::Unlimited);
        assert_eq!(catalog.plans[0].data_gb, Allowance::Limited(10));
    }

    #[test]
    fn empty_catalog_file_is_rejected() {
        let error = TariffCatalog::from_toml_str("plans = []").expect_err("empty catalog");
        assert!(error.to_string().contains("at least one plan"));
    }

    #[test]
    fn catalog_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[[plans]]
name = "File 20GB"
minutes = "400"
data_gb = "20"
sms = "unlimited"
price_eur = "29.95"
"#
        )
        .expect("write catalog");

        let catalog = TariffCatalog::load(file.path()).expect("load catalog");
        assert_eq!(catalog.plans[0].name, "File 20GB");
    }
}
