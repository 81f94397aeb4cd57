use tariffsim_core::domain::tariff::TariffCatalog;

/// Fixed purchase-language trigger set. A selection requires one of these
/// phrases plus a catalog plan name in the same message.
const TRIGGER_PHRASES: [&str; 7] = [
    "i'll take",
    "i will take",
    "i choose",
    "i want to purchase",
    "i want to buy",
    "sign me up",
    "go with",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionDecision {
    Selected { plan_name: String },
    NotSelected,
}

impl SelectionDecision {
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected { .. })
    }
}

/// Deterministic judge for "has the customer committed to a plan".
///
/// Policy, in order:
/// 1. A message containing a question mark is never a selection; a customer
///    asking anything is still gathering information.
/// 2. Otherwise the message must contain both explicit purchase language and
///    a recognizable plan name from the static catalog.
///
/// Pure function over text plus the catalog; no model, no state.
#[derive(Clone, Debug)]
pub struct SelectionClassifier {
    catalog: TariffCatalog,
}

impl SelectionClassifier {
    pub fn new(catalog: TariffCatalog) -> Self {
        Self { catalog }
    }

    pub fn classify(&self, message: &str) -> SelectionDecision {
        if message.contains('?') {
            return SelectionDecision::NotSelected;
        }

        let lowered = message.to_lowercase();
        let has_purchase_language =
            TRIGGER_PHRASES.iter().any(|phrase| lowered.contains(phrase));
        if !has_purchase_language {
            return SelectionDecision::NotSelected;
        }

        match self.catalog.find_plan_in(message) {
            Some(plan) => SelectionDecision::Selected { plan_name: plan.name.clone() },
            None => SelectionDecision::NotSelected,
        }
    }

    pub fn is_selection(&self, message: &str) -> bool {
        self.classify(message).is_selected()
    }
}
