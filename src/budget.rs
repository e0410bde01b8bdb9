//! Budget ceilings per expense category and overage alert generation.

use crate::expense::CategoryAmount;

/// The monthly spending ceiling for each budgeted category, in dollars.
///
/// Categories not listed here are never alerted on.
pub const CATEGORY_BUDGETS: [(&str, f64); 4] = [
    ("Groceries", 300.00),
    ("Transport", 100.00),
    ("Utilities", 250.00),
    ("Entertainment", 150.00),
];

/// A category whose monthly total went over its budget ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAlert {
    /// The category that went over budget.
    pub category: String,
    /// How far over the ceiling the total is, in dollars.
    pub excess: f64,
}

/// Compare per-category totals against [CATEGORY_BUDGETS] and report overages.
///
/// Emits one alert for each category that appears in both `category_totals`
/// and the budget table with a total strictly greater than its ceiling. The
/// output order follows the input order.
///
/// This function has no notion of "current month"; the caller decides which
/// month's totals to pass in.
pub fn generate_budget_alerts(category_totals: &[CategoryAmount]) -> Vec<BudgetAlert> {
    category_totals
        .iter()
        .filter_map(|total| {
            let (_, ceiling) = CATEGORY_BUDGETS
                .iter()
                .find(|(category, _)| *category == total.category)?;

            if total.amount > *ceiling {
                Some(BudgetAlert {
                    category: total.category.clone(),
                    excess: total.amount - ceiling,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod budget_tests {
    use crate::expense::CategoryAmount;

    use super::{BudgetAlert, generate_budget_alerts};

    fn category_amount(category: &str, amount: f64) -> CategoryAmount {
        CategoryAmount {
            category: category.to_owned(),
            amount,
        }
    }

    #[test]
    fn alerts_on_category_over_budget() {
        let totals = [category_amount("Groceries", 320.0)];

        let alerts = generate_budget_alerts(&totals);

        assert_eq!(
            alerts,
            vec![BudgetAlert {
                category: "Groceries".to_owned(),
                excess: 20.0,
            }]
        );
    }

    #[test]
    fn does_not_alert_at_or_under_ceiling() {
        let totals = [
            category_amount("Groceries", 300.0),
            category_amount("Transport", 99.99),
        ];

        let alerts = generate_budget_alerts(&totals);

        assert_eq!(alerts, vec![]);
    }

    #[test]
    fn ignores_categories_without_a_budget() {
        let totals = [category_amount("Travel", 10_000.0)];

        let alerts = generate_budget_alerts(&totals);

        assert_eq!(alerts, vec![]);
    }

    #[test]
    fn alert_order_follows_input_order() {
        let totals = [
            category_amount("Entertainment", 151.0),
            category_amount("Rent", 2000.0),
            category_amount("Transport", 140.0),
            category_amount("Utilities", 250.0),
        ];

        let alerts = generate_budget_alerts(&totals);

        let alerted_categories: Vec<&str> = alerts
            .iter()
            .map(|alert| alert.category.as_str())
            .collect();
        assert_eq!(alerted_categories, ["Entertainment", "Transport"]);
    }

    #[test]
    fn empty_totals_produce_no_alerts() {
        assert_eq!(generate_budget_alerts(&[]), vec![]);
    }
}
