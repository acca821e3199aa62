//! # Statistics
//!
//! Aggregations behind the dashboard and the statistics charts. Everything here
//! is a pure function over the in-memory collections; nothing is cached.
//!
//! Months are grouped by month-of-year only, so January 2023 and January 2024
//! land in the same bucket.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::{Expense, ExpenseCategory, Income, RECENT_LIMIT};

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Abbreviated name of a month number (1-12)
pub fn month_label(month: u32) -> &'static str {
    MONTH_LABELS
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("???")
}

/// Per-month sums for the bar chart, aligned by index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// Month numbers (1-12) in calendar order
    pub months: Vec<u32>,
    pub expenses: Vec<f64>,
    pub income: Vec<f64>,
}

impl MonthlySummary {
    pub fn labels(&self) -> Vec<&'static str> {
        self.months.iter().map(|m| month_label(*m)).collect()
    }

    /// Income minus expenses for each month
    pub fn net(&self) -> Vec<f64> {
        self.income
            .iter()
            .zip(&self.expenses)
            .map(|(income, expense)| income - expense)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

fn sum_by_month(entries: impl Iterator<Item = (u32, f64)>) -> BTreeMap<u32, f64> {
    let mut totals = BTreeMap::new();
    for (month, amount) in entries {
        *totals.entry(month).or_insert(0.0) += amount;
    }
    totals
}

/// Sum expenses and income per month over the union of months present in either
pub fn monthly_summary(expenses: &[Expense], incomes: &[Income]) -> MonthlySummary {
    let expense_totals = sum_by_month(expenses.iter().map(|e| (e.date.month(), e.amount)));
    let income_totals = sum_by_month(incomes.iter().map(|i| (i.date.month(), i.amount)));

    let mut months: Vec<u32> = expense_totals
        .keys()
        .chain(income_totals.keys())
        .copied()
        .collect();
    months.sort_unstable();
    months.dedup();

    let expenses = months
        .iter()
        .map(|m| expense_totals.get(m).copied().unwrap_or(0.0))
        .collect();
    let income = months
        .iter()
        .map(|m| income_totals.get(m).copied().unwrap_or(0.0))
        .collect();

    MonthlySummary {
        months,
        expenses,
        income,
    }
}

/// Net income series for the line chart
pub fn net_by_month(expenses: &[Expense], incomes: &[Income]) -> Vec<f64> {
    monthly_summary(expenses, incomes).net()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub total: f64,
}

/// Expense sums per category, in order of each category's first occurrence
pub fn category_totals(expenses: &[Expense]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    for expense in expenses {
        match totals.iter_mut().find(|t| t.category == expense.category) {
            Some(entry) => entry.total += expense.amount,
            None => totals.push(CategoryTotal {
                category: expense.category,
                total: expense.amount,
            }),
        }
    }
    totals
}

/// Sum of any amounts
pub fn total_amount(amounts: impl IntoIterator<Item = f64>) -> f64 {
    amounts.into_iter().sum()
}

/// Figures shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceOverview {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Income minus expenses
    pub balance: f64,
    pub recent_expenses: Vec<Expense>,
    pub recent_incomes: Vec<Income>,
}

pub fn overview(expenses: &[Expense], incomes: &[Income]) -> FinanceOverview {
    let total_income = total_amount(incomes.iter().map(|i| i.amount));
    let total_expenses = total_amount(expenses.iter().map(|e| e.amount));

    FinanceOverview {
        total_income,
        total_expenses,
        balance: total_income - total_expenses,
        recent_expenses: expenses.iter().take(RECENT_LIMIT).cloned().collect(),
        recent_incomes: incomes.iter().take(RECENT_LIMIT).cloned().collect(),
    }
}
