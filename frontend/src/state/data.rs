//! # Data State
//!
//! In-memory copies of the signed-in user's expenses and income. Collections
//! are replaced wholesale by [`DataState::refresh`] and mutated one record at a
//! time after the service confirms a create, update or delete. There is no
//! optimistic update and no versioning: a refresh that overlaps a mutation may
//! drop the mutation's local effect until the next refresh.

use shared::{Expense, ExpenseUpdate, Income, IncomeUpdate, NewExpense, NewIncome};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::auth::AuthState;
use crate::error::{ClientError, Result};
use crate::lock;
use crate::services::api::ApiClient;

const EXPENSES_PATH: &str = "/expenses";
const INCOME_PATH: &str = "/income";

/// Point-in-time copy of the data state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSnapshot {
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub loading: bool,
    pub last_error: Option<ClientError>,
}

pub struct DataState {
    api: Arc<ApiClient>,
    auth: Arc<AuthState>,
    inner: Mutex<DataSnapshot>,
    revision: watch::Sender<u64>,
}

impl DataState {
    pub fn new(api: Arc<ApiClient>, auth: Arc<AuthState>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            auth,
            inner: Mutex::new(DataSnapshot::default()),
            revision,
        }
    }

    pub fn expenses(&self) -> Vec<Expense> {
        lock(&self.inner).expenses.clone()
    }

    pub fn incomes(&self) -> Vec<Income> {
        lock(&self.inner).incomes.clone()
    }

    pub fn snapshot(&self) -> DataSnapshot {
        lock(&self.inner).clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner).loading
    }

    pub fn last_error(&self) -> Option<ClientError> {
        lock(&self.inner).last_error.clone()
    }

    pub fn clear_error(&self) {
        self.update(|state| state.last_error = None);
    }

    /// Drop both collections and any recorded error
    pub fn clear(&self) {
        self.update(|state| *state = DataSnapshot::default());
    }

    /// Revision counter, bumped after every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn update<R>(&self, f: impl FnOnce(&mut DataSnapshot) -> R) -> R {
        let result = {
            let mut state = lock(&self.inner);
            f(&mut *state)
        };
        self.revision.send_modify(|revision| *revision += 1);
        result
    }

    /// Like `update`, but only while the session that issued the request is
    /// still the current one. The epoch is compared under the state lock, so a
    /// logout either happens before (result dropped) or after (result cleared).
    fn apply<R>(&self, epoch: u64, f: impl FnOnce(&mut DataSnapshot) -> R) -> Result<R> {
        let result = {
            let mut state = lock(&self.inner);
            if self.auth.epoch() != epoch {
                return Err(ClientError::SessionChanged);
            }
            f(&mut *state)
        };
        self.revision.send_modify(|revision| *revision += 1);
        Ok(result)
    }

    /// Session epoch to issue requests under
    fn session_epoch(&self) -> Result<u64> {
        if self.auth.is_authenticated() {
            Ok(self.auth.epoch())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    /// Keep a failure around for display, then hand it back
    fn record<T>(&self, operation: &str, epoch: u64, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Failed to {}: {}", operation, e);
            let recorded = e.clone();
            if self.apply(epoch, |state| state.last_error = Some(recorded)).is_err() {
                debug!("Session changed, not recording the failure");
            }
        }
        result
    }

    /// Reload both collections from the service
    pub async fn refresh(&self) -> Result<()> {
        let epoch = self.session_epoch()?;

        self.update(|state| {
            state.loading = true;
            state.last_error = None;
        });

        let result = tokio::try_join!(
            self.api.get::<Vec<Expense>>(EXPENSES_PATH),
            self.api.get::<Vec<Income>>(INCOME_PATH),
        );

        match result {
            Ok((expenses, incomes)) => {
                let (expense_count, income_count) = (expenses.len(), incomes.len());
                self.apply(epoch, |state| {
                    state.expenses = expenses;
                    state.incomes = incomes;
                    state.loading = false;
                })
                .map_err(|e| {
                    warn!("Session changed during refresh, dropping loaded data");
                    e
                })?;
                info!(
                    "Loaded {} expenses and {} income records",
                    expense_count, income_count
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to refresh data: {}", e);
                let recorded = e.clone();
                self.apply(epoch, |state| {
                    state.loading = false;
                    state.last_error = Some(recorded);
                })?;
                Err(e)
            }
        }
    }

    pub async fn add_expense(&self, expense: NewExpense) -> Result<Expense> {
        let epoch = self.session_epoch()?;
        let result = match expense.validate() {
            Ok(()) => self.api.post::<_, Expense>(EXPENSES_PATH, &expense).await,
            Err(e) => Err(e.into()),
        };
        let created = self.record("add expense", epoch, result)?;

        self.apply(epoch, |state| state.expenses.push(created.clone()))?;
        info!("Added expense {} ({})", created.id, created.category);
        Ok(created)
    }

    pub async fn update_expense(&self, id: i64, changes: ExpenseUpdate) -> Result<Expense> {
        let epoch = self.session_epoch()?;
        let result = match changes.validate() {
            Ok(()) => {
                self.api
                    .put::<_, Expense>(&format!("{}/{}", EXPENSES_PATH, id), &changes)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        let updated = self.record("update expense", epoch, result)?;

        self.apply(epoch, |state| {
            replace_by_id(&mut state.expenses, id, updated.clone(), |e| e.id)
        })?;
        info!("Updated expense {}", id);
        Ok(updated)
    }

    pub async fn delete_expense(&self, id: i64) -> Result<()> {
        let epoch = self.session_epoch()?;
        let result = self.api.delete(&format!("{}/{}", EXPENSES_PATH, id)).await;
        self.record("delete expense", epoch, result)?;

        self.apply(epoch, |state| state.expenses.retain(|e| e.id != id))?;
        info!("Deleted expense {}", id);
        Ok(())
    }

    pub async fn add_income(&self, income: NewIncome) -> Result<Income> {
        let epoch = self.session_epoch()?;
        let result = match income.validate() {
            Ok(()) => self.api.post::<_, Income>(INCOME_PATH, &income).await,
            Err(e) => Err(e.into()),
        };
        let created = self.record("add income", epoch, result)?;

        self.apply(epoch, |state| state.incomes.push(created.clone()))?;
        info!("Added income {} from {}", created.id, created.source);
        Ok(created)
    }

    pub async fn update_income(&self, id: i64, changes: IncomeUpdate) -> Result<Income> {
        let epoch = self.session_epoch()?;
        let result = match changes.validate() {
            Ok(()) => {
                self.api
                    .put::<_, Income>(&format!("{}/{}", INCOME_PATH, id), &changes)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        let updated = self.record("update income", epoch, result)?;

        self.apply(epoch, |state| {
            replace_by_id(&mut state.incomes, id, updated.clone(), |i| i.id)
        })?;
        info!("Updated income {}", id);
        Ok(updated)
    }

    pub async fn delete_income(&self, id: i64) -> Result<()> {
        let epoch = self.session_epoch()?;
        let result = self.api.delete(&format!("{}/{}", INCOME_PATH, id)).await;
        self.record("delete income", epoch, result)?;

        self.apply(epoch, |state| state.incomes.retain(|i| i.id != id))?;
        info!("Deleted income {}", id);
        Ok(())
    }
}

/// Put `updated` in the slot of record `id`; records we never loaded are left alone
fn replace_by_id<T>(items: &mut [T], id: i64, updated: T, id_of: impl Fn(&T) -> i64) {
    if let Some(slot) = items.iter_mut().find(|item| id_of(item) == id) {
        *slot = updated;
    }
}
