//! In-memory catalog backend.
//!
//! Every connection opened through [`MemoryCatalog`] shares the same state, so a
//! test can seed tables, run lifecycle operations through the `Connector` seam
//! and inspect the result afterwards. Failures can be injected per operation and
//! table, and every structural statement is recorded in a journal.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use rust_decimal::Decimal;

use bgn2eur_core::{
    catalog::{PRODUCT, PRODUCT_DISCOUNT, PRODUCT_OPTION_VALUE, PRODUCT_SPECIAL},
    CatalogBackend, Connector, CurrencyRecord, MonetaryTable, PriceRow, ProductListing,
    SchemaMode, SettingsStore, StorageError, TableNames,
};

pub const DEFAULT_SCHEMA_MODE: &str = "STRICT_TRANS_TABLES";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Money(Decimal),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Money(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl Value {
    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Money(m) => Some(*m),
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Text(t) => t.parse().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Money(m) => m.to_string(),
            Value::Text(t) => t.clone(),
        }
    }
}

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Operations a test can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOp {
    Connect,
    /// Matched against the clone's target table.
    CloneStructure,
    /// Matched against the copy's target table.
    CopyRows,
    /// Matched against the table being renamed away.
    Rename,
    Drop,
    /// Matched against the table handing its dependents over.
    AdoptDependents,
    UpdatePrice,
    RelaxSchema,
    /// Matched against the settings key.
    WriteSetting,
}

#[derive(Debug)]
struct State {
    tables: BTreeMap<String, TableData>,
    settings: BTreeMap<String, String>,
    schema_mode: String,
    failures: Vec<(FailOp, String)>,
    journal: Vec<String>,
    open_connections: u64,
    atomic_renames: bool,
}

impl State {
    fn check(&self, op: FailOp, subject: &str) -> Result<(), StorageError> {
        let injected = self
            .failures
            .iter()
            .any(|(o, s)| *o == op && (s.is_empty() || s == subject));
        if injected {
            return Err(StorageError::Other(format!("injected {:?} failure on {}", op, subject)));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&TableData, StorageError> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableData, StorageError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn count_where(&self, table: &str, column: &str, value: i64) -> u64 {
        self.tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| r.get(column).and_then(Value::as_int) == Some(value))
                    .count() as u64
            })
            .unwrap_or(0)
    }
}

/// Shared in-memory store. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
    names: TableNames,
}

impl MemoryCatalog {
    pub fn new(prefix: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tables: BTreeMap::new(),
                settings: BTreeMap::new(),
                schema_mode: DEFAULT_SCHEMA_MODE.to_string(),
                failures: Vec::new(),
                journal: Vec::new(),
                open_connections: 0,
                atomic_renames: false,
            })),
            names: TableNames::new(prefix),
        }
    }

    /// A store with the four monetary tables plus currency, language and description tables, all empty.
    pub fn with_catalog(prefix: &str) -> Self {
        let catalog = Self::new(prefix);
        catalog.create_table(PRODUCT.name, &["product_id", "model", "price", "status"]);
        catalog.create_table(
            PRODUCT_OPTION_VALUE.name,
            &["product_option_value_id", "product_id", "price"],
        );
        catalog.create_table(PRODUCT_DISCOUNT.name, &["product_discount_id", "product_id", "price"]);
        catalog.create_table(PRODUCT_SPECIAL.name, &["product_special_id", "product_id", "price"]);
        catalog.create_table("currency", &["code", "value", "status"]);
        catalog.create_table("language", &["language_id", "status"]);
        catalog.create_table("product_description", &["product_id", "language_id", "name"]);
        catalog
    }

    pub fn names(&self) -> &TableNames {
        &self.names
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the assertions that follow.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates `{prefix}{base}` with the given columns.
    pub fn create_table(&self, base: &str, columns: &[&str]) {
        let name = self.names.live(base);
        self.lock().tables.insert(
            name,
            TableData {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Appends a row to `{prefix}{base}`.
    pub fn insert(&self, base: &str, values: Vec<(&str, Value)>) {
        let name = self.names.live(base);
        let row: Row = values.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.lock().tables.entry(name).or_default().rows.push(row);
    }

    pub fn set_currency(&self, code: &str, value: Decimal, active: bool) {
        let name = self.names.currency();
        let mut state = self.lock();
        let table = state.tables.entry(name).or_default();
        table
            .rows
            .retain(|r| r.get("code").map(Value::as_text).as_deref() != Some(code));
        table.rows.push(
            [
                ("code".to_string(), Value::from(code)),
                ("value".to_string(), Value::Money(value)),
                ("status".to_string(), Value::Int(active as i64)),
            ]
            .into_iter()
            .collect(),
        );
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        self.lock().settings.insert(key.to_string(), value.to_string());
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.lock().settings.get(key).cloned()
    }

    /// Stored price of one row of a physical table.
    pub fn price(&self, table: &str, id_column: &str, id: i64) -> Option<Decimal> {
        let state = self.lock();
        state.tables.get(table)?.rows.iter().find_map(|r| {
            if r.get(id_column).and_then(Value::as_int) == Some(id) {
                r.get("price").and_then(Value::as_decimal)
            } else {
                None
            }
        })
    }

    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.lock().tables.get(table).map(|t| t.rows.clone())
    }

    pub fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.lock().tables.get(table).map(|t| t.columns.clone())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Makes every later `op` on `subject` fail. An empty subject matches any table.
    pub fn fail_on(&self, op: FailOp, subject: &str) {
        self.lock().failures.push((op, subject.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Makes `rename_tables` all-or-nothing, like a multi-table `RENAME TABLE`.
    pub fn set_atomic_renames(&self, atomic: bool) {
        self.lock().atomic_renames = atomic;
    }

    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn schema_mode(&self) -> String {
        self.lock().schema_mode.clone()
    }

    pub fn open_connections(&self) -> u64 {
        self.lock().open_connections
    }
}

impl Connector for MemoryCatalog {
    fn connect(&self) -> Result<Box<dyn CatalogBackend>, StorageError> {
        let mut state = self.lock();
        state
            .check(FailOp::Connect, "")
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        state.open_connections += 1;
        tracing::debug!(open = state.open_connections, "Memory connection opened");
        Ok(Box::new(MemorySession {
            catalog: self.clone(),
        }))
    }
}

/// One connection to a [`MemoryCatalog`].
pub struct MemorySession {
    catalog: MemoryCatalog,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut state = self.catalog.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

impl MemorySession {
    fn state(&self) -> MutexGuard<'_, State> {
        self.catalog.lock()
    }
}

impl SettingsStore for MemorySession {
    fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.state().settings.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::WriteSetting, key)?;
        state.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn update(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        let mut state = self.state();
        state.check(FailOp::WriteSetting, key)?;
        match state.settings.get_mut(key) {
            Some(v) => {
                *v = value.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        let mut state = self.state();
        state.check(FailOp::WriteSetting, key)?;
        Ok(state.settings.remove(key).is_some())
    }
}

impl CatalogBackend for MemorySession {
    fn table_exists(&mut self, table: &str) -> Result<bool, StorageError> {
        Ok(self.state().tables.contains_key(table))
    }

    fn clone_structure(&mut self, source: &str, target: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::CloneStructure, target)?;
        if state.tables.contains_key(target) {
            return Err(StorageError::TableAlreadyExists(target.to_string()));
        }
        let columns = state.table(source)?.columns.clone();
        state.tables.insert(
            target.to_string(),
            TableData {
                columns,
                rows: Vec::new(),
            },
        );
        state.journal.push(format!("clone {} -> {}", source, target));
        Ok(())
    }

    fn copy_rows(&mut self, source: &str, target: &str) -> Result<u64, StorageError> {
        let mut state = self.state();
        state.check(FailOp::CopyRows, target)?;
        let rows = state.table(source)?.rows.clone();
        let copied = rows.len() as u64;
        state.table_mut(target)?.rows.extend(rows);
        state.journal.push(format!("copy {} -> {}", source, target));
        Ok(copied)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64, StorageError> {
        Ok(self.state().table(table)?.rows.len() as u64)
    }

    fn count_by_status(&mut self, table: &str, active: bool) -> Result<u64, StorageError> {
        let state = self.state();
        state.table(table)?;
        Ok(state.count_where(table, "status", active as i64))
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::Rename, from)?;
        if state.tables.contains_key(to) {
            return Err(StorageError::TableAlreadyExists(to.to_string()));
        }
        let data = state
            .tables
            .remove(from)
            .ok_or_else(|| StorageError::TableNotFound(from.to_string()))?;
        state.tables.insert(to.to_string(), data);
        state.journal.push(format!("rename {} -> {}", from, to));
        Ok(())
    }

    fn renames_atomically(&self) -> bool {
        self.state().atomic_renames
    }

    fn rename_tables(&mut self, renames: &[(&str, &str)]) -> Result<(), StorageError> {
        let state = self.state();
        if !state.atomic_renames {
            drop(state);
            for (from, to) in renames {
                self.rename_table(from, to)?;
            }
            return Ok(());
        }

        let mut state = state;
        let mut tables = state.tables.clone();
        for (from, to) in renames {
            state.check(FailOp::Rename, from)?;
            if tables.contains_key(*to) {
                return Err(StorageError::TableAlreadyExists(to.to_string()));
            }
            let data = tables
                .remove(*from)
                .ok_or_else(|| StorageError::TableNotFound(from.to_string()))?;
            tables.insert(to.to_string(), data);
        }
        state.tables = tables;
        for (from, to) in renames {
            state.journal.push(format!("rename {} -> {}", from, to));
        }
        Ok(())
    }

    fn adopt_dependents(&mut self, previous: &str, current: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::AdoptDependents, previous)?;
        state.journal.push(format!("adopt {} -> {}", previous, current));
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::Drop, table)?;
        state
            .tables
            .remove(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        state.journal.push(format!("drop {}", table));
        Ok(())
    }

    fn select_prices(&mut self, qualified_name: &str, table: &MonetaryTable) -> Result<Vec<PriceRow>, StorageError> {
        let state = self.state();
        let data = state.table(qualified_name)?;
        let mut result = Vec::new();
        for row in &data.rows {
            let id = row.get(table.id_column).and_then(Value::as_int).ok_or_else(|| {
                StorageError::InvalidValue {
                    column: table.id_column.to_string(),
                    value: format!("{:?}", row.get(table.id_column)),
                }
            })?;
            let price = row
                .get(table.price_column)
                .and_then(Value::as_decimal)
                .unwrap_or(Decimal::ZERO);
            if table.filter.matches(price) {
                result.push(PriceRow { id, price });
            }
        }
        result.sort_by_key(|r| r.id);
        Ok(result)
    }

    fn update_price(&mut self, qualified_name: &str, table: &MonetaryTable, id: i64, price: Decimal) -> Result<(), StorageError> {
        let mut state = self.state();
        state.check(FailOp::UpdatePrice, qualified_name)?;
        let data = state.table_mut(qualified_name)?;
        for row in data.rows.iter_mut() {
            if row.get(table.id_column).and_then(Value::as_int) == Some(id) {
                row.insert(table.price_column.to_string(), Value::Money(price));
            }
        }
        Ok(())
    }

    fn relax_schema_mode(&mut self) -> Result<SchemaMode, StorageError> {
        let mut state = self.state();
        state.check(FailOp::RelaxSchema, "")?;
        let previous = std::mem::take(&mut state.schema_mode);
        state.journal.push("schema_mode ''".to_string());
        Ok(SchemaMode(previous))
    }

    fn restore_schema_mode(&mut self, previous: &SchemaMode) -> Result<(), StorageError> {
        let mut state = self.state();
        state.schema_mode = previous.0.clone();
        state.journal.push(format!("schema_mode '{}'", previous.0));
        Ok(())
    }

    fn currency(&mut self, code: &str) -> Result<Option<CurrencyRecord>, StorageError> {
        let name = self.catalog.names.currency();
        let state = self.state();
        let Some(table) = state.tables.get(&name) else {
            return Err(StorageError::TableNotFound(name));
        };
        let record = table
            .rows
            .iter()
            .find(|r| r.get("code").map(Value::as_text).as_deref() == Some(code))
            .map(|r| CurrencyRecord {
                code: code.to_string(),
                value: r.get("value").and_then(Value::as_decimal).unwrap_or(Decimal::ZERO),
                status: r.get("status").and_then(Value::as_int) == Some(1),
            });
        Ok(record)
    }

    fn active_language(&mut self) -> Result<Option<i64>, StorageError> {
        let name = self.catalog.names.language();
        let state = self.state();
        let table = state.table(&name)?;
        Ok(table
            .rows
            .iter()
            .filter(|r| r.get("status").and_then(Value::as_int) == Some(1))
            .filter_map(|r| r.get("language_id").and_then(Value::as_int))
            .min())
    }

    fn product_listing(&mut self, language_id: i64) -> Result<Vec<ProductListing>, StorageError> {
        let names = self.catalog.names.clone();
        let state = self.state();
        let products = state.table(&names.live(PRODUCT.name))?;
        let descriptions = state.table(&names.product_description())?;

        let mut result = Vec::new();
        for row in &products.rows {
            let Some(product_id) = row.get("product_id").and_then(Value::as_int) else {
                continue;
            };
            let name = descriptions.rows.iter().find(|d| {
                d.get("product_id").and_then(Value::as_int) == Some(product_id)
                    && d.get("language_id").and_then(Value::as_int) == Some(language_id)
            });
            let Some(name) = name.and_then(|d| d.get("name")).map(Value::as_text) else {
                continue;
            };
            result.push(ProductListing {
                product_id,
                model: row.get("model").map(Value::as_text).unwrap_or_default(),
                name,
                price: row.get("price").and_then(Value::as_decimal).unwrap_or(Decimal::ZERO),
                status: row.get("status").and_then(Value::as_int) == Some(1),
                options: state.count_where(&names.live(PRODUCT_OPTION_VALUE.name), "product_id", product_id),
                discounts: state.count_where(&names.live(PRODUCT_DISCOUNT.name), "product_id", product_id),
                specials: state.count_where(&names.live(PRODUCT_SPECIAL.name), "product_id", product_id),
            });
        }
        result.sort_by_key(|p| p.product_id);
        Ok(result)
    }

    fn settings(&mut self) -> &mut dyn SettingsStore {
        self
    }
}
