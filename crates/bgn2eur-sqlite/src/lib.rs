//! SQLite catalog backend.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use bgn2eur_core::{
    catalog::PRODUCT, CatalogBackend, Connector, CurrencyRecord, MonetaryTable, PriceRow,
    ProductListing, SchemaMode, SettingsStore, StorageError, TableNames, SETTING_GROUP,
};

/// Opens a new SQLite connection to the same database file on every call.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: String,
    names: TableNames,
}

impl SqliteConnector {
    pub fn new(path: impl Into<String>, prefix: &str) -> Self {
        Self {
            path: path.into(),
            names: TableNames::new(prefix),
        }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn CatalogBackend>, StorageError> {
        Ok(Box::new(SqliteCatalog::open(&self.path, self.names.clone())?))
    }
}

pub struct SqliteCatalog {
    conn: Connection,
    names: TableNames,
}

fn other(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn parse_decimal(column: &str, text: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| StorageError::InvalidValue {
            column: column.to_string(),
            value: text.to_string(),
        })
}

/// An index created with `CREATE INDEX` on a table being cloned.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexDefinition {
    name: String,
    unique: bool,
    /// Quoted key columns with their collation and sort order.
    columns: Vec<String>,
}

/// Reads index definitions from `pragma_index_list` and `pragma_index_xinfo`
/// instead of parsing the stored DDL.
fn index_definitions(conn: &Connection, table: &str) -> Result<Vec<IndexDefinition>, StorageError> {
    let listed: Vec<(String, bool, bool)> = {
        let mut stmt = conn
            .prepare("SELECT name, \"unique\", partial FROM pragma_index_list(?1) WHERE origin = 'c' ORDER BY name")
            .map_err(other)?;
        let rows = stmt
            .query_map(params![table], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .map_err(other)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(other)?
    };

    let mut definitions = Vec::with_capacity(listed.len());
    for (name, unique, partial) in listed {
        if partial {
            return Err(StorageError::Other(format!(
                "partial index {} on {} cannot be cloned",
                name, table
            )));
        }
        let keys: Vec<(Option<String>, bool, Option<String>)> = {
            let mut stmt = conn
                .prepare("SELECT name, \"desc\", coll FROM pragma_index_xinfo(?1) WHERE key = 1 ORDER BY seqno")
                .map_err(other)?;
            let rows = stmt
                .query_map(params![name], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .map_err(other)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(other)?
        };

        let mut columns = Vec::with_capacity(keys.len());
        for (column, descending, collation) in keys {
            let column = column.ok_or_else(|| {
                StorageError::Other(format!("expression index {} on {} cannot be cloned", name, table))
            })?;
            let mut term = quote(&column);
            if let Some(collation) = collation.filter(|c| !c.eq_ignore_ascii_case("BINARY")) {
                term.push_str(" COLLATE ");
                term.push_str(&collation);
            }
            if descending {
                term.push_str(" DESC");
            }
            columns.push(term);
        }
        definitions.push(IndexDefinition { name, unique, columns });
    }
    Ok(definitions)
}

/// Drops a trailing `__<n>` added to dodge a name collision.
fn strip_marker(stem: &str) -> &str {
    match stem.rsplit_once("__") {
        Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => stem,
    }
}

/// Name for an index cloned onto `target`.
///
/// Indexes keep their names across `ALTER TABLE .. RENAME`, so a restored table
/// carries its backup's index names. Either table prefix is replaced rather than
/// stacked, keeping names bounded over repeated backup and restore cycles.
fn cloned_index_name(
    index: &str,
    source: &str,
    target: &str,
    taken: impl Fn(&str) -> Result<bool, StorageError>,
) -> Result<String, StorageError> {
    let (longer, shorter) = if target.len() >= source.len() {
        (target, source)
    } else {
        (source, target)
    };
    let stem = index
        .strip_prefix(longer)
        .or_else(|| index.strip_prefix(shorter))
        .map(str::to_string)
        .unwrap_or_else(|| format!("_{}", index));
    let candidate = format!("{}{}", target, strip_marker(&stem));
    if !taken(&candidate)? {
        return Ok(candidate);
    }
    let mut n = 1;
    loop {
        let numbered = format!("{}__{}", candidate, n);
        if !taken(&numbered)? {
            return Ok(numbered);
        }
        n += 1;
    }
}

fn name_taken(conn: &Connection, name: &str) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = ?1",
        params![name],
        |r| r.get(0),
    )
    .map_err(other)
}

impl SqliteCatalog {
    pub fn open(path: &str, names: TableNames) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path, "SQLite connection opened");

        Ok(Self { conn, names })
    }

    pub fn from_connection(conn: Connection, names: TableNames) -> Self {
        Self { conn, names }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn pragma(&self, name: &str) -> Result<i64, StorageError> {
        self.conn
            .query_row(&format!("PRAGMA {}", name), [], |r| r.get(0))
            .map_err(other)
    }

    fn count_related(&self, table: &str, product_id: i64) -> Result<u64, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE product_id = ?1",
            quote(&self.names.live(table))
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![product_id], |r| r.get(0))
            .map_err(other)?;
        Ok(count as u64)
    }
}

impl SettingsStore for SqliteCatalog {
    fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        let sql = format!(
            "SELECT value FROM {} WHERE \"key\" = ?1 LIMIT 1",
            quote(&self.names.setting())
        );
        self.conn
            .query_row(&sql, params![key], |r| r.get(0))
            .optional()
            .map_err(other)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.update(key, value)? {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO {} (store_id, code, \"key\", value, serialized) VALUES (0, ?1, ?2, ?3, 0)",
            quote(&self.names.setting())
        );
        self.conn
            .execute(&sql, params![SETTING_GROUP, key, value])
            .map_err(other)?;
        Ok(())
    }

    fn update(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        let sql = format!(
            "UPDATE {} SET value = ?1 WHERE \"key\" = ?2",
            quote(&self.names.setting())
        );
        let changed = self.conn.execute(&sql, params![value, key]).map_err(other)?;
        Ok(changed > 0)
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {} WHERE \"key\" = ?1", quote(&self.names.setting()));
        let changed = self.conn.execute(&sql, params![key]).map_err(other)?;
        Ok(changed > 0)
    }
}

impl CatalogBackend for SqliteCatalog {
    fn table_exists(&mut self, table: &str) -> Result<bool, StorageError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |r| r.get(0),
            )
            .map_err(other)
    }

    fn clone_structure(&mut self, source: &str, target: &str) -> Result<(), StorageError> {
        let create: String = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![source],
                |r| r.get(0),
            )
            .optional()
            .map_err(other)?
            .ok_or_else(|| StorageError::TableNotFound(source.to_string()))?;
        let columns = create
            .find('(')
            .map(|i| &create[i..])
            .ok_or_else(|| StorageError::Other(format!("unparseable definition of {}", source)))?;

        let indexes = index_definitions(&self.conn, source)?;

        // SQLite DDL is transactional, so the table and its indexes appear together or not at all.
        let tx = self.conn.transaction().map_err(other)?;
        tx.execute_batch(&format!("CREATE TABLE {} {}", quote(target), columns))
            .map_err(other)?;
        for index in &indexes {
            let name = cloned_index_name(&index.name, source, target, |n| name_taken(&tx, n))?;
            let statement = format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                quote(&name),
                quote(target),
                index.columns.join(", ")
            );
            tracing::debug!(%statement, "Cloning index");
            tx.execute_batch(&statement).map_err(other)?;
        }
        tx.commit().map_err(other)?;
        Ok(())
    }

    fn copy_rows(&mut self, source: &str, target: &str) -> Result<u64, StorageError> {
        let sql = format!("INSERT INTO {} SELECT * FROM {}", quote(target), quote(source));
        let copied = self.conn.execute(&sql, []).map_err(other)?;
        Ok(copied as u64)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |r| r.get(0))
            .map_err(other)?;
        Ok(count as u64)
    }

    fn count_by_status(&mut self, table: &str, active: bool) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE status = ?1", quote(table)),
                params![active as i64],
                |r| r.get(0),
            )
            .map_err(other)?;
        Ok(count as u64)
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let sql = format!("ALTER TABLE {} RENAME TO {}", quote(from), quote(to));
        self.conn.execute_batch(&sql).map_err(other)
    }

    fn renames_atomically(&self) -> bool {
        true
    }

    fn rename_tables(&mut self, renames: &[(&str, &str)]) -> Result<(), StorageError> {
        let tx = self.conn.transaction().map_err(other)?;
        for (from, to) in renames {
            tx.execute_batch(&format!("ALTER TABLE {} RENAME TO {}", quote(from), quote(to)))
                .map_err(other)?;
        }
        tx.commit().map_err(other)
    }

    fn drop_table(&mut self, table: &str) -> Result<(), StorageError> {
        self.conn
            .execute_batch(&format!("DROP TABLE {}", quote(table)))
            .map_err(other)
    }

    fn select_prices(&mut self, qualified_name: &str, table: &MonetaryTable) -> Result<Vec<PriceRow>, StorageError> {
        let sql = format!(
            "SELECT {id}, CAST({price} AS TEXT) FROM {table} WHERE {price} {filter} ORDER BY {id}",
            id = quote(table.id_column),
            price = quote(table.price_column),
            table = quote(qualified_name),
            filter = table.filter.sql(),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(other)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))
            .map_err(other)?;

        let mut result = Vec::new();
        for row in rows {
            let (id, price) = row.map_err(other)?;
            result.push(PriceRow {
                id,
                price: parse_decimal(table.price_column, &price)?,
            });
        }
        Ok(result)
    }

    fn update_price(&mut self, qualified_name: &str, table: &MonetaryTable, id: i64, price: Decimal) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote(qualified_name),
            quote(table.price_column),
            quote(table.id_column)
        );
        self.conn
            .execute(&sql, params![price.to_string(), id])
            .map_err(other)?;
        Ok(())
    }

    fn relax_schema_mode(&mut self) -> Result<SchemaMode, StorageError> {
        let checks = self.pragma("ignore_check_constraints")?;
        let foreign_keys = self.pragma("foreign_keys")?;
        self.conn
            .execute_batch("PRAGMA ignore_check_constraints = ON; PRAGMA foreign_keys = OFF;")
            .map_err(other)?;
        Ok(SchemaMode(format!("{},{}", checks, foreign_keys)))
    }

    fn restore_schema_mode(&mut self, previous: &SchemaMode) -> Result<(), StorageError> {
        let invalid = || StorageError::InvalidValue {
            column: "schema mode".to_string(),
            value: previous.0.clone(),
        };
        let (checks, foreign_keys) = previous.0.split_once(',').ok_or_else(invalid)?;
        let checks: i64 = checks.parse().map_err(|_| invalid())?;
        let foreign_keys: i64 = foreign_keys.parse().map_err(|_| invalid())?;
        self.conn
            .execute_batch(&format!(
                "PRAGMA ignore_check_constraints = {}; PRAGMA foreign_keys = {};",
                checks, foreign_keys
            ))
            .map_err(other)
    }

    fn currency(&mut self, code: &str) -> Result<Option<CurrencyRecord>, StorageError> {
        let sql = format!(
            "SELECT CAST(value AS TEXT), status FROM {} WHERE code = ?1",
            quote(&self.names.currency())
        );
        let row: Option<(String, i64)> = self
            .conn
            .query_row(&sql, params![code], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()
            .map_err(other)?;
        match row {
            Some((value, status)) => Ok(Some(CurrencyRecord {
                code: code.to_string(),
                value: parse_decimal("value", &value)?,
                status: status == 1,
            })),
            None => Ok(None),
        }
    }

    fn active_language(&mut self) -> Result<Option<i64>, StorageError> {
        let sql = format!(
            "SELECT language_id FROM {} WHERE status = 1 ORDER BY language_id LIMIT 1",
            quote(&self.names.language())
        );
        self.conn
            .query_row(&sql, [], |r| r.get(0))
            .optional()
            .map_err(other)
    }

    fn product_listing(&mut self, language_id: i64) -> Result<Vec<ProductListing>, StorageError> {
        let sql = format!(
            "SELECT p.product_id, p.model, CAST(p.price AS TEXT), p.status, pd.name
             FROM {} p
             JOIN {} pd ON pd.product_id = p.product_id
             WHERE pd.language_id = ?1
             ORDER BY p.product_id",
            quote(&self.names.live(PRODUCT.name)),
            quote(&self.names.product_description())
        );
        let rows: Vec<(i64, String, String, i64, String)> = {
            let mut stmt = self.conn.prepare(&sql).map_err(other)?;
            let rows = stmt
                .query_map(params![language_id], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
                })
                .map_err(other)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(other)?
        };

        let mut result = Vec::with_capacity(rows.len());
        for (product_id, model, price, status, name) in rows {
            result.push(ProductListing {
                product_id,
                model,
                name,
                price: parse_decimal("price", &price)?,
                status: status == 1,
                options: self.count_related("product_option_value", product_id)?,
                discounts: self.count_related("product_discount", product_id)?,
                specials: self.count_related("product_special", product_id)?,
            });
        }
        Ok(result)
    }

    fn settings(&mut self) -> &mut dyn SettingsStore {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgn2eur_core::catalog::PRODUCT_OPTION_VALUE;
    use rust_decimal_macros::dec;

    fn catalog() -> SqliteCatalog {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE oc_product (
                product_id INTEGER PRIMARY KEY,
                model TEXT NOT NULL,
                price DECIMAL(15,4) NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX oc_product_model ON oc_product (model);

            CREATE TABLE oc_product_option_value (
                product_option_value_id INTEGER PRIMARY KEY,
                product_id INTEGER NOT NULL,
                price DECIMAL(15,4) NOT NULL DEFAULT 0
            );

            CREATE TABLE oc_setting (
                setting_id INTEGER PRIMARY KEY AUTOINCREMENT,
                store_id INTEGER NOT NULL DEFAULT 0,
                code TEXT NOT NULL,
                \"key\" TEXT NOT NULL,
                value TEXT NOT NULL,
                serialized INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO oc_product VALUES (1, 'CHAIR', 10.00, 1), (2, 'TABLE', 0, 0), (3, 'LAMP', 24.99, 1);
            INSERT INTO oc_product_option_value VALUES (1, 1, 5), (2, 1, -2.5), (3, 3, 0);
            ",
        )
        .unwrap();
        SqliteCatalog::from_connection(conn, TableNames::new("oc_"))
    }

    #[test]
    fn test_clone_structure_copies_columns_and_indexes() {
        let mut db = catalog();
        db.clone_structure("oc_product", "oc_backup_product").unwrap();
        assert!(db.table_exists("oc_backup_product").unwrap());
        assert_eq!(db.count_rows("oc_backup_product").unwrap(), 0);

        let index_count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'oc_backup_product'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 1);

        assert_eq!(db.copy_rows("oc_product", "oc_backup_product").unwrap(), 3);
        assert_eq!(db.count_rows("oc_backup_product").unwrap(), 3);
    }

    #[test]
    fn test_clone_of_missing_table_fails() {
        let mut db = catalog();
        let result = db.clone_structure("oc_missing", "oc_backup_missing");
        assert!(matches!(result, Err(StorageError::TableNotFound(_))));
        assert!(!db.table_exists("oc_backup_missing").unwrap());
    }

    #[test]
    fn test_rename_and_drop() {
        let mut db = catalog();
        db.rename_table("oc_product", "oc_old_product").unwrap();
        assert!(!db.table_exists("oc_product").unwrap());
        assert!(db.table_exists("oc_old_product").unwrap());
        db.drop_table("oc_old_product").unwrap();
        assert!(!db.table_exists("oc_old_product").unwrap());
    }

    #[test]
    fn test_select_and_update_prices() {
        let mut db = catalog();
        let rows = db.select_prices("oc_product", &PRODUCT).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(rows[0].price, dec!(10));

        let options = db
            .select_prices("oc_product_option_value", &PRODUCT_OPTION_VALUE)
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].price, dec!(-2.5));

        db.update_price("oc_product", &PRODUCT, 1, dec!(5.11)).unwrap();
        let rows = db.select_prices("oc_product", &PRODUCT).unwrap();
        assert_eq!(rows[0].price, dec!(5.11));
    }

    #[test]
    fn test_schema_mode_round_trip() {
        let mut db = catalog();
        let previous = db.relax_schema_mode().unwrap();
        assert_eq!(db.pragma("foreign_keys").unwrap(), 0);
        assert_eq!(db.pragma("ignore_check_constraints").unwrap(), 1);
        db.restore_schema_mode(&previous).unwrap();
        assert_eq!(db.pragma("foreign_keys").unwrap(), 1);
        assert_eq!(db.pragma("ignore_check_constraints").unwrap(), 0);
    }

    #[test]
    fn test_settings() {
        let mut db = catalog();
        assert_eq!(db.get("bgn_eur_converted").unwrap(), None);
        db.put("bgn_eur_converted", "1").unwrap();
        assert_eq!(db.get("bgn_eur_converted").unwrap().as_deref(), Some("1"));
        db.put("bgn_eur_converted", "0").unwrap();
        assert_eq!(db.get("bgn_eur_converted").unwrap().as_deref(), Some("0"));
        assert!(db.delete("bgn_eur_converted").unwrap());
        assert!(!db.delete("bgn_eur_converted").unwrap());
        assert!(!db.update("config_maintenance", "1").unwrap());
    }

    fn index_names(db: &SqliteCatalog, table: &str) -> Vec<String> {
        let mut stmt = db
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name")
            .unwrap();
        let rows = stmt.query_map(params![table], |r| r.get(0)).unwrap();
        rows.collect::<Result<Vec<String>, _>>().unwrap()
    }

    fn swap_back(db: &mut SqliteCatalog) {
        db.rename_tables(&[("oc_product", "oc_old_product"), ("oc_backup_product", "oc_product")])
            .unwrap();
        db.drop_table("oc_old_product").unwrap();
    }

    #[test]
    fn test_clone_multiline_index_keeps_order_and_collation() {
        let mut db = catalog();
        db.connection()
            .execute_batch(
                "CREATE UNIQUE INDEX oc_product_model_status
                    ON oc_product
                    (model COLLATE NOCASE DESC, status)",
            )
            .unwrap();

        db.clone_structure("oc_product", "oc_backup_product").unwrap();

        let sql: String = db
            .connection()
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = 'oc_backup_product_model_status'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX \"oc_backup_product_model_status\" ON \"oc_backup_product\" (\"model\" COLLATE NOCASE DESC, \"status\")"
        );
    }

    #[test]
    fn test_expression_index_is_reported() {
        let mut db = catalog();
        db.connection()
            .execute_batch("CREATE INDEX oc_product_lower_model ON oc_product (lower(model))")
            .unwrap();

        let err = db.clone_structure("oc_product", "oc_backup_product").unwrap_err();

        assert!(err.to_string().contains("expression index oc_product_lower_model"));
        assert!(!db.table_exists("oc_backup_product").unwrap());
    }

    #[test]
    fn test_index_names_stay_bounded_across_cycles() {
        let mut db = catalog();
        for _ in 0..4 {
            db.clone_structure("oc_product", "oc_backup_product").unwrap();
            db.copy_rows("oc_product", "oc_backup_product").unwrap();
            swap_back(&mut db);
            let names = index_names(&db, "oc_product");
            assert_eq!(names.len(), 1);
            assert!(
                names[0] == "oc_backup_product_model" || names[0] == "oc_backup_product_model__1",
                "{:?}",
                names
            );
        }
        // A backup taken now does not collide with the live table's index.
        db.clone_structure("oc_product", "oc_backup_product").unwrap();
        assert_eq!(index_names(&db, "oc_backup_product").len(), 1);
    }

    #[test]
    fn test_cloned_index_name() {
        let free = |_: &str| Ok(false);
        assert_eq!(
            cloned_index_name("oc_product_model", "oc_product", "oc_backup_product", free).unwrap(),
            "oc_backup_product_model"
        );
        assert_eq!(
            cloned_index_name("oc_backup_product_model__3", "oc_product", "oc_backup_product", free).unwrap(),
            "oc_backup_product_model"
        );
        assert_eq!(
            cloned_index_name("idx_model", "oc_product", "oc_backup_product", free).unwrap(),
            "oc_backup_product_idx_model"
        );
        let first_taken = |n: &str| Ok(n == "oc_backup_product_model");
        assert_eq!(
            cloned_index_name("oc_backup_product_model", "oc_product", "oc_backup_product", first_taken).unwrap(),
            "oc_backup_product_model__1"
        );
    }
}
