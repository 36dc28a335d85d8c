//! PostgreSQL catalog backend.

use std::str::FromStr;

use postgres::{Client, NoTls};
use rust_decimal::Decimal;

use bgn2eur_core::{
    catalog::PRODUCT, CatalogBackend, Connector, CurrencyRecord, DbCredentials, MonetaryTable,
    PriceRow, ProductListing, SchemaMode, SettingsStore, StorageError, TableNames, SETTING_GROUP,
};

/// Opens a new PostgreSQL session per call from discovered credentials.
#[derive(Clone)]
pub struct PostgresConnector {
    connection_string: String,
    names: TableNames,
}

impl PostgresConnector {
    pub fn new(credentials: &DbCredentials) -> Self {
        Self {
            connection_string: connection_string(credentials),
            names: TableNames::new(credentials.prefix.clone()),
        }
    }
}

impl Connector for PostgresConnector {
    fn connect(&self) -> Result<Box<dyn CatalogBackend>, StorageError> {
        Ok(Box::new(PostgresCatalog::connect(&self.connection_string, self.names.clone())?))
    }
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Key/value connection string; values are quoted so passwords may contain spaces.
pub fn connection_string(credentials: &DbCredentials) -> String {
    format!(
        "host={} port={} user={} password={} dbname={}",
        quote_value(&credentials.hostname),
        credentials.port,
        quote_value(&credentials.username),
        quote_value(&credentials.password),
        quote_value(&credentials.database)
    )
}

/// Server message with SQLSTATE, detail and hint; `postgres::Error` alone only says "db error".
fn describe(e: &postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut text = format!("{} (SQLSTATE {})", db.message(), db.code().code());
        if let Some(detail) = db.detail() {
            text.push_str("; detail: ");
            text.push_str(detail);
        }
        if let Some(hint) = db.hint() {
            text.push_str("; hint: ");
            text.push_str(hint);
        }
        return text;
    }
    let mut text = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn other(e: postgres::Error) -> StorageError {
    StorageError::Other(describe(&e))
}

/// Sequences owned by a table in the current schema: `a` for SERIAL, `i` for identity columns.
const OWNED_SEQUENCES: &str = "
    SELECT s.relname::TEXT, a.attname::TEXT, d.deptype::TEXT
    FROM pg_depend d
    JOIN pg_class s ON s.oid = d.objid AND s.relkind = 'S'
    JOIN pg_class t ON t.oid = d.refobjid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = d.refobjsubid
    WHERE d.classid = 'pg_class'::regclass
      AND d.refclassid = 'pg_class'::regclass
      AND d.deptype IN ('a', 'i')
      AND n.nspname = current_schema()
      AND t.relname::TEXT = $1
    ORDER BY a.attnum";

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn parse_decimal(column: &str, text: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(text).map_err(|_| StorageError::InvalidValue {
        column: column.to_string(),
        value: text.to_string(),
    })
}

pub struct PostgresCatalog {
    client: Client,
    names: TableNames,
}

impl PostgresCatalog {
    pub fn connect(connection_string: &str, names: TableNames) -> Result<Self, StorageError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Connection(format!("PostgreSQL connection failed: {}", describe(&e))))?;
        tracing::debug!("PostgreSQL connection opened");
        Ok(Self::from_client(client, names))
    }

    /// Wraps a session the caller already configured, e.g. with a `search_path` or role.
    pub fn from_client(client: Client, names: TableNames) -> Self {
        Self { client, names }
    }

    fn count(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Result<u64, StorageError> {
        let row = self.client.query_one(sql, params).map_err(other)?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

impl SettingsStore for PostgresCatalog {
    fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        let sql = format!(
            "SELECT value FROM {} WHERE \"key\" = $1 LIMIT 1",
            quote(&self.names.setting())
        );
        let row = self.client.query_opt(&sql, &[&key]).map_err(other)?;
        Ok(row.map(|r| r.get(0)))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.update(key, value)? {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO {} (store_id, code, \"key\", value, serialized) VALUES (0, $1, $2, $3, 0)",
            quote(&self.names.setting())
        );
        self.client
            .execute(&sql, &[&SETTING_GROUP, &key, &value])
            .map_err(other)?;
        Ok(())
    }

    fn update(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        let sql = format!(
            "UPDATE {} SET value = $1 WHERE \"key\" = $2",
            quote(&self.names.setting())
        );
        let changed = self.client.execute(&sql, &[&value, &key]).map_err(other)?;
        Ok(changed > 0)
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {} WHERE \"key\" = $1", quote(&self.names.setting()));
        let changed = self.client.execute(&sql, &[&key]).map_err(other)?;
        Ok(changed > 0)
    }
}

impl CatalogBackend for PostgresCatalog {
    fn table_exists(&mut self, table: &str) -> Result<bool, StorageError> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&table],
            )
            .map_err(other)?;
        Ok(row.get(0))
    }

    fn clone_structure(&mut self, source: &str, target: &str) -> Result<(), StorageError> {
        if !self.table_exists(source)? {
            return Err(StorageError::TableNotFound(source.to_string()));
        }
        let sql = format!(
            "CREATE TABLE {} (LIKE {} INCLUDING ALL)",
            quote(target),
            quote(source)
        );
        self.client.batch_execute(&sql).map_err(other)
    }

    fn copy_rows(&mut self, source: &str, target: &str) -> Result<u64, StorageError> {
        // Identity columns declared GENERATED ALWAYS reject explicit values otherwise.
        let sql = format!(
            "INSERT INTO {} OVERRIDING SYSTEM VALUE SELECT * FROM {}",
            quote(target),
            quote(source)
        );
        self.client.execute(&sql, &[]).map_err(other)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64, StorageError> {
        self.count(&format!("SELECT COUNT(*) FROM {}", quote(table)), &[])
    }

    fn count_by_status(&mut self, table: &str, active: bool) -> Result<u64, StorageError> {
        let status: i32 = active as i32;
        self.count(
            &format!("SELECT COUNT(*) FROM {} WHERE status = $1::INTEGER", quote(table)),
            &[&status],
        )
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let sql = format!("ALTER TABLE {} RENAME TO {}", quote(from), quote(to));
        self.client.batch_execute(&sql).map_err(other)
    }

    fn renames_atomically(&self) -> bool {
        true
    }

    fn rename_tables(&mut self, renames: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut tx = self.client.transaction().map_err(other)?;
        for (from, to) in renames {
            tx.batch_execute(&format!("ALTER TABLE {} RENAME TO {}", quote(from), quote(to)))
                .map_err(other)?;
        }
        tx.commit().map_err(other)
    }

    /// `CREATE TABLE .. (LIKE ..)` keeps SERIAL defaults pointing at the original
    /// sequence, which stays owned by the table being retired. Ownership moves to
    /// the restored table so the old one can be dropped. Identity columns get
    /// their own sequence, which is moved forward to where the old one was.
    fn adopt_dependents(&mut self, previous: &str, current: &str) -> Result<(), StorageError> {
        let owned = self.client.query(OWNED_SEQUENCES, &[&previous]).map_err(other)?;
        for row in owned {
            let sequence: String = row.get(0);
            let column: String = row.get(1);
            let kind: String = row.get(2);
            if kind == "a" {
                let sql = format!(
                    "ALTER SEQUENCE {} OWNED BY {}.{}",
                    quote(&sequence),
                    quote(current),
                    quote(&column)
                );
                self.client.batch_execute(&sql).map_err(other)?;
                tracing::debug!(sequence = %sequence, table = current, column = %column, "Sequence ownership moved");
            } else {
                let state = self
                    .client
                    .query_one(format!("SELECT last_value, is_called FROM {}", quote(&sequence)).as_str(), &[])
                    .map_err(other)?;
                let last_value: i64 = state.get(0);
                let is_called: bool = state.get(1);
                self.client
                    .execute(
                        "SELECT setval(pg_get_serial_sequence($1, $2), $3, $4)",
                        &[&quote(current), &column, &last_value, &is_called],
                    )
                    .map_err(other)?;
                tracing::debug!(table = current, column = %column, last_value, "Identity sequence carried over");
            }
        }
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), StorageError> {
        self.client
            .batch_execute(&format!("DROP TABLE {}", quote(table)))
            .map_err(other)
    }

    fn select_prices(&mut self, qualified_name: &str, table: &MonetaryTable) -> Result<Vec<PriceRow>, StorageError> {
        let sql = format!(
            "SELECT {id}::BIGINT, {price}::TEXT FROM {table} WHERE {price} {filter} ORDER BY {id}",
            id = quote(table.id_column),
            price = quote(table.price_column),
            table = quote(qualified_name),
            filter = table.filter.sql(),
        );
        let rows = self.client.query(&sql, &[]).map_err(other)?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let price: String = row.get(1);
            result.push(PriceRow {
                id: row.get(0),
                price: parse_decimal(table.price_column, &price)?,
            });
        }
        Ok(result)
    }

    fn update_price(&mut self, qualified_name: &str, table: &MonetaryTable, id: i64, price: Decimal) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE {} SET {} = $1::TEXT::NUMERIC WHERE {} = $2::BIGINT",
            quote(qualified_name),
            quote(table.price_column),
            quote(table.id_column)
        );
        self.client
            .execute(&sql, &[&price.to_string(), &id])
            .map_err(other)?;
        Ok(())
    }

    fn relax_schema_mode(&mut self) -> Result<SchemaMode, StorageError> {
        let row = self
            .client
            .query_one("SHOW session_replication_role", &[])
            .map_err(other)?;
        let previous: String = row.get(0);
        self.client
            .batch_execute("SET session_replication_role = replica")
            .map_err(other)?;
        Ok(SchemaMode(previous))
    }

    fn restore_schema_mode(&mut self, previous: &SchemaMode) -> Result<(), StorageError> {
        let role = match previous.0.as_str() {
            "origin" | "replica" | "local" => previous.0.as_str(),
            unknown => {
                return Err(StorageError::InvalidValue {
                    column: "session_replication_role".to_string(),
                    value: unknown.to_string(),
                })
            }
        };
        self.client
            .batch_execute(&format!("SET session_replication_role = {}", role))
            .map_err(other)
    }

    fn currency(&mut self, code: &str) -> Result<Option<CurrencyRecord>, StorageError> {
        let sql = format!(
            "SELECT value::TEXT, status::INTEGER FROM {} WHERE code = $1",
            quote(&self.names.currency())
        );
        let row = self.client.query_opt(&sql, &[&code]).map_err(other)?;
        match row {
            Some(row) => {
                let value: String = row.get(0);
                let status: i32 = row.get(1);
                Ok(Some(CurrencyRecord {
                    code: code.to_string(),
                    value: parse_decimal("value", &value)?,
                    status: status == 1,
                }))
            }
            None => Ok(None),
        }
    }

    fn active_language(&mut self) -> Result<Option<i64>, StorageError> {
        let sql = format!(
            "SELECT language_id::BIGINT FROM {} WHERE status = 1 ORDER BY language_id LIMIT 1",
            quote(&self.names.language())
        );
        let row = self.client.query_opt(&sql, &[]).map_err(other)?;
        Ok(row.map(|r| r.get(0)))
    }

    fn product_listing(&mut self, language_id: i64) -> Result<Vec<ProductListing>, StorageError> {
        let related = |table: &str| {
            format!(
                "(SELECT COUNT(*) FROM {} r WHERE r.product_id = p.product_id)",
                quote(&self.names.live(table))
            )
        };
        let sql = format!(
            "SELECT p.product_id::BIGINT, p.model, p.price::TEXT, p.status::INTEGER, pd.name,
                    {}, {}, {}
             FROM {} p
             JOIN {} pd ON pd.product_id = p.product_id
             WHERE pd.language_id = $1::BIGINT
             ORDER BY p.product_id",
            related("product_option_value"),
            related("product_discount"),
            related("product_special"),
            quote(&self.names.live(PRODUCT.name)),
            quote(&self.names.product_description())
        );
        let rows = self.client.query(&sql, &[&language_id]).map_err(other)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let price: String = row.get(2);
            let status: i32 = row.get(3);
            let options: i64 = row.get(5);
            let discounts: i64 = row.get(6);
            let specials: i64 = row.get(7);
            result.push(ProductListing {
                product_id: row.get(0),
                model: row.get(1),
                name: row.get(4),
                price: parse_decimal("price", &price)?,
                status: status == 1,
                options: options as u64,
                discounts: discounts as u64,
                specials: specials as u64,
            });
        }
        Ok(result)
    }

    fn settings(&mut self) -> &mut dyn SettingsStore {
        self
    }
}
