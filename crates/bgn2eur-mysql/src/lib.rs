//! MySQL and MariaDB catalog backend, the engines OpenCart's `mysqli` and `mpdo` drivers use.

use std::str::FromStr;

use mysql::{prelude::Queryable, Conn, Opts, OptsBuilder};
use rust_decimal::Decimal;

use bgn2eur_core::{
    catalog::PRODUCT, CatalogBackend, Connector, CurrencyRecord, DbCredentials, MonetaryTable,
    PriceRow, ProductListing, SchemaMode, SettingsStore, StorageError, TableNames, SETTING_GROUP,
};

/// Opens a new MySQL session per call from discovered credentials.
#[derive(Clone)]
pub struct MysqlConnector {
    opts: Opts,
    names: TableNames,
}

impl MysqlConnector {
    pub fn new(credentials: &DbCredentials) -> Self {
        Self {
            opts: connection_opts(credentials),
            names: TableNames::new(credentials.prefix.clone()),
        }
    }
}

impl Connector for MysqlConnector {
    fn connect(&self) -> Result<Box<dyn CatalogBackend>, StorageError> {
        Ok(Box::new(MysqlCatalog::connect(self.opts.clone(), self.names.clone())?))
    }
}

pub fn connection_opts(credentials: &DbCredentials) -> Opts {
    OptsBuilder::new()
        .ip_or_hostname(Some(credentials.hostname.clone()))
        .tcp_port(credentials.port)
        .user(Some(credentials.username.clone()))
        .pass(Some(credentials.password.clone()))
        .db_name(Some(credentials.database.clone()))
        .into()
}

fn other(e: mysql::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn parse_decimal(column: &str, text: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(text).map_err(|_| StorageError::InvalidValue {
        column: column.to_string(),
        value: text.to_string(),
    })
}

pub struct MysqlCatalog {
    conn: Conn,
    names: TableNames,
}

impl MysqlCatalog {
    pub fn connect(opts: Opts, names: TableNames) -> Result<Self, StorageError> {
        let conn = Conn::new(opts)
            .map_err(|e| StorageError::Connection(format!("MySQL connection failed: {}", e)))?;
        tracing::debug!("MySQL connection opened");
        Ok(Self::from_conn(conn, names))
    }

    pub fn from_conn(conn: Conn, names: TableNames) -> Self {
        Self { conn, names }
    }

    fn count(&mut self, sql: &str) -> Result<u64, StorageError> {
        let count: Option<u64> = self.conn.query_first(sql).map_err(other)?;
        Ok(count.unwrap_or(0))
    }

    fn exists(&mut self, key: &str) -> Result<bool, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE `key` = ?",
            quote(&self.names.setting())
        );
        let count: Option<u64> = self.conn.exec_first(sql, (key,)).map_err(other)?;
        Ok(count.unwrap_or(0) > 0)
    }
}

impl SettingsStore for MysqlCatalog {
    fn get(&mut self, key: &str) -> Result<Option<String>, StorageError> {
        let sql = format!(
            "SELECT value FROM {} WHERE `key` = ? LIMIT 1",
            quote(&self.names.setting())
        );
        self.conn.exec_first(sql, (key,)).map_err(other)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.update(key, value)? {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO {} (store_id, code, `key`, value, serialized) VALUES (0, ?, ?, ?, 0)",
            quote(&self.names.setting())
        );
        self.conn
            .exec_drop(sql, (SETTING_GROUP, key, value))
            .map_err(other)
    }

    // Affected rows count only changed rows, so writing the current value reports 0.
    fn update(&mut self, key: &str, value: &str) -> Result<bool, StorageError> {
        if !self.exists(key)? {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE {} SET value = ? WHERE `key` = ?",
            quote(&self.names.setting())
        );
        self.conn.exec_drop(sql, (value, key)).map_err(other)?;
        Ok(true)
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {} WHERE `key` = ?", quote(&self.names.setting()));
        self.conn.exec_drop(sql, (key,)).map_err(other)?;
        Ok(self.conn.affected_rows() > 0)
    }
}

impl CatalogBackend for MysqlCatalog {
    fn table_exists(&mut self, table: &str) -> Result<bool, StorageError> {
        let count: Option<u64> = self
            .conn
            .exec_first(
                "SELECT COUNT(*) FROM information_schema.tables
                 WHERE table_schema = DATABASE() AND table_name = ?",
                (table,),
            )
            .map_err(other)?;
        Ok(count.unwrap_or(0) > 0)
    }

    fn clone_structure(&mut self, source: &str, target: &str) -> Result<(), StorageError> {
        if !self.table_exists(source)? {
            return Err(StorageError::TableNotFound(source.to_string()));
        }
        self.conn
            .query_drop(format!("CREATE TABLE {} LIKE {}", quote(target), quote(source)))
            .map_err(other)
    }

    fn copy_rows(&mut self, source: &str, target: &str) -> Result<u64, StorageError> {
        self.conn
            .query_drop(format!("INSERT INTO {} SELECT * FROM {}", quote(target), quote(source)))
            .map_err(other)?;
        Ok(self.conn.affected_rows())
    }

    fn count_rows(&mut self, table: &str) -> Result<u64, StorageError> {
        self.count(&format!("SELECT COUNT(*) FROM {}", quote(table)))
    }

    fn count_by_status(&mut self, table: &str, active: bool) -> Result<u64, StorageError> {
        self.count(&format!(
            "SELECT COUNT(*) FROM {} WHERE status = {}",
            quote(table),
            active as i32
        ))
    }

    fn rename_table(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        self.rename_tables(&[(from, to)])
    }

    fn renames_atomically(&self) -> bool {
        true
    }

    /// One `RENAME TABLE` statement; the server applies all pairs or none.
    fn rename_tables(&mut self, renames: &[(&str, &str)]) -> Result<(), StorageError> {
        let pairs: Vec<String> = renames
            .iter()
            .map(|(from, to)| format!("{} TO {}", quote(from), quote(to)))
            .collect();
        self.conn
            .query_drop(format!("RENAME TABLE {}", pairs.join(", ")))
            .map_err(other)
    }

    fn drop_table(&mut self, table: &str) -> Result<(), StorageError> {
        self.conn
            .query_drop(format!("DROP TABLE {}", quote(table)))
            .map_err(other)
    }

    fn select_prices(&mut self, qualified_name: &str, table: &MonetaryTable) -> Result<Vec<PriceRow>, StorageError> {
        let sql = format!(
            "SELECT {id}, CAST({price} AS CHAR) FROM {table} WHERE {price} {filter} ORDER BY {id}",
            id = quote(table.id_column),
            price = quote(table.price_column),
            table = quote(qualified_name),
            filter = table.filter.sql(),
        );
        let rows: Vec<(i64, String)> = self.conn.query(sql).map_err(other)?;
        rows.into_iter()
            .map(|(id, price)| {
                Ok(PriceRow {
                    id,
                    price: parse_decimal(table.price_column, &price)?,
                })
            })
            .collect()
    }

    fn update_price(&mut self, qualified_name: &str, table: &MonetaryTable, id: i64, price: Decimal) -> Result<(), StorageError> {
        let sql = format!(
            "UPDATE {} SET {} = CAST(? AS DECIMAL(15,4)) WHERE {} = ?",
            quote(qualified_name),
            quote(table.price_column),
            quote(table.id_column)
        );
        self.conn
            .exec_drop(sql, (price.to_string(), id))
            .map_err(other)
    }

    fn relax_schema_mode(&mut self) -> Result<SchemaMode, StorageError> {
        let previous: Option<String> = self
            .conn
            .query_first("SELECT @@SESSION.sql_mode")
            .map_err(other)?;
        self.conn
            .query_drop("SET SESSION sql_mode = ''")
            .map_err(other)?;
        Ok(SchemaMode(previous.unwrap_or_default()))
    }

    fn restore_schema_mode(&mut self, previous: &SchemaMode) -> Result<(), StorageError> {
        self.conn
            .exec_drop("SET SESSION sql_mode = ?", (previous.0.as_str(),))
            .map_err(other)
    }

    fn currency(&mut self, code: &str) -> Result<Option<CurrencyRecord>, StorageError> {
        let sql = format!(
            "SELECT CAST(value AS CHAR), status FROM {} WHERE code = ?",
            quote(&self.names.currency())
        );
        let row: Option<(String, i64)> = self.conn.exec_first(sql, (code,)).map_err(other)?;
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
        self.conn.query_first(sql).map_err(other)
    }

    fn product_listing(&mut self, language_id: i64) -> Result<Vec<ProductListing>, StorageError> {
        let related = |table: &str| {
            format!(
                "(SELECT COUNT(*) FROM {} r WHERE r.product_id = p.product_id)",
                quote(&self.names.live(table))
            )
        };
        let sql = format!(
            "SELECT p.product_id, p.model, CAST(p.price AS CHAR), p.status, pd.name, {}, {}, {}
             FROM {} p
             JOIN {} pd ON pd.product_id = p.product_id
             WHERE pd.language_id = ?
             ORDER BY p.product_id",
            related("product_option_value"),
            related("product_discount"),
            related("product_special"),
            quote(&self.names.live(PRODUCT.name)),
            quote(&self.names.product_description())
        );
        let rows: Vec<(i64, String, String, i64, String, u64, u64, u64)> =
            self.conn.exec(sql, (language_id,)).map_err(other)?;

        let mut result = Vec::with_capacity(rows.len());
        for (product_id, model, price, status, name, options, discounts, specials) in rows {
            result.push(ProductListing {
                product_id,
                model,
                name,
                price: parse_decimal("price", &price)?,
                status: status == 1,
                options,
                discounts,
                specials,
            });
        }
        Ok(result)
    }

    fn settings(&mut self) -> &mut dyn SettingsStore {
        self
    }
}
