use std::{path::Path, sync::Arc};

use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use bgn2eur::backup::create_backups;
use bgn2eur::cleanup::drop_backups;
use bgn2eur::discovery::{Installation, InstallationProbe};
use bgn2eur::listing::list_products;
use bgn2eur::orchestrator::{Lifecycle, LifecycleState};
use bgn2eur::restore::restore_from_backups;
use bgn2eur::stats::collect_statistics;
use bgn2eur::{ConversionMode, ConvertError, TableNames, MONETARY_TABLES};
use bgn2eur_core::DbCredentials;
use bgn2eur_sqlite::SqliteConnector;

const SCHEMA: &str = "
    CREATE TABLE oc_product (
        product_id INTEGER PRIMARY KEY,
        model TEXT NOT NULL,
        price DECIMAL(15,4) NOT NULL DEFAULT 0,
        status INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX oc_product_model ON oc_product (model);
    CREATE TABLE oc_product_description (
        product_id INTEGER NOT NULL,
        language_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (product_id, language_id)
    );
    CREATE TABLE oc_product_option_value (
        product_option_value_id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        price DECIMAL(15,4) NOT NULL DEFAULT 0
    );
    CREATE TABLE oc_product_discount (
        product_discount_id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        price DECIMAL(15,4) NOT NULL DEFAULT 0
    );
    CREATE TABLE oc_product_special (
        product_special_id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        price DECIMAL(15,4) NOT NULL DEFAULT 0
    );
    CREATE TABLE oc_currency (
        currency_id INTEGER PRIMARY KEY,
        code TEXT NOT NULL,
        value DECIMAL(15,8) NOT NULL,
        status INTEGER NOT NULL
    );
    CREATE TABLE oc_language (
        language_id INTEGER PRIMARY KEY,
        status INTEGER NOT NULL
    );
    CREATE TABLE oc_setting (
        setting_id INTEGER PRIMARY KEY AUTOINCREMENT,
        store_id INTEGER NOT NULL DEFAULT 0,
        code TEXT NOT NULL,
        \"key\" TEXT NOT NULL,
        value TEXT NOT NULL,
        serialized INTEGER NOT NULL DEFAULT 0
    );

    INSERT INTO oc_product VALUES (1, 'CHAIR', 10.00, 1), (2, 'TABLE', 0, 1), (3, 'LAMP', 24.99, 0);
    INSERT INTO oc_product_description VALUES (1, 1, 'Chair'), (2, 1, 'Table'), (3, 1, 'Lamp');
    INSERT INTO oc_product_option_value VALUES (1, 1, 5), (2, 1, -2.5), (3, 3, 0);
    INSERT INTO oc_product_discount VALUES (1, 1, 9.00);
    INSERT INTO oc_product_special VALUES (1, 3, 19.99);
    INSERT INTO oc_currency VALUES (1, 'BGN', 1.0, 1), (2, 'EUR', 0.51129, 0);
    INSERT INTO oc_language VALUES (1, 1);
    INSERT INTO oc_setting (store_id, code, \"key\", value) VALUES (0, 'config', 'config_maintenance', '0');
";

struct SqliteProbe(SqliteConnector);

impl InstallationProbe for SqliteProbe {
    fn discover(&self) -> Result<Installation, ConvertError> {
        let credentials = DbCredentials {
            driver: "sqlite".to_string(),
            hostname: "localhost".to_string(),
            username: "shop".to_string(),
            password: String::new(),
            database: "opencart.db".to_string(),
            port: 0,
            prefix: "oc_".to_string(),
        };
        Ok(Installation::new(credentials, Arc::new(self.0.clone())))
    }
}

fn create_store(path: &Path) -> SqliteConnector {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    SqliteConnector::new(path.to_string_lossy().into_owned(), "oc_")
}

fn price(path: &Path, table: &str, id_column: &str, id: i64) -> Decimal {
    let conn = Connection::open(path).unwrap();
    let text: String = conn
        .query_row(
            &format!("SELECT CAST(price AS TEXT) FROM {} WHERE {} = ?1", table, id_column),
            [id],
            |r| r.get(0),
        )
        .unwrap();
    text.parse().unwrap()
}

fn setting(path: &Path, key: &str) -> Option<String> {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT value FROM oc_setting WHERE \"key\" = ?1", [key], |r| r.get(0))
        .ok()
}

fn table_exists(path: &Path, table: &str) -> bool {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

#[test]
fn test_full_lifecycle_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("opencart.db");
    let connector = create_store(&path);
    let names = TableNames::new("oc_");

    let backup = create_backups(&connector, &names, &MONETARY_TABLES).unwrap();
    assert_eq!(backup.rows_for("oc_backup_product"), Some(3));
    assert_eq!(backup.rows_for("oc_backup_product_option_value"), Some(3));

    let probe = SqliteProbe(connector.clone());
    let mut out: Vec<u8> = Vec::new();
    let report = Lifecycle::new(&probe, dec!(1.95583), &MONETARY_TABLES)
        .run(ConversionMode::Commit, &mut out)
        .unwrap();

    assert_eq!(report.state, LifecycleState::Committed);
    assert_eq!(report.missing_backups, Some(Vec::new()));
    assert_eq!(report.run.converted_in("oc_product"), Some(2));
    assert_eq!(report.run.converted_in("oc_product_option_value"), Some(2));
    assert_eq!(price(&path, "oc_product", "product_id", 1), dec!(5.11));
    assert_eq!(price(&path, "oc_product", "product_id", 3), dec!(12.78));
    assert_eq!(price(&path, "oc_product_option_value", "product_option_value_id", 2), dec!(-1.28));
    assert_eq!(setting(&path, "bgn_eur_converted").as_deref(), Some("1"));

    let list = list_products(&connector).unwrap();
    assert_eq!(list.products.len(), 3);
    assert_eq!(list.products[0].options, 2);
    assert!(collect_statistics(&connector, &names).unwrap().flag.is_converted());

    let restored = restore_from_backups(&connector, &names, &MONETARY_TABLES).unwrap();
    assert_eq!(restored.restored.len(), 4);
    assert_eq!(price(&path, "oc_product", "product_id", 1), dec!(10));
    assert_eq!(price(&path, "oc_product_special", "product_special_id", 1), dec!(19.99));
    assert_eq!(setting(&path, "bgn_eur_converted").as_deref(), Some("0"));
    assert!(!table_exists(&path, "oc_backup_product"));
    assert!(!table_exists(&path, "oc_old_product"));

    let cleanup = drop_backups(&connector, &names, &MONETARY_TABLES).unwrap();
    assert!(cleanup.dropped.is_empty());
}

#[test]
fn test_restore_requires_every_backup_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("opencart.db");
    let connector = create_store(&path);
    let names = TableNames::new("oc_");
    create_backups(&connector, &names, &MONETARY_TABLES).unwrap();
    Connection::open(&path)
        .unwrap()
        .execute_batch("DROP TABLE oc_backup_product_special;")
        .unwrap();

    let err = restore_from_backups(&connector, &names, &MONETARY_TABLES).unwrap_err();

    assert!(matches!(err, ConvertError::BackupMissing(ref t) if t == "oc_backup_product_special"));
    assert!(table_exists(&path, "oc_backup_product"));
    assert!(table_exists(&path, "oc_product"));
}
