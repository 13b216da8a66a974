//! Product upsert store.
//!
//! Products live in a single SQLite table keyed by their normalized `code`.
//! Each record of a batch is written in its own transaction, so one bad
//! record rolls back alone while its batch-mates stay committed.
//!
//! # Post-commit notification
//!
//! When a sender is attached, every batch that stored at least one product is
//! published on the channel as a [`StoredBatch`] after its records commit.
//! The search indexer consumes that channel; nothing it does can change what
//! [`ProductStore::store_batch`] returns. On a bounded channel the send waits
//! for room once the batch has committed and the connection is unlocked, so a
//! slow indexer slows the import instead of queueing batches without limit.

use std::path::Path;
use std::time::Instant;

use catalog_core::{Product, ProductFields, ProductStatus, RawProduct};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row};

use super::schema;
use crate::{Error, Result};

const SELECT_PRODUCT: &str = "SELECT id, code, status, imported_t, url, creator, created_t,
        last_modified_t, product_name, quantity, brands, categories, labels, cities,
        purchase_places, stores, ingredients_text, traces, serving_size, serving_quantity,
        nutriscore_score, nutriscore_grade, main_category, image_url, created_at, updated_at
    FROM products";

const INSERT_PRODUCT: &str = "INSERT INTO products (code, status, imported_t, created_at,
        updated_at, url, creator, created_t, last_modified_t, product_name, quantity, brands,
        categories, labels, cities, purchase_places, stores, ingredients_text, traces,
        serving_size, serving_quantity, nutriscore_score, nutriscore_grade, main_category,
        image_url)
    VALUES (?1, ?2, ?3, ?3, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
        ?17, ?18, ?19, ?20, ?21, ?22, ?23)";

const UPDATE_PRODUCT: &str = "UPDATE products SET status = COALESCE(?23, status),
        imported_t = ?2, updated_at = ?2,
        url = ?3, creator = ?4, created_t = ?5, last_modified_t = ?6, product_name = ?7,
        quantity = ?8, brands = ?9, categories = ?10, labels = ?11, cities = ?12,
        purchase_places = ?13, stores = ?14, ingredients_text = ?15, traces = ?16,
        serving_size = ?17, serving_quantity = ?18, nutriscore_score = ?19,
        nutriscore_grade = ?20, main_category = ?21, image_url = ?22
    WHERE id = ?1";

/// Products committed by one [`ProductStore::store_batch`] call.
#[derive(Debug, Clone)]
pub struct StoredBatch {
    /// Stored products, in batch order.
    pub products: Vec<Product>,
    /// When the last record of the batch committed.
    pub stored_at: DateTime<Utc>,
}

/// Result of storing one batch.
#[derive(Debug, Default)]
pub struct StoreOutcome {
    /// Products inserted or updated, in batch order.
    pub stored: Vec<Product>,
    /// Of `stored`, how many were new.
    pub inserted: usize,
    /// Records rejected by validation or rolled back by the store.
    pub failed: usize,
}

/// SQLite-backed product store.
pub struct ProductStore {
    /// SQLite connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    /// Post-commit channel to the search indexer.
    stored_sender: Option<Sender<StoredBatch>>,
}

impl ProductStore {
    /// Open or create the product database at `path`.
    pub fn open(path: impl AsRef<Path>, stored_sender: Option<Sender<StoredBatch>>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("Failed to open {}: {}", path.display(), e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Store(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)?;

        tracing::info!("Product store opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            stored_sender,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(stored_sender: Option<Sender<StoredBatch>>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("Failed to open in-memory SQLite: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            stored_sender,
        })
    }

    /// Whether stored batches are published to an indexer.
    pub fn has_subscriber(&self) -> bool {
        self.stored_sender.is_some()
    }

    /// Upsert every record of `batch`, each in its own transaction.
    ///
    /// Records without a usable `code` and records the database rejects are
    /// logged, counted in [`StoreOutcome::failed`], and skipped.
    pub fn store_batch(&self, batch: Vec<RawProduct>) -> StoreOutcome {
        let started = Instant::now();
        let mut outcome = StoreOutcome {
            stored: Vec::with_capacity(batch.len()),
            ..Default::default()
        };

        {
            let mut conn = self.conn.lock();
            for (position, record) in batch.iter().enumerate() {
                match upsert_record(&mut conn, record, Utc::now()) {
                    Ok((product, inserted)) => {
                        if inserted {
                            outcome.inserted += 1;
                        }
                        outcome.stored.push(product);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Skipping record {} (code {:?}): {}",
                            position,
                            record.code.as_deref().unwrap_or(""),
                            e
                        );
                        outcome.failed += 1;
                    }
                }
            }
        }

        metrics::counter!("import_records_stored_total").increment(outcome.stored.len() as u64);
        metrics::counter!("import_records_failed_total").increment(outcome.failed as u64);
        metrics::histogram!("import_batch_duration_seconds").record(started.elapsed().as_secs_f64());

        // Notify the indexer (if channel is configured)
        if !outcome.stored.is_empty()
            && let Some(sender) = &self.stored_sender
        {
            let stored = StoredBatch {
                products: outcome.stored.clone(),
                stored_at: Utc::now(),
            };
            if let Err(e) = sender.send(stored) {
                tracing::warn!("Failed to send stored batch notification: {}", e);
            }
        }

        outcome
    }

    /// Look up a product by its normalized code.
    pub fn find_by_code(&self, code: i64) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        Ok(find_by_code(&conn, code)?)
    }

    /// Insert a new published product.
    ///
    /// Fails if a product with the same code already exists.
    pub fn insert(&self, code: i64, fields: &ProductFields) -> Result<Product> {
        let conn = self.conn.lock();
        insert_product(&conn, code, fields, Utc::now())
    }

    /// Replace the descriptive fields of product `id`, keeping its status.
    ///
    /// Imports go through [`ProductStore::store_batch`], which republishes.
    pub fn update(&self, id: i64, fields: &ProductFields) -> Result<Product> {
        let conn = self.conn.lock();
        update_product(&conn, id, fields, None, Utc::now())
    }

    /// Change the status of the product with `code`.
    ///
    /// Returns `false` if no such product exists.
    pub fn set_status(&self, code: i64, status: ProductStatus) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE products SET status = ?1, updated_at = ?2 WHERE code = ?3",
            rusqlite::params![status.as_str(), Utc::now(), code],
        )?;
        Ok(changed > 0)
    }

    /// Number of stored products.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Upsert one record in its own transaction. Returns the stored product and
/// whether it was newly inserted. Either way the product ends up published.
fn upsert_record(
    conn: &mut Connection,
    record: &RawProduct,
    now: DateTime<Utc>,
) -> Result<(Product, bool)> {
    let code = record.normalized_code()?;

    // Rolls back on drop unless committed.
    let tx = conn.transaction()?;
    let result = match find_by_code(&tx, code)? {
        Some(existing) => {
            let status = Some(ProductStatus::Published);
            (update_product(&tx, existing.id, &record.fields, status, now)?, false)
        }
        None => (insert_product(&tx, code, &record.fields, now)?, true),
    };
    tx.commit()?;

    Ok(result)
}

fn find_by_code(conn: &Connection, code: i64) -> rusqlite::Result<Option<Product>> {
    conn.query_row(
        &format!("{SELECT_PRODUCT} WHERE code = ?1"),
        [code],
        product_from_row,
    )
    .optional()
}

fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Product>> {
    conn.query_row(
        &format!("{SELECT_PRODUCT} WHERE id = ?1"),
        [id],
        product_from_row,
    )
    .optional()
}

fn insert_product(
    conn: &Connection,
    code: i64,
    fields: &ProductFields,
    now: DateTime<Utc>,
) -> Result<Product> {
    let status = ProductStatus::Published.as_str();
    let head: [&dyn ToSql; 3] = [&code, &status, &now];
    let params: Vec<&dyn ToSql> = head.into_iter().chain(field_params(fields)).collect();

    conn.execute(INSERT_PRODUCT, params.as_slice())?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?
        .ok_or_else(|| Error::Store(format!("product {} vanished after insert", code)))
}

fn update_product(
    conn: &Connection,
    id: i64,
    fields: &ProductFields,
    status: Option<ProductStatus>,
    now: DateTime<Utc>,
) -> Result<Product> {
    // NULL keeps the current status
    let status = status.map(|s| s.as_str());
    let head: [&dyn ToSql; 2] = [&id, &now];
    let params: Vec<&dyn ToSql> = head
        .into_iter()
        .chain(field_params(fields))
        .chain([&status as &dyn ToSql])
        .collect();

    let changed = conn.execute(UPDATE_PRODUCT, params.as_slice())?;
    if changed == 0 {
        return Err(Error::Store(format!("no product with id {}", id)));
    }

    find_by_id(conn, id)?
        .ok_or_else(|| Error::Store(format!("product {} vanished after update", id)))
}

/// Field values in column order, shared by insert and update.
fn field_params(fields: &ProductFields) -> [&dyn ToSql; 20] {
    [
        &fields.url,
        &fields.creator,
        &fields.created_t,
        &fields.last_modified_t,
        &fields.product_name,
        &fields.quantity,
        &fields.brands,
        &fields.categories,
        &fields.labels,
        &fields.cities,
        &fields.purchase_places,
        &fields.stores,
        &fields.ingredients_text,
        &fields.traces,
        &fields.serving_size,
        &fields.serving_quantity,
        &fields.nutriscore_score,
        &fields.nutriscore_grade,
        &fields.main_category,
        &fields.image_url,
    ]
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let status: String = row.get(2)?;
    let status = status
        .parse::<ProductStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Product {
        id: row.get(0)?,
        code: row.get(1)?,
        status,
        imported_at: row.get(3)?,
        fields: ProductFields {
            url: row.get(4)?,
            creator: row.get(5)?,
            created_t: row.get(6)?,
            last_modified_t: row.get(7)?,
            product_name: row.get(8)?,
            quantity: row.get(9)?,
            brands: row.get(10)?,
            categories: row.get(11)?,
            labels: row.get(12)?,
            cities: row.get(13)?,
            purchase_places: row.get(14)?,
            stores: row.get(15)?,
            ingredients_text: row.get(16)?,
            traces: row.get(17)?,
            serving_size: row.get(18)?,
            serving_quantity: row.get(19)?,
            nutriscore_score: row.get(20)?,
            nutriscore_grade: row.get(21)?,
            main_category: row.get(22)?,
            image_url: row.get(23)?,
        },
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(code: &str, name: &str) -> RawProduct {
        RawProduct {
            code: Some(code.to_string()),
            fields: ProductFields {
                product_name: Some(name.to_string()),
                ..Default::default()
            },
        }
    }

    // =========================================================================
    // Upsert semantics
    // =========================================================================

    #[test]
    fn test_store_batch_inserts_published() {
        let store = ProductStore::open_in_memory(None).unwrap();
        let outcome = store.store_batch(vec![raw("0000000000001", "One"), raw("2", "Two")]);

        assert_eq!(outcome.stored.len(), 2);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(store.count().unwrap(), 2);

        let product = store.find_by_code(1).unwrap().unwrap();
        assert_eq!(product.status, ProductStatus::Published);
        assert_eq!(product.fields.product_name.as_deref(), Some("One"));
    }

    #[test]
    fn test_upsert_twice_keeps_one_row_with_latest_fields() {
        let store = ProductStore::open_in_memory(None).unwrap();

        let first = store.store_batch(vec![raw("'0042'", "Old name")]);
        let first = &first.stored[0];

        let second = store.store_batch(vec![raw("\"42\"", "New name")]);
        assert_eq!(second.inserted, 0);
        let second = &second.stored[0];

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(first.id, second.id);
        assert!(second.imported_at >= first.imported_at);
        assert_eq!(second.created_at, first.created_at);

        let stored = store.find_by_code(42).unwrap().unwrap();
        assert_eq!(stored.fields.product_name.as_deref(), Some("New name"));
        assert_eq!(stored.imported_at, second.imported_at);
    }

    #[test]
    fn test_update_clears_fields_missing_from_new_record() {
        let store = ProductStore::open_in_memory(None).unwrap();

        let mut full = raw("7", "Granola");
        full.fields.brands = Some("Acme".to_string());
        full.fields.nutriscore_score = Some(3);
        store.store_batch(vec![full]);

        store.store_batch(vec![raw("7", "Granola")]);

        let stored = store.find_by_code(7).unwrap().unwrap();
        assert_eq!(stored.fields.brands, None);
        assert_eq!(stored.fields.nutriscore_score, None);
    }

    #[test]
    fn test_reimport_republishes_trashed_product() {
        let store = ProductStore::open_in_memory(None).unwrap();
        store.store_batch(vec![raw("9", "Trash me")]);
        assert!(store.set_status(9, ProductStatus::Trash).unwrap());

        let outcome = store.store_batch(vec![raw("9", "Reimported")]);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.stored[0].status, ProductStatus::Published);
        assert!(outcome.stored[0].is_searchable());

        let stored = store.find_by_code(9).unwrap().unwrap();
        assert_eq!(stored.status, ProductStatus::Published);
        assert_eq!(stored.fields.product_name.as_deref(), Some("Reimported"));
    }

    #[test]
    fn test_direct_update_keeps_status() {
        let store = ProductStore::open_in_memory(None).unwrap();
        let product = store.insert(10, &ProductFields::default()).unwrap();
        assert!(store.set_status(10, ProductStatus::Draft).unwrap());

        let fields = ProductFields {
            product_name: Some("Edited".to_string()),
            ..Default::default()
        };
        let updated = store.update(product.id, &fields).unwrap();

        assert_eq!(updated.status, ProductStatus::Draft);
        assert_eq!(updated.fields.product_name.as_deref(), Some("Edited"));
    }

    #[test]
    fn test_all_fields_roundtrip() {
        let store = ProductStore::open_in_memory(None).unwrap();
        let fields = ProductFields {
            url: Some("https://world.example/product/17".to_string()),
            creator: Some("kiliweb".to_string()),
            created_t: Some(1415302075),
            last_modified_t: Some(1572265837),
            product_name: Some("Vitoria crackers".to_string()),
            quantity: Some("200 g".to_string()),
            brands: Some("Crackers".to_string()),
            categories: Some("Snacks".to_string()),
            labels: Some("Vegan".to_string()),
            cities: Some("Lyon".to_string()),
            purchase_places: Some("France".to_string()),
            stores: Some("Carrefour".to_string()),
            ingredients_text: Some("wheat, salt".to_string()),
            traces: Some("milk".to_string()),
            serving_size: Some("20 g".to_string()),
            serving_quantity: Some(20.5),
            nutriscore_score: Some(-2),
            nutriscore_grade: Some("a".to_string()),
            main_category: Some("en:crackers".to_string()),
            image_url: Some("https://images.example/17.jpg".to_string()),
        };

        let inserted = store.insert(17, &fields).unwrap();
        assert_eq!(inserted.fields, fields);
        assert_eq!(store.find_by_code(17).unwrap().unwrap(), inserted);
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn test_invalid_codes_fail_individually() {
        let store = ProductStore::open_in_memory(None).unwrap();
        let mut no_code = raw("1", "No code");
        no_code.code = None;

        let outcome = store.store_batch(vec![
            raw("1", "Valid"),
            no_code,
            raw("0000", "Zero"),
            raw("12ab", "Letters"),
            raw("2", "Also valid"),
        ]);

        assert_eq!(outcome.stored.len(), 2);
        assert_eq!(outcome.failed, 3);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_rejected_record_rolls_back_alone() {
        let store = ProductStore::open_in_memory(None).unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER reject_13 AFTER INSERT ON products WHEN NEW.code = 13
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let outcome = store.store_batch(vec![raw("12", "a"), raw("13", "b"), raw("14", "c")]);

        assert_eq!(outcome.failed, 1);
        let codes: Vec<i64> = outcome.stored.iter().map(|p| p.code).collect();
        assert_eq!(codes, vec![12, 14]);
        assert!(store.find_by_code(13).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_insert_duplicate_code_fails() {
        let store = ProductStore::open_in_memory(None).unwrap();
        store.insert(5, &ProductFields::default()).unwrap();
        assert!(store.insert(5, &ProductFields::default()).is_err());
    }

    #[test]
    fn test_update_unknown_id_fails() {
        let store = ProductStore::open_in_memory(None).unwrap();
        assert!(matches!(
            store.update(99, &ProductFields::default()),
            Err(Error::Store(_))
        ));
    }

    #[test]
    fn test_set_status_unknown_code() {
        let store = ProductStore::open_in_memory(None).unwrap();
        assert!(!store.set_status(404, ProductStatus::Draft).unwrap());
    }

    // =========================================================================
    // Post-commit channel
    // =========================================================================

    #[test]
    fn test_stored_batch_notification() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let store = ProductStore::open_in_memory(Some(sender)).unwrap();

        store.store_batch(vec![raw("1", "a"), raw("bad", "b"), raw("2", "c")]);

        let stored = receiver.try_recv().unwrap();
        let codes: Vec<i64> = stored.products.iter().map(|p| p.code).collect();
        assert_eq!(codes, vec![1, 2]);
    }

    #[test]
    fn test_no_notification_when_nothing_stored() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let store = ProductStore::open_in_memory(Some(sender)).unwrap();

        store.store_batch(vec![raw("bad", "b")]);
        store.store_batch(Vec::new());

        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_channel_does_not_affect_storage() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        drop(receiver);
        let store = ProductStore::open_in_memory(Some(sender)).unwrap();

        let outcome = store.store_batch(vec![raw("1", "a")]);
        assert_eq!(outcome.stored.len(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    // =========================================================================
    // File-backed database
    // =========================================================================

    #[test]
    fn test_open_file_database_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("catalog.db");

        {
            let store = ProductStore::open(&path, None).unwrap();
            store.store_batch(vec![raw("3", "Persisted")]);
        }

        let store = ProductStore::open(&path, None).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find_by_code(3).unwrap().is_some());
    }
}
