//! SQLite-backed [`Catalog`].
//!
//! Rows are scoped by an `institution` column holding the institution's
//! configuration key, so one database serves every configured institution.
//! Harvest filters are pushed down into SQL with [`QueryBuilder`]; the same
//! WHERE clause drives both the page query and the `COUNT(*)` that becomes
//! `completeListSize`.
//!
//! Schema: see [`crate::migrate`].

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::catalog::{Catalog, HarvestPage};
use crate::config::Config;
use crate::db;
use crate::identifier::{parse_set_spec, Handle};
use crate::models::{Collection, InstitutionScope, Item, MetadataElement};
use crate::query::SelectiveHarvestCriteria;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database named in `[db] path`.
    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts or replaces a collection.
    pub async fn upsert_collection(&self, institution: &str, collection: &Collection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (institution, handle, title, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(institution, handle) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            "#,
        )
        .bind(institution)
        .bind(collection.handle.to_string())
        .bind(&collection.title)
        .bind(&collection.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts or replaces an item together with its elements and
    /// collection memberships, in one transaction.
    pub async fn upsert_item(&self, institution: &str, item: &Item) -> Result<()> {
        let handle = item.handle.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO items (institution, handle, updated_at, withdrawn, item_type)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(institution, handle) DO UPDATE SET
                updated_at = excluded.updated_at,
                withdrawn = excluded.withdrawn,
                item_type = excluded.item_type
            "#,
        )
        .bind(institution)
        .bind(&handle)
        .bind(item.updated_at.timestamp())
        .bind(item.withdrawn)
        .bind(&item.item_type)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM item_elements WHERE institution = ? AND handle = ?")
            .bind(institution)
            .bind(&handle)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM item_collections WHERE institution = ? AND item_handle = ?")
            .bind(institution)
            .bind(&handle)
            .execute(&mut *tx)
            .await?;

        for (position, element) in item.elements.iter().enumerate() {
            sqlx::query(
                "INSERT INTO item_elements (institution, handle, position, name, value) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(institution)
            .bind(&handle)
            .bind(position as i64)
            .bind(&element.name)
            .bind(&element.value)
            .execute(&mut *tx)
            .await?;
        }

        for collection in &item.collections {
            sqlx::query(
                "INSERT OR IGNORE INTO item_collections (institution, item_handle, collection_handle) VALUES (?, ?, ?)",
            )
            .bind(institution)
            .bind(&handle)
            .bind(collection.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Builds an [`Item`] from an `items` row plus its child rows.
    async fn load_item(&self, institution: &str, row: &SqliteRow) -> Result<Item> {
        let handle_text: String = row.get("handle");
        let handle = Handle::parse(&handle_text)
            .ok_or_else(|| anyhow!("malformed handle in catalog: {}", handle_text))?;
        let updated_at: i64 = row.get("updated_at");
        let updated_at = DateTime::<Utc>::from_timestamp(updated_at, 0)
            .ok_or_else(|| anyhow!("invalid datestamp {} for {}", updated_at, handle_text))?;

        let elements = sqlx::query(
            "SELECT name, value FROM item_elements WHERE institution = ? AND handle = ? ORDER BY position ASC",
        )
        .bind(institution)
        .bind(&handle_text)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| MetadataElement::new(r.get::<String, _>("name"), r.get::<String, _>("value")))
        .collect();

        let collections = sqlx::query(
            "SELECT collection_handle FROM item_collections WHERE institution = ? AND item_handle = ? ORDER BY collection_handle ASC",
        )
        .bind(institution)
        .bind(&handle_text)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .filter_map(|r| Handle::parse(&r.get::<String, _>("collection_handle")))
        .collect();

        Ok(Item {
            handle,
            updated_at,
            collections,
            withdrawn: row.get("withdrawn"),
            item_type: row.get("item_type"),
            elements,
        })
    }
}

/// Appends the WHERE clause shared by the count and page queries.
fn push_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    scope: &InstitutionScope,
    criteria: &SelectiveHarvestCriteria,
) {
    qb.push(" WHERE institution = ");
    qb.push_bind(scope.key.clone());

    if let Some(from) = criteria.from_bound() {
        qb.push(" AND updated_at >= ");
        qb.push_bind(from.timestamp());
    }
    if let Some(until) = criteria.until_bound() {
        qb.push(" AND updated_at <= ");
        qb.push_bind(until.timestamp());
    }

    if let Some(spec) = &criteria.filter.set {
        match parse_set_spec(spec) {
            Some(collection) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM item_collections ic \
                     WHERE ic.institution = items.institution \
                     AND ic.item_handle = items.handle AND ic.collection_handle = ",
                );
                qb.push_bind(collection.to_string());
                qb.push(")");
            }
            None => {
                qb.push(" AND 0");
            }
        }
    }

    if let Some(types) = &criteria.item_types {
        if types.is_empty() {
            qb.push(" AND 0");
        } else {
            qb.push(" AND lower(item_type) IN (");
            let mut separated = qb.separated(", ");
            for t in types {
                separated.push_bind(t.to_lowercase());
            }
            separated.push_unseparated(")");
        }
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn find_item(&self, scope: &InstitutionScope, handle: &Handle) -> Result<Option<Item>> {
        let row = sqlx::query(
            "SELECT handle, updated_at, withdrawn, item_type FROM items WHERE institution = ? AND handle = ?",
        )
        .bind(&scope.key)
        .bind(handle.to_string())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("looking up {}", handle))?;

        match row {
            Some(row) => Ok(Some(self.load_item(&scope.key, &row).await?)),
            None => Ok(None),
        }
    }

    async fn harvest(
        &self,
        scope: &InstitutionScope,
        criteria: &SelectiveHarvestCriteria,
    ) -> Result<HarvestPage> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM items");
        push_filters(&mut count, scope, criteria);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("counting harvest results")?;

        let mut page = QueryBuilder::<Sqlite>::new(
            "SELECT handle, updated_at, withdrawn, item_type FROM items",
        );
        push_filters(&mut page, scope, criteria);
        page.push(" ORDER BY updated_at ASC, handle ASC LIMIT ");
        page.push_bind(criteria.page_size as i64);
        page.push(" OFFSET ");
        page.push_bind(criteria.offset as i64);
        let rows = page
            .build()
            .fetch_all(&self.pool)
            .await
            .context("fetching harvest page")?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(self.load_item(&scope.key, row).await?);
        }

        Ok(HarvestPage {
            items,
            total: total as usize,
        })
    }

    async fn collections(&self, scope: &InstitutionScope) -> Result<Vec<Collection>> {
        let rows = sqlx::query(
            "SELECT handle, title, description FROM collections WHERE institution = ? ORDER BY handle ASC",
        )
        .bind(&scope.key)
        .fetch_all(&self.pool)
        .await
        .context("listing collections")?;

        rows.iter()
            .map(|row| {
                let handle: String = row.get("handle");
                Ok(Collection {
                    handle: Handle::parse(&handle)
                        .ok_or_else(|| anyhow!("malformed collection handle: {}", handle))?,
                    title: row.get("title"),
                    description: row.get("description"),
                })
            })
            .collect()
    }

    async fn earliest_datestamp(&self, scope: &InstitutionScope) -> Result<Option<DateTime<Utc>>> {
        let earliest: Option<i64> =
            sqlx::query_scalar("SELECT MIN(updated_at) FROM items WHERE institution = ?")
                .bind(&scope.key)
                .fetch_one(&self.pool)
                .await
                .context("reading earliest datestamp")?;
        Ok(earliest.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)))
    }
}
