//! PostgreSQL adapter for the persistence port

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    AdjustmentMode, Assembly, BillOfMaterialsLine, Estimate, EstimateRoom, LevelRecord, Material,
    MaterialTakeoff, OwnerScope, ScopeKind, SkippedLineItem, TakeoffLine, TakeoffStatus,
    Transaction, TransactionType, TransferDirection,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{
    CatalogSource, EstimateSource, InventoryStore, StoreError, StoreResult, TakeoffStore,
};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

const LEVEL_COLUMNS: &str = "scope_kind, scope_id, material_id, current_quantity, min_quantity, \
    standard_quantity, location, last_stock_check, version, baseline_quantity, baseline_version, \
    created_at, updated_at, created_by, updated_by";

const TRANSACTION_COLUMNS: &str = "id, scope_kind, scope_id, material_id, transaction_type, \
    quantity, direction, adjustment_mode, counterparty_kind, counterparty_id, transfer_id, \
    reverses, reference, notes, level_version, actor, created_at";

const TAKEOFF_COLUMNS: &str = "id, project_id, estimate_id, estimate_version, stock_scope_kind, \
    stock_scope_id, status, lines, skipped_items, total_cost, total_purchase_cost, fingerprint, \
    created_at, created_by, updated_at";

fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unreadable {} '{}' in database", what, value))
}

fn scope_from_row(kind: &str, id: Uuid) -> StoreResult<OwnerScope> {
    let kind = ScopeKind::from_str(kind).ok_or_else(|| corrupt("scope kind", kind))?;
    Ok(OwnerScope::from_parts(kind, id))
}

/// Row for level queries
#[derive(Debug, FromRow)]
struct LevelRow {
    scope_kind: String,
    scope_id: Uuid,
    material_id: String,
    current_quantity: Decimal,
    min_quantity: Option<Decimal>,
    standard_quantity: Option<Decimal>,
    location: Option<String>,
    last_stock_check: Option<DateTime<Utc>>,
    version: i64,
    baseline_quantity: Decimal,
    baseline_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
}

impl TryFrom<LevelRow> for LevelRecord {
    type Error = StoreError;

    fn try_from(row: LevelRow) -> StoreResult<Self> {
        Ok(LevelRecord {
            scope: scope_from_row(&row.scope_kind, row.scope_id)?,
            material_id: row.material_id,
            current_quantity: row.current_quantity,
            min_quantity: row.min_quantity,
            standard_quantity: row.standard_quantity,
            location: row.location,
            last_stock_check: row.last_stock_check,
            version: row.version,
            baseline_quantity: row.baseline_quantity,
            baseline_version: row.baseline_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
        })
    }
}

/// Row for transaction queries
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    scope_kind: String,
    scope_id: Uuid,
    material_id: String,
    transaction_type: String,
    quantity: Decimal,
    direction: Option<String>,
    adjustment_mode: Option<String>,
    counterparty_kind: Option<String>,
    counterparty_id: Option<Uuid>,
    transfer_id: Option<Uuid>,
    reverses: Option<Uuid>,
    reference: Option<String>,
    notes: Option<String>,
    level_version: i64,
    actor: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> StoreResult<Self> {
        let transaction_type = TransactionType::from_str(&row.transaction_type)
            .ok_or_else(|| corrupt("transaction type", &row.transaction_type))?;
        let direction = row
            .direction
            .as_deref()
            .map(|d| TransferDirection::from_str(d).ok_or_else(|| corrupt("direction", d)))
            .transpose()?;
        let adjustment_mode = row
            .adjustment_mode
            .as_deref()
            .map(|m| AdjustmentMode::from_str(m).ok_or_else(|| corrupt("adjustment mode", m)))
            .transpose()?;
        let counterparty_scope = match (row.counterparty_kind.as_deref(), row.counterparty_id) {
            (Some(kind), Some(id)) => Some(scope_from_row(kind, id)?),
            _ => None,
        };

        Ok(Transaction {
            id: row.id,
            scope: scope_from_row(&row.scope_kind, row.scope_id)?,
            material_id: row.material_id,
            transaction_type,
            quantity: row.quantity,
            direction,
            adjustment_mode,
            counterparty_scope,
            transfer_id: row.transfer_id,
            reverses: row.reverses,
            reference: row.reference,
            notes: row.notes,
            level_version: row.level_version,
            actor: row.actor,
            created_at: row.created_at,
        })
    }
}

/// Row for takeoff queries
#[derive(Debug, FromRow)]
struct TakeoffRow {
    id: Uuid,
    project_id: Uuid,
    estimate_id: Uuid,
    estimate_version: i32,
    stock_scope_kind: String,
    stock_scope_id: Uuid,
    status: String,
    lines: Json<Vec<TakeoffLine>>,
    skipped_items: Json<Vec<SkippedLineItem>>,
    total_cost: Decimal,
    total_purchase_cost: Decimal,
    fingerprint: String,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TakeoffRow> for MaterialTakeoff {
    type Error = StoreError;

    fn try_from(row: TakeoffRow) -> StoreResult<Self> {
        let status =
            TakeoffStatus::from_str(&row.status).ok_or_else(|| corrupt("takeoff status", &row.status))?;
        Ok(MaterialTakeoff {
            id: row.id,
            project_id: row.project_id,
            estimate_id: row.estimate_id,
            estimate_version: row.estimate_version,
            stock_scope: scope_from_row(&row.stock_scope_kind, row.stock_scope_id)?,
            status,
            lines: row.lines.0,
            skipped_items: row.skipped_items.0,
            total_cost: row.total_cost,
            total_purchase_cost: row.total_purchase_cost,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
            created_by: row.created_by,
            updated_at: row.updated_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn current_version(
    conn: &mut PgConnection,
    scope: &OwnerScope,
    material_id: &str,
) -> StoreResult<Option<i64>> {
    let version = sqlx::query_scalar::<_, i64>(
        "SELECT version FROM inventory_levels WHERE scope_kind = $1 AND scope_id = $2 AND material_id = $3",
    )
    .bind(scope.kind().as_str())
    .bind(scope.id())
    .bind(material_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(version)
}

/// SQLSTATE 23505
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "23505")
}

/// Compare-and-swap write on an open connection or transaction
async fn write_level(
    conn: &mut PgConnection,
    level: &LevelRecord,
    expected_version: Option<i64>,
) -> StoreResult<()> {
    let result = match expected_version {
        None => {
            sqlx::query(
                r#"
                INSERT INTO inventory_levels (
                    scope_kind, scope_id, material_id, current_quantity, min_quantity,
                    standard_quantity, location, last_stock_check, version, baseline_quantity,
                    baseline_version, created_at, updated_at, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (scope_kind, scope_id, material_id) DO NOTHING
                "#,
            )
            .bind(level.scope.kind().as_str())
            .bind(level.scope.id())
            .bind(&level.material_id)
            .bind(level.current_quantity)
            .bind(level.min_quantity)
            .bind(level.standard_quantity)
            .bind(&level.location)
            .bind(level.last_stock_check)
            .bind(level.version)
            .bind(level.baseline_quantity)
            .bind(level.baseline_version)
            .bind(level.created_at)
            .bind(level.updated_at)
            .bind(level.created_by)
            .bind(level.updated_by)
            .execute(&mut *conn)
            .await?
        }
        Some(expected) => {
            sqlx::query(
                r#"
                UPDATE inventory_levels
                SET current_quantity = $4, min_quantity = $5, standard_quantity = $6,
                    location = $7, last_stock_check = $8, version = $9,
                    baseline_quantity = $10, baseline_version = $11,
                    updated_at = $12, updated_by = $13
                WHERE scope_kind = $1 AND scope_id = $2 AND material_id = $3 AND version = $14
                "#,
            )
            .bind(level.scope.kind().as_str())
            .bind(level.scope.id())
            .bind(&level.material_id)
            .bind(level.current_quantity)
            .bind(level.min_quantity)
            .bind(level.standard_quantity)
            .bind(&level.location)
            .bind(level.last_stock_check)
            .bind(level.version)
            .bind(level.baseline_quantity)
            .bind(level.baseline_version)
            .bind(level.updated_at)
            .bind(level.updated_by)
            .bind(expected)
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        let actual = current_version(conn, &level.scope, &level.material_id).await?;
        return Err(StoreError::conflict(level, expected_version, actual));
    }
    Ok(())
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn get_level(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Option<LevelRecord>> {
        let row = sqlx::query_as::<_, LevelRow>(&format!(
            "SELECT {} FROM inventory_levels WHERE scope_kind = $1 AND scope_id = $2 AND material_id = $3",
            LEVEL_COLUMNS
        ))
        .bind(scope.kind().as_str())
        .bind(scope.id())
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(LevelRecord::try_from).transpose()
    }

    async fn list_levels(&self, scope: &OwnerScope) -> StoreResult<Vec<LevelRecord>> {
        let rows = sqlx::query_as::<_, LevelRow>(&format!(
            "SELECT {} FROM inventory_levels WHERE scope_kind = $1 AND scope_id = $2 ORDER BY material_id",
            LEVEL_COLUMNS
        ))
        .bind(scope.kind().as_str())
        .bind(scope.id())
        .fetch_all(&self.db)
        .await?;

        collect(rows)
    }

    async fn put_level(&self, level: &LevelRecord, expected_version: Option<i64>) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        write_level(&mut conn, level, expected_version).await
    }

    async fn commit_entry(
        &self,
        transaction: &Transaction,
        level: &LevelRecord,
        expected_version: Option<i64>,
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        // CAS first: a concurrent writer on the same key blocks on the row lock
        // and then sees zero rows updated, which surfaces as VersionConflict
        if let Err(err) = write_level(&mut tx, level, expected_version).await {
            tx.rollback().await?;
            return Err(err);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                id, scope_kind, scope_id, material_id, transaction_type, quantity, direction,
                adjustment_mode, counterparty_kind, counterparty_id, transfer_id, reverses,
                reference, notes, level_version, actor, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.scope.kind().as_str())
        .bind(transaction.scope.id())
        .bind(&transaction.material_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.quantity)
        .bind(transaction.direction.map(|d| d.as_str()))
        .bind(transaction.adjustment_mode.map(|m| m.as_str()))
        .bind(transaction.counterparty_scope.map(|s| s.kind().as_str()))
        .bind(transaction.counterparty_scope.map(|s| s.id()))
        .bind(transaction.transfer_id)
        .bind(transaction.reverses)
        .bind(&transaction.reference)
        .bind(&transaction.notes)
        .bind(transaction.level_version)
        .bind(transaction.actor)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(result) => result,
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Err(StoreError::conflict(level, expected_version, None));
            }
            Err(err) => return Err(err.into()),
        };

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::DuplicateTransaction(transaction.id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn transactions_for_material(
        &self,
        material_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE material_id = $1 \
             ORDER BY created_at DESC, level_version DESC LIMIT $2",
            TRANSACTION_COLUMNS
        ))
        .bind(material_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;

        collect(rows)
    }

    async fn transactions_for_scope(
        &self,
        scope: &OwnerScope,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions WHERE scope_kind = $1 AND scope_id = $2 \
             ORDER BY created_at DESC, level_version DESC LIMIT $3",
            TRANSACTION_COLUMNS
        ))
        .bind(scope.kind().as_str())
        .bind(scope.id())
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;

        collect(rows)
    }

    async fn transactions_for_key(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM inventory_transactions \
             WHERE scope_kind = $1 AND scope_id = $2 AND material_id = $3 \
             ORDER BY level_version ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(scope.kind().as_str())
        .bind(scope.id())
        .bind(material_id)
        .fetch_all(&self.db)
        .await?;

        collect(rows)
    }
}

#[async_trait]
impl TakeoffStore for PgStore {
    async fn insert_takeoff(&self, takeoff: &MaterialTakeoff) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO material_takeoffs (
                id, project_id, estimate_id, estimate_version, stock_scope_kind, stock_scope_id,
                status, lines, skipped_items, total_cost, total_purchase_cost, fingerprint,
                created_at, created_by, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (project_id, estimate_id) DO NOTHING
            "#,
        )
        .bind(takeoff.id)
        .bind(takeoff.project_id)
        .bind(takeoff.estimate_id)
        .bind(takeoff.estimate_version)
        .bind(takeoff.stock_scope.kind().as_str())
        .bind(takeoff.stock_scope.id())
        .bind(takeoff.status.as_str())
        .bind(Json(&takeoff.lines))
        .bind(Json(&takeoff.skipped_items))
        .bind(takeoff.total_cost)
        .bind(takeoff.total_purchase_cost)
        .bind(&takeoff.fingerprint)
        .bind(takeoff.created_at)
        .bind(takeoff.created_by)
        .bind(takeoff.updated_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateTakeoff(takeoff.estimate_id));
        }
        Ok(())
    }

    async fn get_takeoff(&self, id: Uuid) -> StoreResult<Option<MaterialTakeoff>> {
        let row = sqlx::query_as::<_, TakeoffRow>(&format!(
            "SELECT {} FROM material_takeoffs WHERE id = $1",
            TAKEOFF_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(MaterialTakeoff::try_from).transpose()
    }

    async fn find_takeoff(
        &self,
        project_id: Uuid,
        estimate_id: Uuid,
    ) -> StoreResult<Option<MaterialTakeoff>> {
        let row = sqlx::query_as::<_, TakeoffRow>(&format!(
            "SELECT {} FROM material_takeoffs WHERE project_id = $1 AND estimate_id = $2",
            TAKEOFF_COLUMNS
        ))
        .bind(project_id)
        .bind(estimate_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(MaterialTakeoff::try_from).transpose()
    }

    async fn list_takeoffs(&self, project_id: Uuid) -> StoreResult<Vec<MaterialTakeoff>> {
        let rows = sqlx::query_as::<_, TakeoffRow>(&format!(
            "SELECT {} FROM material_takeoffs WHERE project_id = $1 ORDER BY created_at DESC",
            TAKEOFF_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.db)
        .await?;

        collect(rows)
    }

    async fn update_takeoff_status(
        &self,
        id: Uuid,
        from: TakeoffStatus,
        to: TakeoffStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE material_takeoffs SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Row for catalog material queries
#[derive(Debug, FromRow)]
struct MaterialRow {
    id: String,
    name: String,
    unit_cost: Decimal,
    default_waste_factor: Option<Decimal>,
    category: Option<String>,
}

/// Row for assembly BOM lines
#[derive(Debug, FromRow)]
struct BomRow {
    material_id: String,
    quantity: Decimal,
    waste_factor: Option<Decimal>,
}

#[async_trait]
impl CatalogSource for PgStore {
    async fn get_assembly(&self, assembly_id: &str) -> StoreResult<Option<Assembly>> {
        let phase = sqlx::query_scalar::<_, Option<String>>(
            "SELECT phase FROM catalog_assemblies WHERE id = $1",
        )
        .bind(assembly_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(phase) = phase else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, BomRow>(
            r#"
            SELECT material_id, quantity, waste_factor
            FROM catalog_assembly_materials
            WHERE assembly_id = $1
            ORDER BY position, material_id
            "#,
        )
        .bind(assembly_id)
        .fetch_all(&self.db)
        .await?;

        Ok(Some(Assembly {
            id: assembly_id.to_string(),
            phase,
            materials: lines
                .into_iter()
                .map(|r| BillOfMaterialsLine {
                    material_id: r.material_id,
                    quantity: r.quantity,
                    waste_factor: r.waste_factor,
                })
                .collect(),
        }))
    }

    async fn get_material(&self, material_id: &str) -> StoreResult<Option<Material>> {
        let row = sqlx::query_as::<_, MaterialRow>(
            "SELECT id, name, unit_cost, default_waste_factor, category FROM catalog_materials WHERE id = $1",
        )
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Material {
            id: r.id,
            name: r.name,
            unit_cost: r.unit_cost,
            default_waste_factor: r.default_waste_factor,
            category: r.category,
        }))
    }
}

/// Row for estimate queries
#[derive(Debug, FromRow)]
struct EstimateRow {
    id: Uuid,
    project_id: Uuid,
    version: i32,
    rooms: Json<Vec<EstimateRoom>>,
}

#[async_trait]
impl EstimateSource for PgStore {
    async fn get_estimate(&self, project_id: Uuid) -> StoreResult<Option<Estimate>> {
        let row = sqlx::query_as::<_, EstimateRow>(
            r#"
            SELECT id, project_id, version, rooms
            FROM project_estimates
            WHERE project_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Estimate {
            id: r.id,
            project_id: r.project_id,
            version: r.version,
            rooms: r.rooms.0,
        }))
    }
}
