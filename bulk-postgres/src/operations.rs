use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, prelude::FromRow};
use uuid::Uuid;

/// A row of `bulk.operations`.
///
/// `version` increases on every update and is the compare-and-swap token used by
/// [`update_operation`]. Complete rows are removed with [`delete_complete_operation`].
#[derive(Debug, Clone, FromRow)]
pub struct OperationRow {
    pub operation_id: Uuid,
    pub counter: i64,
    pub fixed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

pub async fn get_operation<'c, E>(
    executor: E,
    operation_id: Uuid,
) -> sqlx::Result<Option<OperationRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, OperationRow>(
        r#"
        select operation_id, counter, fixed, completed_at, version
        from bulk.operations
        where operation_id = $1
        "#,
    )
    .bind(operation_id)
    .fetch_optional(executor)
    .await
}

/// Inserts a fresh in-progress operation unless the id is already present.
pub async fn insert_operation<'c, E>(executor: E, operation_id: Uuid) -> sqlx::Result<bool>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        insert into bulk.operations (operation_id, counter, fixed, completed_at, version)
        values ($1, 0, false, null, 0)
        on conflict (operation_id) do nothing
        "#,
    )
    .bind(operation_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replaces the operation state if the stored version still equals `expected_version`.
pub async fn update_operation<'c, E>(
    executor: E,
    operation_id: Uuid,
    expected_version: i64,
    counter: i64,
    fixed: bool,
    completed_at: Option<DateTime<Utc>>,
) -> sqlx::Result<bool>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        update bulk.operations
        set counter = $3, fixed = $4, completed_at = $5, version = version + 1
        where operation_id = $1 and version = $2
        "#,
    )
    .bind(operation_id)
    .bind(expected_version)
    .bind(counter)
    .bind(fixed)
    .bind(completed_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Deletes the operation only when it is complete.
pub async fn delete_complete_operation<'c, E>(executor: E, operation_id: Uuid) -> sqlx::Result<bool>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        delete from bulk.operations
        where operation_id = $1 and completed_at is not null
        "#,
    )
    .bind(operation_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns every complete operation with its completion time.
pub async fn get_complete_operations<'c, E>(
    executor: E,
) -> sqlx::Result<Vec<(Uuid, DateTime<Utc>)>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
        r#"
        select operation_id, completed_at
        from bulk.operations
        where completed_at is not null
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn delete_all_operations<'c, E>(executor: E) -> sqlx::Result<u64>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query("delete from bulk.operations")
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}
