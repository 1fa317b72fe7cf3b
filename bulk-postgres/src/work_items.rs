use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, prelude::FromRow};
use uuid::Uuid;

/// A row of `bulk.work_items`.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    pub pool_name: String,
    pub key: Vec<u8>,
    pub scheduled: DateTime<Utc>,
    pub attempts: i32,
    pub properties: serde_json::Value,
    pub operation_ids: Option<Vec<Uuid>>,
}

/// Inserts a work item unless one with the same key exists in the pool.
///
/// Returns `false` when the key was already taken.
pub async fn insert_work_item<'c, E>(executor: E, row: &WorkItemRow) -> sqlx::Result<bool>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        insert into bulk.work_items (pool_name, key, scheduled, attempts, properties, operation_ids)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (pool_name, key) do nothing
        "#,
    )
    .bind(&row.pool_name)
    .bind(&row.key)
    .bind(row.scheduled)
    .bind(row.attempts)
    .bind(&row.properties)
    .bind(&row.operation_ids)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// A merged row together with the operation ids it carried before the merge.
#[derive(Debug, Clone, FromRow)]
pub struct MergedWorkItemRow {
    #[sqlx(flatten)]
    pub row: WorkItemRow,
    pub previous_operation_ids: Option<Vec<Uuid>>,
}

/// Overwrites schedule, attempts and properties of an existing item and unions its
/// operation ids with the given ones, in a single statement.
///
/// Returns `None` when no item with the key exists.
pub async fn merge_work_item<'c, E>(
    executor: E,
    row: &WorkItemRow,
) -> sqlx::Result<Option<MergedWorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, MergedWorkItemRow>(
        r#"
        with previous as (
            select pool_name, key, operation_ids
            from bulk.work_items
            where pool_name = $1 and key = $2
            for update
        )
        update bulk.work_items as w
        set scheduled = $3,
            attempts = $4,
            properties = $5,
            operation_ids = case
                when $6::uuid[] is null then w.operation_ids
                else array(
                    select distinct id
                    from unnest(coalesce(w.operation_ids, '{}'::uuid[]) || $6::uuid[]) as id
                    order by id
                )
            end
        from previous
        where w.pool_name = previous.pool_name and w.key = previous.key
        returning w.pool_name, w.key, w.scheduled, w.attempts, w.properties, w.operation_ids,
            previous.operation_ids as previous_operation_ids
        "#,
    )
    .bind(&row.pool_name)
    .bind(&row.key)
    .bind(row.scheduled)
    .bind(row.attempts)
    .bind(&row.properties)
    .bind(&row.operation_ids)
    .fetch_optional(executor)
    .await
}

/// Returns up to `limit` items of the pool due at `now`, earliest first.
pub async fn get_due_work_items<'c, E>(
    executor: E,
    pool_name: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> sqlx::Result<Vec<WorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WorkItemRow>(
        r#"
        select pool_name, key, scheduled, attempts, properties, operation_ids
        from bulk.work_items
        where pool_name = $1 and scheduled <= $2
        order by scheduled asc
        limit $3
        "#,
    )
    .bind(pool_name)
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Claims an item for a checkout.
///
/// The update only applies if the item still carries `expected_scheduled`, so two
/// consumers that read the same candidate cannot both claim it.
pub async fn claim_work_item<'c, E>(
    executor: E,
    pool_name: &str,
    key: &[u8],
    expected_scheduled: DateTime<Utc>,
    next_scheduled: DateTime<Utc>,
) -> sqlx::Result<Option<WorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WorkItemRow>(
        r#"
        update bulk.work_items
        set scheduled = $4, attempts = attempts + 1
        where pool_name = $1 and key = $2 and scheduled = $3
        returning pool_name, key, scheduled, attempts, properties, operation_ids
        "#,
    )
    .bind(pool_name)
    .bind(key)
    .bind(expected_scheduled)
    .bind(next_scheduled)
    .fetch_optional(executor)
    .await
}

pub async fn get_work_item<'c, E>(
    executor: E,
    pool_name: &str,
    key: &[u8],
) -> sqlx::Result<Option<WorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WorkItemRow>(
        r#"
        select pool_name, key, scheduled, attempts, properties, operation_ids
        from bulk.work_items
        where pool_name = $1 and key = $2
        "#,
    )
    .bind(pool_name)
    .bind(key)
    .fetch_optional(executor)
    .await
}

/// Deletes an item by key and returns the deleted row.
pub async fn delete_work_item<'c, E>(
    executor: E,
    pool_name: &str,
    key: &[u8],
) -> sqlx::Result<Option<WorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WorkItemRow>(
        r#"
        delete from bulk.work_items
        where pool_name = $1 and key = $2
        returning pool_name, key, scheduled, attempts, properties, operation_ids
        "#,
    )
    .bind(pool_name)
    .bind(key)
    .fetch_optional(executor)
    .await
}

/// Deletes an item only if it still carries the schedule set by the caller's claim.
pub async fn delete_claimed_work_item<'c, E>(
    executor: E,
    pool_name: &str,
    key: &[u8],
    scheduled: DateTime<Utc>,
) -> sqlx::Result<Option<WorkItemRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WorkItemRow>(
        r#"
        delete from bulk.work_items
        where pool_name = $1 and key = $2 and scheduled = $3
        returning pool_name, key, scheduled, attempts, properties, operation_ids
        "#,
    )
    .bind(pool_name)
    .bind(key)
    .bind(scheduled)
    .fetch_optional(executor)
    .await
}

/// Deletes every item of the pool and returns how many were removed.
pub async fn delete_all_work_items<'c, E>(executor: E, pool_name: &str) -> sqlx::Result<u64>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        delete from bulk.work_items
        where pool_name = $1
        "#,
    )
    .bind(pool_name)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Fails when the work item table is not reachable, e.g. before migrations ran.
pub async fn check_work_items_table<'c, E>(executor: E) -> sqlx::Result<()>
where
    E: PgExecutor<'c>,
{
    sqlx::query("select 1 from bulk.work_items limit 1")
        .execute(executor)
        .await?;

    Ok(())
}
