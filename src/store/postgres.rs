//! Postgres backend. Rows that an operation mutates are read `FOR UPDATE`.

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::aggregates::{
    Coupon, CouponUsage, InventoryLogEntry, Order, OrderItem, OrderNote, Refund, RefundItem, Restriction,
    StockRecord, StockTarget,
};
use crate::domain::value_objects::CouponCode;
use crate::store::EconomicsStore;
use crate::{EconomicsError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
    pub fn pool(&self) -> &PgPool { &self.pool }
}

const PRODUCT_STOCK: &str = "SELECT id AS product_id, NULL::uuid AS variant_id, stock_quantity, stock_status, low_stock_threshold, backorder_mode, updated_at FROM products";
const VARIANT_STOCK: &str = "SELECT product_id, id AS variant_id, stock_quantity, stock_status, low_stock_threshold, 'NO' AS backorder_mode, updated_at FROM product_variants";

fn stock_from_row(row: &PgRow) -> Result<StockRecord> {
    Ok(StockRecord {
        target: StockTarget::from_parts(row.try_get("product_id")?, row.try_get("variant_id")?),
        quantity: row.try_get("stock_quantity")?,
        status: row.try_get::<String, _>("stock_status")?.parse()?,
        low_stock_threshold: row.try_get("low_stock_threshold")?,
        backorder_mode: row.try_get::<String, _>("backorder_mode")?.parse()?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<InventoryLogEntry> {
    Ok(InventoryLogEntry {
        id: row.try_get("id")?,
        target: StockTarget::from_parts(row.try_get("product_id")?, row.try_get("variant_id")?),
        adjustment_type: row.try_get::<String, _>("adjustment_type")?.parse()?,
        quantity: row.try_get("quantity")?,
        previous_qty: row.try_get("previous_qty")?,
        new_qty: row.try_get("new_qty")?,
        reason: row.try_get("reason")?,
        notes: row.try_get("notes")?,
        reference_id: row.try_get("reference_id")?,
        actor: row.try_get("actor_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn restriction_from_row(row: &PgRow) -> Result<Restriction> {
    Ok(Restriction { id: row.try_get("target_id")?, mode: row.try_get::<String, _>("mode")?.parse()? })
}

async fn load_stock(conn: &mut PgConnection, target: &StockTarget, lock: bool) -> Result<Option<StockRecord>> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let row = match target {
        StockTarget::Product { product_id } => sqlx::query(&format!("{PRODUCT_STOCK} WHERE id = $1{suffix}"))
            .bind(product_id).fetch_optional(&mut *conn).await?,
        StockTarget::Variant { product_id, variant_id } => sqlx::query(&format!("{VARIANT_STOCK} WHERE id = $1 AND product_id = $2{suffix}"))
            .bind(variant_id).bind(product_id).fetch_optional(&mut *conn).await?,
    };
    row.as_ref().map(stock_from_row).transpose()
}

async fn load_coupon(conn: &mut PgConnection, row: PgRow) -> Result<Coupon> {
    let id: Uuid = row.try_get("id")?;
    let code = CouponCode::new(row.try_get::<String, _>("code")?).map_err(|e| EconomicsError::Storage(e.to_string()))?;
    let product_restrictions = sqlx::query("SELECT product_id AS target_id, mode FROM coupon_products WHERE coupon_id = $1")
        .bind(id).fetch_all(&mut *conn).await?.iter().map(restriction_from_row).collect::<Result<Vec<_>>>()?;
    let category_restrictions = sqlx::query("SELECT category_id AS target_id, mode FROM coupon_categories WHERE coupon_id = $1")
        .bind(id).fetch_all(&mut *conn).await?.iter().map(restriction_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Coupon {
        id, code,
        coupon_type: row.try_get::<String, _>("coupon_type")?.parse()?,
        value: row.try_get("value")?,
        usage_limit: row.try_get("usage_limit")?,
        usage_limit_per_user: row.try_get("usage_limit_per_user")?,
        limit_usage_to_x_items: row.try_get("limit_usage_to_x_items")?,
        min_order_value: row.try_get("min_order_value")?,
        max_order_value: row.try_get("max_order_value")?,
        max_discount: row.try_get("max_discount")?,
        individual_use_only: row.try_get("individual_use_only")?,
        exclude_sale_items: row.try_get("exclude_sale_items")?,
        allowed_emails: row.try_get("allowed_emails")?,
        is_active: row.try_get("is_active")?,
        starts_at: row.try_get("starts_at")?,
        expires_at: row.try_get("expires_at")?,
        usage_count: row.try_get("usage_count")?,
        product_restrictions, category_restrictions,
    })
}

async fn load_order(conn: &mut PgConnection, order_id: Uuid, lock: bool) -> Result<Option<Order>> {
    let sql = if lock { "SELECT * FROM orders WHERE id = $1 FOR UPDATE" } else { "SELECT * FROM orders WHERE id = $1" };
    let Some(row) = sqlx::query(sql).bind(order_id).fetch_optional(&mut *conn).await? else { return Ok(None) };
    let items = sqlx::query("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id).fetch_all(&mut *conn).await?
        .iter()
        .map(|r| -> Result<OrderItem> { Ok(OrderItem {
            id: r.try_get("id")?, product_id: r.try_get("product_id")?, variant_id: r.try_get("variant_id")?,
            quantity: r.try_get("quantity")?, unit_price: r.try_get("unit_price")?,
        }) })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        total: row.try_get("total")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
        items,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn load_refunds(conn: &mut PgConnection, sql: &str, key: Uuid) -> Result<Vec<Refund>> {
    let rows = sqlx::query(sql).bind(key).fetch_all(&mut *conn).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.try_get("id")).collect::<std::result::Result<_, _>>()?;
    let mut items: HashMap<Uuid, Vec<RefundItem>> = HashMap::new();
    for r in sqlx::query("SELECT * FROM refund_items WHERE refund_id = ANY($1) ORDER BY id").bind(&ids).fetch_all(&mut *conn).await? {
        items.entry(r.try_get("refund_id")?).or_default().push(RefundItem {
            id: r.try_get("id")?, order_item_id: r.try_get("order_item_id")?, quantity: r.try_get("quantity")?,
            amount: r.try_get("amount")?, restock_items: r.try_get("restock_items")?,
        });
    }
    rows.iter().map(|row| -> Result<Refund> {
        let id: Uuid = row.try_get("id")?;
        Ok(Refund {
            id,
            order_id: row.try_get("order_id")?,
            amount: row.try_get("amount")?,
            reason: row.try_get("reason")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            refund_method: row.try_get("refund_method")?,
            transaction_id: row.try_get("transaction_id")?,
            items: items.remove(&id).unwrap_or_default(),
            processed_by: row.try_get("processed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }).collect()
}

#[async_trait]
impl EconomicsStore for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> { Ok(self.pool.begin().await?) }

    async fn commit(&self, tx: Self::Tx) -> Result<()> { Ok(tx.commit().await?) }

    async fn stock_for_update(&self, tx: &mut Self::Tx, target: &StockTarget) -> Result<Option<StockRecord>> {
        load_stock(&mut **tx, target, true).await
    }

    async fn save_stock(&self, tx: &mut Self::Tx, record: &StockRecord) -> Result<()> {
        match &record.target {
            StockTarget::Product { product_id } => {
                sqlx::query("UPDATE products SET stock_quantity = $2, stock_status = $3, updated_at = $4 WHERE id = $1")
                    .bind(product_id).bind(record.quantity).bind(record.status.as_str()).bind(record.updated_at)
                    .execute(&mut **tx).await?;
            }
            StockTarget::Variant { variant_id, .. } => {
                sqlx::query("UPDATE product_variants SET stock_quantity = $2, stock_status = $3, updated_at = $4 WHERE id = $1")
                    .bind(variant_id).bind(record.quantity).bind(record.status.as_str()).bind(record.updated_at)
                    .execute(&mut **tx).await?;
            }
        }
        Ok(())
    }

    async fn append_inventory_log(&self, tx: &mut Self::Tx, e: &InventoryLogEntry) -> Result<()> {
        sqlx::query("INSERT INTO inventory_logs (id, product_id, variant_id, adjustment_type, quantity, previous_qty, new_qty, reason, notes, reference_id, actor_id, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(e.id).bind(e.target.product_id()).bind(e.target.variant_id()).bind(e.adjustment_type.as_str())
            .bind(e.quantity).bind(e.previous_qty).bind(e.new_qty).bind(&e.reason).bind(&e.notes)
            .bind(e.reference_id).bind(e.actor).bind(e.created_at)
            .execute(&mut **tx).await?;
        Ok(())
    }

    async fn increment_coupon_usage(&self, tx: &mut Self::Tx, coupon_id: Uuid) -> Result<bool> {
        let done = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE id = $1").bind(coupon_id).execute(&mut **tx).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn decrement_coupon_usage(&self, tx: &mut Self::Tx, coupon_id: Uuid) -> Result<Option<i64>> {
        let before: Option<(i64,)> = sqlx::query_as(
            "UPDATE coupons c SET usage_count = GREATEST(c.usage_count - 1, 0) FROM (SELECT id, usage_count FROM coupons WHERE id = $1 FOR UPDATE) old WHERE c.id = old.id RETURNING old.usage_count"
        ).bind(coupon_id).fetch_optional(&mut **tx).await?;
        Ok(before.map(|(count,)| count))
    }

    async fn insert_coupon_usage(&self, tx: &mut Self::Tx, u: &CouponUsage) -> Result<()> {
        sqlx::query("INSERT INTO coupon_usages (id, coupon_id, user_id, order_id, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(u.id).bind(u.coupon_id).bind(u.user_id).bind(u.order_id).bind(u.created_at)
            .execute(&mut **tx).await?;
        Ok(())
    }

    async fn delete_coupon_usages(&self, tx: &mut Self::Tx, coupon_id: Uuid, order_id: Uuid) -> Result<u64> {
        let done = sqlx::query("DELETE FROM coupon_usages WHERE coupon_id = $1 AND order_id = $2").bind(coupon_id).bind(order_id).execute(&mut **tx).await?;
        Ok(done.rows_affected())
    }

    async fn order_for_update(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Option<Order>> {
        load_order(&mut **tx, order_id, true).await
    }

    async fn save_order_status(&self, tx: &mut Self::Tx, order: &Order) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, payment_status = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id).bind(order.status.as_str()).bind(order.payment_status.as_str()).bind(order.updated_at)
            .execute(&mut **tx).await?;
        Ok(())
    }

    async fn append_order_note(&self, tx: &mut Self::Tx, n: &OrderNote) -> Result<()> {
        sqlx::query("INSERT INTO order_notes (id, order_id, body, customer_visible, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(n.id).bind(n.order_id).bind(&n.body).bind(n.customer_visible).bind(n.created_at)
            .execute(&mut **tx).await?;
        Ok(())
    }

    async fn refunds_for_order_in(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Vec<Refund>> {
        load_refunds(&mut **tx, "SELECT * FROM refunds WHERE order_id = $1 ORDER BY created_at", order_id).await
    }

    async fn refund_for_update(&self, tx: &mut Self::Tx, refund_id: Uuid) -> Result<Option<Refund>> {
        Ok(load_refunds(&mut **tx, "SELECT * FROM refunds WHERE id = $1 FOR UPDATE", refund_id).await?.pop())
    }

    async fn insert_refund(&self, tx: &mut Self::Tx, r: &Refund) -> Result<()> {
        sqlx::query("INSERT INTO refunds (id, order_id, amount, reason, status, refund_method, transaction_id, processed_by, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(r.id).bind(r.order_id).bind(r.amount).bind(&r.reason).bind(r.status.as_str()).bind(&r.refund_method)
            .bind(&r.transaction_id).bind(r.processed_by).bind(r.created_at).bind(r.updated_at)
            .execute(&mut **tx).await?;
        for i in &r.items {
            sqlx::query("INSERT INTO refund_items (id, refund_id, order_item_id, quantity, amount, restock_items) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(i.id).bind(r.id).bind(i.order_item_id).bind(i.quantity).bind(i.amount).bind(i.restock_items)
                .execute(&mut **tx).await?;
        }
        Ok(())
    }

    async fn save_refund_status(&self, tx: &mut Self::Tx, r: &Refund) -> Result<()> {
        sqlx::query("UPDATE refunds SET status = $2, transaction_id = $3, processed_by = $4, updated_at = $5 WHERE id = $1")
            .bind(r.id).bind(r.status.as_str()).bind(&r.transaction_id).bind(r.processed_by).bind(r.updated_at)
            .execute(&mut **tx).await?;
        Ok(())
    }

    async fn stock(&self, target: &StockTarget) -> Result<Option<StockRecord>> {
        let mut conn = self.pool.acquire().await?;
        load_stock(&mut conn, target, false).await
    }

    async fn low_stock(&self) -> Result<Vec<StockRecord>> {
        let sql = format!(
            "{PRODUCT_STOCK} WHERE stock_quantity > 0 AND stock_quantity <= low_stock_threshold UNION ALL {VARIANT_STOCK} WHERE stock_quantity > 0 AND stock_quantity <= low_stock_threshold"
        );
        sqlx::query(&sql).fetch_all(&self.pool).await?.iter().map(stock_from_row).collect()
    }

    async fn inventory_history(&self, target: &StockTarget, limit: usize) -> Result<Vec<InventoryLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query("SELECT * FROM inventory_logs WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 ORDER BY created_at DESC, id DESC LIMIT $3")
            .bind(target.product_id()).bind(target.variant_id()).bind(limit)
            .fetch_all(&self.pool).await?
            .iter().map(log_from_row).collect()
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(&mut *conn).await?;
        match row { Some(row) => Ok(Some(load_coupon(&mut conn, row).await?)), None => Ok(None) }
    }

    async fn coupon(&self, coupon_id: Uuid) -> Result<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM coupons WHERE id = $1").bind(coupon_id).fetch_optional(&mut *conn).await?;
        match row { Some(row) => Ok(Some(load_coupon(&mut conn, row).await?)), None => Ok(None) }
    }

    async fn count_user_usages(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2")
            .bind(coupon_id).bind(user_id).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, order_id, false).await
    }

    async fn order_notes(&self, order_id: Uuid) -> Result<Vec<OrderNote>> {
        sqlx::query("SELECT * FROM order_notes WHERE order_id = $1 ORDER BY created_at").bind(order_id).fetch_all(&self.pool).await?
            .iter()
            .map(|r| -> Result<OrderNote> { Ok(OrderNote {
                id: r.try_get("id")?, order_id: r.try_get("order_id")?, body: r.try_get("body")?,
                customer_visible: r.try_get("customer_visible")?, created_at: r.try_get("created_at")?,
            }) })
            .collect()
    }

    async fn refunds_for_order(&self, order_id: Uuid) -> Result<Vec<Refund>> {
        let mut conn = self.pool.acquire().await?;
        load_refunds(&mut conn, "SELECT * FROM refunds WHERE order_id = $1 ORDER BY created_at", order_id).await
    }
}
