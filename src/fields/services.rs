//! Cost aggregation over a field's treatments.
//!
//! Totals come from the persisted line-item prices, so the figures here
//! always agree with what the treatment views show. The default window is
//! the trailing 365 days.

use crate::treatments::calculations::round_currency;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn trailing_year(today: NaiveDate) -> Self {
        Self {
            from: today - Duration::days(365),
            to: today,
        }
    }

    /// Fill missing bounds from the trailing-year default.
    pub fn resolve(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let default = Self::trailing_year(Utc::now().date_naive());
        Self {
            from: from.unwrap_or(default.from),
            to: to.unwrap_or(default.to),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductCost {
    pub name: String,
    pub total: Decimal,
    /// Share of the category total, percent with two decimals.
    pub percentage: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryCost {
    pub name: String,
    pub total: Decimal,
    /// Share of the field total, percent with two decimals.
    pub percentage: Decimal,
    pub products: Vec<ProductCost>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldCosts {
    pub field_id: Uuid,
    pub field_name: String,
    pub area: Decimal,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_cost: Decimal,
    pub cost_per_ha: Decimal,
    pub categories: Vec<CategoryCost>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FarmCosts {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_cost: Decimal,
    pub fields: Vec<FieldCosts>,
}

fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        round_currency(part * Decimal::from(100) / whole)
    }
}

/// Line items of the field's treatments in the range, joined with their
/// product so the breakdown can name things.
async fn priced_line_items(
    db: &DatabaseConnection,
    field_id: Uuid,
    range: DateRange,
) -> Result<
    Vec<(
        crate::treatments::products::models::Model,
        Option<crate::products::models::Model>,
    )>,
    DbErr,
> {
    let treatment_ids: Vec<Uuid> = crate::treatments::models::Entity::find()
        .filter(crate::treatments::models::Column::FieldId.eq(field_id))
        .filter(crate::treatments::models::Column::Date.gte(range.from))
        .filter(crate::treatments::models::Column::Date.lte(range.to))
        .all(db)
        .await?
        .into_iter()
        .map(|treatment| treatment.id)
        .collect();

    if treatment_ids.is_empty() {
        return Ok(Vec::new());
    }

    crate::treatments::products::models::Entity::find()
        .filter(crate::treatments::products::models::Column::TreatmentId.is_in(treatment_ids))
        .find_also_related(crate::products::models::Entity)
        .all(db)
        .await
}

/// Sum of the field's treatment costs in the range.
pub async fn treatments_cost(
    db: &DatabaseConnection,
    field_id: Uuid,
    range: DateRange,
) -> Result<Decimal, DbErr> {
    let items = priced_line_items(db, field_id, range).await?;
    let total = items
        .iter()
        .map(|(item, _)| item.total_price)
        .sum::<Decimal>();
    Ok(round_currency(total))
}

/// Full cost report for one field: total, cost per hectare, and the
/// category/product breakdown sorted by descending spend.
pub async fn cost_breakdown(
    db: &DatabaseConnection,
    field: &super::models::Model,
    range: DateRange,
) -> Result<FieldCosts, DbErr> {
    let items = priced_line_items(db, field.id, range).await?;

    let category_names: HashMap<Uuid, String> = crate::product_types::models::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|product_type| (product_type.id, product_type.name))
        .collect();

    // category name -> product name -> spend
    let mut grouped: HashMap<String, HashMap<String, Decimal>> = HashMap::new();
    let mut total_cost = Decimal::ZERO;
    for (item, product) in items {
        let (category, product_name) = match &product {
            Some(product) => {
                let category = product
                    .product_type_id
                    .and_then(|type_id| category_names.get(&type_id).cloned())
                    .unwrap_or_else(|| UNCATEGORIZED.to_string());
                (category, product.name.clone())
            }
            None => (UNCATEGORIZED.to_string(), "Unknown product".to_string()),
        };
        total_cost += item.total_price;
        *grouped
            .entry(category)
            .or_default()
            .entry(product_name)
            .or_insert(Decimal::ZERO) += item.total_price;
    }
    total_cost = round_currency(total_cost);

    let mut categories: Vec<CategoryCost> = grouped
        .into_iter()
        .map(|(name, products)| {
            let category_total = round_currency(products.values().copied().sum::<Decimal>());
            let mut products: Vec<ProductCost> = products
                .into_iter()
                .map(|(name, total)| ProductCost {
                    name,
                    total: round_currency(total),
                    percentage: percentage(total, category_total),
                })
                .collect();
            products.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
            CategoryCost {
                percentage: percentage(category_total, total_cost),
                name,
                total: category_total,
                products,
            }
        })
        .collect();
    categories.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

    let cost_per_ha = if field.area > Decimal::ZERO {
        round_currency(total_cost / field.area)
    } else {
        Decimal::ZERO
    };

    Ok(FieldCosts {
        field_id: field.id,
        field_name: field.name.clone(),
        area: field.area,
        date_from: range.from,
        date_to: range.to,
        total_cost,
        cost_per_ha,
        categories,
    })
}

/// Cost reports for every field plus the farm-wide total.
pub async fn farm_costs(db: &DatabaseConnection, range: DateRange) -> Result<FarmCosts, DbErr> {
    let fields = super::models::Entity::find().all(db).await?;

    let mut reports = Vec::with_capacity(fields.len());
    let mut total_cost = Decimal::ZERO;
    for field in &fields {
        let report = cost_breakdown(db, field, range).await?;
        total_cost += report.total_cost;
        reports.push(report);
    }
    reports.sort_by(|a, b| b.total_cost.cmp(&a.total_cost));

    Ok(FarmCosts {
        date_from: range.from,
        date_to: range.to,
        total_cost: round_currency(total_cost),
        fields: reports,
    })
}
