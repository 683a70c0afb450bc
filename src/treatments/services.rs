//! Write paths for treatments and their line items.
//!
//! Every mutation runs in one transaction: the treatment row and all derived
//! line-item quantities and prices either move together or not at all.

use super::calculations::{
    MachineLoads, absolute_quantity, dose_from_quantity, dose_per_full_load, plan_loads,
    product_for_partial_load, round_currency, round_quantity,
};
use super::models::{
    ActiveModel, ApplicationType, Entity, Model, TreatmentCreate, TreatmentStatus, TreatmentUpdate,
};
use super::products::models as line_items;
use crate::products::models::{DoseType, DoseUnit};
use chrono::{NaiveDate, Utc};
use crudcrate::traits::MergeIntoActiveModel;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, IntoActiveModel, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

impl ApplicationType {
    pub fn label(self) -> &'static str {
        match self {
            ApplicationType::Spraying => "spraying",
            ApplicationType::Fertigation => "fertigation",
        }
    }
}

/// Treatment-level inputs the line-item arithmetic depends on.
struct DoseContext {
    application_type: ApplicationType,
    field_area: Decimal,
    water_per_ha: Decimal,
}

impl DoseContext {
    async fn load<C: ConnectionTrait>(conn: &C, treatment: &Model) -> Result<Self, DbErr> {
        let field = crate::fields::models::Entity::find_by_id(treatment.field_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "Field with id '{}' not found",
                    treatment.field_id
                ))
            })?;
        Ok(Self {
            application_type: treatment.application_type,
            field_area: field.area,
            water_per_ha: treatment.effective_water_per_ha(),
        })
    }
}

/// Which of the two linked figures the client edited. The other one is
/// recomputed from it.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Primary {
    Dose,
    Total,
}

struct LineInputs {
    dose: Option<Decimal>,
    dose_type: Option<DoseType>,
    total_dose: Option<Decimal>,
    unit_price: Option<Decimal>,
}

struct LineValues {
    dose: Decimal,
    dose_type: DoseType,
    total_dose: Decimal,
    unit: DoseUnit,
    unit_price: Decimal,
    total_price: Decimal,
    price_per_ha: Decimal,
}

fn compute_line_values(
    product: &crate::products::models::Model,
    ctx: &DoseContext,
    inputs: &LineInputs,
    primary: Primary,
) -> Result<LineValues, DbErr> {
    let catalog_pair = product.dose_pair(ctx.application_type);
    let dose_type = inputs
        .dose_type
        .or(catalog_pair.map(|(_, dose_type)| dose_type))
        .ok_or_else(|| {
            DbErr::Custom(format!(
                "Validation failed: product '{}' is not configured for {}",
                product.name,
                ctx.application_type.label()
            ))
        })?;

    let (dose, total_dose) = match primary {
        Primary::Total => {
            let total = round_quantity(inputs.total_dose.ok_or_else(|| {
                DbErr::Custom("Validation failed: total_dose is required".to_string())
            })?);
            let dose = dose_from_quantity(total, dose_type, ctx.field_area, ctx.water_per_ha);
            (dose, total)
        }
        Primary::Dose => {
            let dose = inputs
                .dose
                .or(catalog_pair.map(|(dose, _)| dose))
                .ok_or_else(|| {
                    DbErr::Custom(format!(
                        "Validation failed: no dose given and product '{}' has no {} dose",
                        product.name,
                        ctx.application_type.label()
                    ))
                })?;
            let (total, _) = absolute_quantity(dose, dose_type, ctx.field_area, ctx.water_per_ha);
            (dose, total)
        }
    };

    if dose.is_sign_negative() || total_dose.is_sign_negative() {
        return Err(DbErr::Custom(
            "Validation failed: dose must not be negative".to_string(),
        ));
    }

    let unit_price = match inputs.unit_price {
        Some(price) if price > Decimal::ZERO => price,
        _ => product.price,
    };
    let total_price = round_currency(total_dose * unit_price);
    let price_per_ha = if ctx.field_area > Decimal::ZERO {
        round_currency(total_price / ctx.field_area)
    } else {
        Decimal::ZERO
    };

    Ok(LineValues {
        dose,
        dose_type,
        total_dose,
        unit: dose_type.unit(),
        unit_price,
        total_price,
        price_per_ha,
    })
}

async fn find_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<crate::products::models::Model, DbErr> {
    crate::products::models::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Product with id '{product_id}' not found")))
}

async fn insert_line_item<C: ConnectionTrait>(
    conn: &C,
    treatment: &Model,
    ctx: &DoseContext,
    data: line_items::TreatmentProductCreate,
) -> Result<Uuid, DbErr> {
    let product = find_product(conn, data.product_id).await?;
    let inputs = LineInputs {
        dose: data.dose,
        dose_type: data.dose_type,
        total_dose: data.total_dose,
        unit_price: data.unit_price,
    };
    let primary = if data.total_dose.is_some() {
        Primary::Total
    } else {
        Primary::Dose
    };
    let values = compute_line_values(&product, ctx, &inputs, primary)?;

    let now = Utc::now();
    let inserted = line_items::ActiveModel {
        id: Set(Uuid::new_v4()),
        treatment_id: Set(treatment.id),
        product_id: Set(product.id),
        dose: Set(Some(values.dose)),
        dose_type: Set(Some(values.dose_type)),
        total_dose: Set(Some(values.total_dose)),
        total_dose_unit: Set(values.unit),
        unit_price: Set(Some(values.unit_price)),
        total_price: Set(values.total_price),
        price_per_ha: Set(values.price_per_ha),
        created_at: Set(now),
        last_updated: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(inserted.id)
}

async fn update_line_item<C: ConnectionTrait>(
    conn: &C,
    existing: line_items::Model,
    ctx: &DoseContext,
    data: &line_items::TreatmentProductUpdate,
) -> Result<(), DbErr> {
    let product_id = data.product_id.flatten().unwrap_or(existing.product_id);
    let product = find_product(conn, product_id).await?;

    // A client that sends total_dose is editing the absolute figure, so the
    // per-unit dose follows it. Any other edit keeps the dose authoritative.
    let primary = if matches!(data.total_dose, Some(Some(_))) {
        Primary::Total
    } else {
        Primary::Dose
    };
    let inputs = LineInputs {
        dose: data.dose.flatten().or(existing.dose),
        dose_type: data.dose_type.flatten().or(existing.dose_type),
        total_dose: data.total_dose.flatten().or(existing.total_dose),
        unit_price: data.unit_price.flatten().or(existing.unit_price),
    };
    let values = compute_line_values(&product, ctx, &inputs, primary)?;

    let mut active = existing.into_active_model();
    active.product_id = Set(product_id);
    active.dose = Set(Some(values.dose));
    active.dose_type = Set(Some(values.dose_type));
    active.total_dose = Set(Some(values.total_dose));
    active.total_dose_unit = Set(values.unit);
    active.unit_price = Set(Some(values.unit_price));
    active.total_price = Set(values.total_price);
    active.price_per_ha = Set(values.price_per_ha);
    active.last_updated = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

/// Recompute every line item of a treatment from its stored per-unit dose.
/// Called after the carrier water, field or application method changed.
pub async fn recalculate_line_items<C: ConnectionTrait>(
    conn: &C,
    treatment: &Model,
) -> Result<usize, DbErr> {
    let ctx = DoseContext::load(conn, treatment).await?;
    let items = line_items::Entity::find()
        .filter(line_items::Column::TreatmentId.eq(treatment.id))
        .all(conn)
        .await?;

    let count = items.len();
    for item in items {
        let product = find_product(conn, item.product_id).await?;
        let inputs = LineInputs {
            dose: item.dose,
            dose_type: item.dose_type,
            total_dose: item.total_dose,
            unit_price: item.unit_price,
        };
        let values = compute_line_values(&product, &ctx, &inputs, Primary::Dose)?;

        let mut active = item.into_active_model();
        active.dose = Set(Some(values.dose));
        active.dose_type = Set(Some(values.dose_type));
        active.total_dose = Set(Some(values.total_dose));
        active.total_dose_unit = Set(values.unit);
        active.unit_price = Set(Some(values.unit_price));
        active.total_price = Set(values.total_price);
        active.price_per_ha = Set(values.price_per_ha);
        active.last_updated = Set(Utc::now());
        active.update(conn).await?;
    }
    tracing::debug!(
        "Recalculated {count} line items for treatment {}",
        treatment.id
    );
    Ok(count)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) async fn create_treatment(
    db: &DatabaseConnection,
    create_data: TreatmentCreate,
) -> Result<Uuid, DbErr> {
    let txn = db.begin().await?;

    let application_type = create_data.application_type;
    let date = create_data.date;
    let finish_date = create_data.finish_date;
    let line_inputs = create_data.products.clone();

    let mut active: ActiveModel = create_data.into();
    if application_type == ApplicationType::Fertigation {
        // Fertigation carries no spray water; the dose arithmetic must not
        // see a leftover carrier volume.
        active.water_per_ha = Set(Decimal::ZERO);
        active.real_water_per_ha = Set(None);
    }
    active.status = Set(TreatmentStatus::derive(finish_date, date, today()));
    let inserted = active.insert(&txn).await?;

    let ctx = DoseContext::load(&txn, &inserted).await?;
    for input in line_inputs {
        insert_line_item(&txn, &inserted, &ctx, input).await?;
    }

    txn.commit().await?;
    Ok(inserted.id)
}

pub(super) async fn update_treatment(
    db: &DatabaseConnection,
    id: Uuid,
    update_data: TreatmentUpdate,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let existing = Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Treatment with id '{id}' not found")))?;

    let line_updates = update_data.products.clone();
    // Fields the client did not send come back absent from the merge; the
    // derived status and water handling fall back to the stored row.
    let prior = existing.clone();
    let mut merged = update_data.merge_into_activemodel(existing.into_active_model())?;

    let application_type = merged
        .application_type
        .try_as_ref()
        .copied()
        .unwrap_or(prior.application_type);
    if application_type == ApplicationType::Fertigation {
        merged.water_per_ha = Set(Decimal::ZERO);
        merged.real_water_per_ha = Set(None);
    }

    let date = merged.date.try_as_ref().copied().unwrap_or(prior.date);
    let finish_date = merged
        .finish_date
        .try_as_ref()
        .copied()
        .unwrap_or(prior.finish_date);
    merged.status = Set(TreatmentStatus::derive(finish_date, date, today()));
    merged.last_updated = Set(Utc::now());

    let updated = merged.update(&txn).await?;
    let ctx = DoseContext::load(&txn, &updated).await?;

    // An update without line items only touches the treatment itself; the
    // stored items are re-derived against the new water, date or method.
    if line_updates.is_empty() {
        recalculate_line_items(&txn, &updated).await?;
        txn.commit().await?;
        return Ok(());
    }

    // Full replacement of the line-item list: items re-sent with an id are
    // updated in place; everything else is deleted before the new entries go
    // in, so re-sending a product without its id does not collide with the
    // row it replaces on the unique (treatment, product) pair.
    let resent_ids: Vec<Uuid> = line_updates
        .iter()
        .filter_map(|line_update| line_update.id.flatten())
        .collect();
    let mut stale =
        line_items::Entity::delete_many().filter(line_items::Column::TreatmentId.eq(id));
    if !resent_ids.is_empty() {
        stale = stale.filter(line_items::Column::Id.is_not_in(resent_ids));
    }
    stale.exec(&txn).await?;

    for line_update in line_updates {
        if let Some(Some(item_id)) = line_update.id {
            let existing_item = line_items::Entity::find_by_id(item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    DbErr::RecordNotFound(format!(
                        "Treatment product with id '{item_id}' not found"
                    ))
                })?;
            if existing_item.treatment_id != id {
                return Err(DbErr::Custom(
                    "Validation failed: line item belongs to another treatment".to_string(),
                ));
            }
            update_line_item(&txn, existing_item, &ctx, &line_update).await?;
        } else {
            let product_id = line_update.product_id.flatten().ok_or_else(|| {
                DbErr::Custom("Validation failed: product_id is required".to_string())
            })?;
            let create = line_items::TreatmentProductCreate {
                product_id,
                dose: line_update.dose.flatten(),
                dose_type: line_update.dose_type.flatten(),
                total_dose: line_update.total_dose.flatten(),
                unit_price: line_update.unit_price.flatten(),
            };
            insert_line_item(&txn, &updated, &ctx, create).await?;
        }
    }

    txn.commit().await?;
    Ok(())
}

/// Mark a treatment as done and settle its figures against the water that
/// was actually sprayed.
pub(super) async fn finish_treatment(
    db: &DatabaseConnection,
    id: Uuid,
    finish_date: NaiveDate,
    real_water_per_ha: Option<Decimal>,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let existing = Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Treatment with id '{id}' not found")))?;

    let application_type = existing.application_type;
    let mut active = existing.into_active_model();
    active.finish_date = Set(Some(finish_date));
    if application_type == ApplicationType::Spraying {
        if let Some(real) = real_water_per_ha {
            if real < Decimal::ZERO {
                return Err(DbErr::Custom(
                    "Validation failed: real_water_per_ha must not be negative".to_string(),
                ));
            }
            active.real_water_per_ha = Set(Some(real));
        }
    }
    active.status = Set(TreatmentStatus::Completed);
    active.last_updated = Set(Utc::now());
    let updated = active.update(&txn).await?;

    recalculate_line_items(&txn, &updated).await?;

    txn.commit().await?;
    Ok(())
}

/// Tank plan for one treatment, with the product quantities to mix into a
/// full tank and into the partial one.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoadPlanItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub dose: Option<Decimal>,
    pub dose_type: Option<DoseType>,
    pub unit: DoseUnit,
    pub per_full_load: Option<Decimal>,
    pub per_partial_load: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoadPlan {
    pub treatment_id: Uuid,
    pub loads: Option<MachineLoads>,
    pub items: Vec<LoadPlanItem>,
}

/// Load plan for the detail view; None when the treatment has no machine,
/// no water, or is fertigation.
pub(super) async fn load_plan(
    db: &DatabaseConnection,
    treatment: &Model,
) -> Result<Option<MachineLoads>, DbErr> {
    let Some(machine_id) = treatment.machine_id else {
        return Ok(None);
    };
    let Some(machine) = crate::machines::models::Entity::find_by_id(machine_id)
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    let Some(field) = crate::fields::models::Entity::find_by_id(treatment.field_id)
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    Ok(plan_loads(
        treatment.application_type,
        Some(machine.capacity),
        field.area,
        treatment.effective_water_per_ha(),
    ))
}

pub(super) async fn load_plan_details(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<LoadPlan, DbErr> {
    let treatment = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Treatment with id '{id}' not found")))?;

    let machine_capacity = match treatment.machine_id {
        Some(machine_id) => crate::machines::models::Entity::find_by_id(machine_id)
            .one(db)
            .await?
            .map(|machine| machine.capacity),
        None => None,
    };
    let loads = load_plan(db, &treatment).await?;
    let water_per_ha = treatment.effective_water_per_ha();

    let line_entries = line_items::Entity::find()
        .filter(line_items::Column::TreatmentId.eq(id))
        .find_also_related(crate::products::models::Entity)
        .all(db)
        .await?;

    let mut items = Vec::new();
    for (item, product) in line_entries {
        let per_full_load = match (item.dose, item.dose_type) {
            (Some(dose), Some(dose_type)) => dose_per_full_load(
                treatment.application_type,
                item.total_dose.unwrap_or_default(),
                machine_capacity,
                dose,
                dose_type,
                water_per_ha,
            ),
            _ => None,
        };
        let per_partial_load = match (&loads, item.dose, item.dose_type) {
            (Some(loads), Some(dose), Some(dose_type)) => {
                Some(product_for_partial_load(loads, dose, dose_type, water_per_ha))
            }
            _ => None,
        };
        items.push(LoadPlanItem {
            product_id: item.product_id,
            product_name: product.map(|p| p.name).unwrap_or_default(),
            dose: item.dose,
            dose_type: item.dose_type,
            unit: item.total_dose_unit,
            per_full_load,
            per_partial_load,
        });
    }

    Ok(LoadPlan {
        treatment_id: id,
        loads,
        items,
    })
}

/// Outcome counters for the maintenance jobs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaintenanceReport {
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Promote pending treatments whose scheduled date has passed. Safe to run
/// nightly; already-delayed and completed treatments are left alone.
pub async fn promote_delayed(db: &DatabaseConnection) -> Result<MaintenanceReport, DbErr> {
    let stale = Entity::find()
        .filter(super::models::Column::Status.eq(TreatmentStatus::Pending))
        .filter(super::models::Column::Date.lt(today()))
        .all(db)
        .await?;

    let mut report = MaintenanceReport::default();
    for treatment in stale {
        let mut active = treatment.into_active_model();
        active.status = Set(TreatmentStatus::Delayed);
        active.last_updated = Set(Utc::now());
        active.update(db).await?;
        report.updated += 1;
    }
    tracing::info!("Promoted {} pending treatments to delayed", report.updated);
    Ok(report)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaintenanceFilter {
    pub treatment_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub field_id: Option<Uuid>,
}

fn line_item_query(filter: &MaintenanceFilter) -> sea_orm::Select<line_items::Entity> {
    let mut query = line_items::Entity::find();
    if let Some(treatment_id) = filter.treatment_id {
        query = query.filter(line_items::Column::TreatmentId.eq(treatment_id));
    }
    if let Some(product_id) = filter.product_id {
        query = query.filter(line_items::Column::ProductId.eq(product_id));
    }
    query
}

fn line_item_changed(item: &line_items::Model, values: &LineValues) -> bool {
    item.dose != Some(values.dose)
        || item.dose_type != Some(values.dose_type)
        || item.total_dose != Some(values.total_dose)
        || item.total_dose_unit != values.unit
        || item.unit_price != Some(values.unit_price)
        || item.total_price != values.total_price
        || item.price_per_ha != values.price_per_ha
}

fn apply_line_values(item: line_items::Model, values: &LineValues) -> line_items::ActiveModel {
    let mut active = item.into_active_model();
    active.dose = Set(Some(values.dose));
    active.dose_type = Set(Some(values.dose_type));
    active.total_dose = Set(Some(values.total_dose));
    active.total_dose_unit = Set(values.unit);
    active.unit_price = Set(Some(values.unit_price));
    active.total_price = Set(values.total_price);
    active.price_per_ha = Set(values.price_per_ha);
    active.last_updated = Set(Utc::now());
    active
}

/// Backfill job: re-derive total_dose, unit and prices of stored line items
/// from their per-unit dose. Line items whose product lost its dose
/// configuration are counted as errors and skipped.
pub async fn recalculate_doses(
    db: &DatabaseConnection,
    filter: &MaintenanceFilter,
    dry_run: bool,
) -> Result<MaintenanceReport, DbErr> {
    let items = line_item_query(filter).all(db).await?;

    let mut report = MaintenanceReport::default();
    for item in items {
        let Some(treatment) = Entity::find_by_id(item.treatment_id).one(db).await? else {
            tracing::warn!("Line item {} references a missing treatment", item.id);
            report.errors += 1;
            continue;
        };
        if let Some(field_id) = filter.field_id {
            if treatment.field_id != field_id {
                continue;
            }
        }
        let ctx = DoseContext::load(db, &treatment).await?;
        let Ok(product) = find_product(db, item.product_id).await else {
            tracing::warn!("Line item {} references a missing product", item.id);
            report.errors += 1;
            continue;
        };
        let inputs = LineInputs {
            dose: item.dose,
            dose_type: item.dose_type,
            total_dose: item.total_dose,
            unit_price: item.unit_price,
        };
        match compute_line_values(&product, &ctx, &inputs, Primary::Dose) {
            Ok(values) if line_item_changed(&item, &values) => {
                if !dry_run {
                    apply_line_values(item, &values).update(db).await?;
                }
                report.updated += 1;
            }
            Ok(_) => report.unchanged += 1,
            Err(e) => {
                tracing::warn!("Cannot recalculate line item {}: {e}", item.id);
                report.errors += 1;
            }
        }
    }
    tracing::info!(
        "Dose recalculation: {} updated, {} unchanged, {} errors",
        report.updated,
        report.unchanged,
        report.errors
    );
    Ok(report)
}

/// Price-sync job: reset each line item's unit price to the current catalog
/// price and re-derive its total and per-hectare cost.
pub async fn recalculate_costs(
    db: &DatabaseConnection,
    product_id: Option<Uuid>,
    dry_run: bool,
) -> Result<MaintenanceReport, DbErr> {
    let filter = MaintenanceFilter {
        product_id,
        ..MaintenanceFilter::default()
    };
    let items = line_item_query(&filter).all(db).await?;

    let mut report = MaintenanceReport::default();
    for item in items {
        let Some(treatment) = Entity::find_by_id(item.treatment_id).one(db).await? else {
            tracing::warn!("Line item {} references a missing treatment", item.id);
            report.errors += 1;
            continue;
        };
        let ctx = DoseContext::load(db, &treatment).await?;
        let Ok(product) = find_product(db, item.product_id).await else {
            tracing::warn!("Line item {} references a missing product", item.id);
            report.errors += 1;
            continue;
        };

        let unit_price = product.price;
        let total_price = round_currency(item.total_dose.unwrap_or_default() * unit_price);
        let price_per_ha = if ctx.field_area > Decimal::ZERO {
            round_currency(total_price / ctx.field_area)
        } else {
            Decimal::ZERO
        };

        let changed = item.unit_price != Some(unit_price)
            || item.total_price != total_price
            || item.price_per_ha != price_per_ha;
        if changed {
            if !dry_run {
                let mut active = item.into_active_model();
                active.unit_price = Set(Some(unit_price));
                active.total_price = Set(total_price);
                active.price_per_ha = Set(price_per_ha);
                active.last_updated = Set(Utc::now());
                active.update(db).await?;
            }
            report.updated += 1;
        } else {
            report.unchanged += 1;
        }
    }
    tracing::info!(
        "Cost resync: {} updated, {} unchanged, {} errors",
        report.updated,
        report.unchanged,
        report.errors
    );
    Ok(report)
}
