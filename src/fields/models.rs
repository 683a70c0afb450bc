use crate::treatments::models::TreatmentStatus;
use chrono::{DateTime, Utc};
use crudcrate::{CRUDResource, EntityToModels, traits::MergeIntoActiveModel};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, TransactionTrait, entity::prelude::*,
};
// Import after EntityToModels to avoid conflicts
use uuid::Uuid;

/// How many of the field's treatments sit in each status. Shown on the
/// field detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TreatmentStatusCounts {
    pub pending: u64,
    pub completed: u64,
    pub delayed: u64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "fields")]
#[crudcrate(
    generate_router,
    api_struct = "Field",
    name_singular = "field",
    name_plural = "fields",
    description = "Cultivated parcels with their area, crop and planting year.",
    fn_get_one = get_one_field,
    fn_create = create_field,
    fn_update = update_field,
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))")]
    #[crudcrate(sortable, filterable)]
    pub area: Decimal,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub crop: String,
    #[crudcrate(sortable, filterable)]
    pub planting_year: i32,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub location: Option<String>,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model=false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
    #[sea_orm(ignore)]
    #[crudcrate(non_db_attr = true, default = None, list_model=false)]
    pub treatment_counts: Option<TreatmentStatusCounts>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::treatments::models::Entity")]
    Treatments,
    #[sea_orm(has_many = "crate::expenses::models::Entity")]
    Expenses,
    #[sea_orm(has_many = "crate::harvests::models::Entity")]
    Harvests,
}

impl Related<crate::treatments::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Treatments.def()
    }
}

impl Related<crate::expenses::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<crate::harvests::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Harvests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn validate_field(area: Decimal, planting_year: i32) -> Result<(), DbErr> {
    if area <= Decimal::ZERO {
        return Err(DbErr::Custom(
            "Validation failed: area must be positive".to_string(),
        ));
    }
    if planting_year < 1900 {
        return Err(DbErr::Custom(
            "Validation failed: planting_year is implausible".to_string(),
        ));
    }
    Ok(())
}

async fn count_by_status(
    db: &DatabaseConnection,
    field_id: Uuid,
    status: TreatmentStatus,
) -> Result<u64, DbErr> {
    crate::treatments::models::Entity::find()
        .filter(crate::treatments::models::Column::FieldId.eq(field_id))
        .filter(crate::treatments::models::Column::Status.eq(status))
        .count(db)
        .await
}

async fn get_one_field(db: &DatabaseConnection, id: Uuid) -> Result<Field, DbErr> {
    let model = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Field with id '{id}' not found")))?;

    let counts = TreatmentStatusCounts {
        pending: count_by_status(db, id, TreatmentStatus::Pending).await?,
        completed: count_by_status(db, id, TreatmentStatus::Completed).await?,
        delayed: count_by_status(db, id, TreatmentStatus::Delayed).await?,
    };

    let mut field: Field = model.into();
    field.treatment_counts = Some(counts);
    Ok(field)
}

async fn create_field(db: &DatabaseConnection, data: FieldCreate) -> Result<Field, DbErr> {
    validate_field(data.area, data.planting_year)?;
    let active_model: ActiveModel = data.into();
    let inserted = active_model.insert(db).await?;
    Ok(inserted.into())
}

async fn update_field(db: &DatabaseConnection, id: Uuid, data: FieldUpdate) -> Result<Field, DbErr> {
    let txn = db.begin().await?;

    let existing = Entity::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Field with id '{id}' not found")))?;
    let prior_area = existing.area;
    let prior_year = existing.planting_year;

    // Validate the post-merge state; unsent fields keep their stored value.
    let merged = data.merge_into_activemodel(existing.into_active_model())?;
    validate_field(
        merged.area.try_as_ref().copied().unwrap_or(prior_area),
        merged
            .planting_year
            .try_as_ref()
            .copied()
            .unwrap_or(prior_year),
    )?;

    let updated = merged.update(&txn).await?;

    // A resized parcel changes every area-based quantity on it.
    if updated.area != prior_area {
        let treatments = crate::treatments::models::Entity::find()
            .filter(crate::treatments::models::Column::FieldId.eq(id))
            .all(&txn)
            .await?;
        for treatment in &treatments {
            crate::treatments::services::recalculate_line_items(&txn, treatment).await?;
        }
    }

    txn.commit().await?;
    Ok(updated.into())
}
