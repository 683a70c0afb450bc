use crate::products::models::{DoseType, DoseUnit};
use chrono::{DateTime, Utc};
use crudcrate::EntityToModels;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// One product applied by a treatment. `dose` is the per-unit rate, never the
/// plot total; `total_dose` is the absolute quantity for the whole plot. Both
/// are kept in sync by the treatment services, which also resolve missing
/// values from the product catalog.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "treatment_products")]
#[crudcrate(
    api_struct = "TreatmentProduct",
    name_singular = "treatment product",
    name_plural = "treatment products",
    description = "A product line item of a treatment, with its dose and derived cost."
)]
pub struct Model {
    // The id stays in the update model so nested updates can address
    // existing line items.
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[crudcrate(create_model = false, update_model = false, on_create = Uuid::nil(), sortable, filterable)]
    pub treatment_id: Uuid,
    #[crudcrate(sortable, filterable)]
    pub product_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub dose: Option<Decimal>,
    #[crudcrate(filterable)]
    pub dose_type: Option<DoseType>,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub total_dose: Option<Decimal>,
    #[crudcrate(create_model = false, update_model = false, on_create = DoseUnit::Litres)]
    pub total_dose_unit: DoseUnit,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub unit_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[crudcrate(create_model = false, update_model = false, on_create = Decimal::ZERO, sortable)]
    pub total_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[crudcrate(create_model = false, update_model = false, on_create = Decimal::ZERO, sortable)]
    pub price_per_ha: Decimal,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model=false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::treatments::models::Entity",
        from = "Column::TreatmentId",
        to = "crate::treatments::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Treatments,
    #[sea_orm(
        belongs_to = "crate::products::models::Entity",
        from = "Column::ProductId",
        to = "crate::products::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Products,
}

impl Related<crate::treatments::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Treatments.def()
    }
}

impl Related<crate::products::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
