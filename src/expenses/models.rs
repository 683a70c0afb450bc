use chrono::{DateTime, NaiveDate, Utc};
use crudcrate::{CRUDResource, EntityToModels};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
// Import after EntityToModels to avoid conflicts
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "expenses")]
#[crudcrate(
    generate_router,
    api_struct = "Expense",
    name_singular = "expense",
    name_plural = "expenses",
    description = "Standalone farm expenses outside the treatment cost engine (fuel, labour, repairs).",
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[crudcrate(sortable, filterable)]
    pub field_id: Option<Uuid>,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable)]
    pub expense_type: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[crudcrate(sortable, filterable)]
    pub amount: Decimal,
    #[crudcrate(sortable, filterable)]
    pub date: NaiveDate,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model=false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::fields::models::Entity",
        from = "Column::FieldId",
        to = "crate::fields::models::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Fields,
}

impl Related<crate::fields::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fields.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
