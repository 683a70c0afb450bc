use super::calculations::MachineLoads;
use super::products::models::{TreatmentProduct, TreatmentProductList};
use chrono::{DateTime, NaiveDate, Utc};
use crudcrate::{CRUDResource, EntityToModels};
use rust_decimal::Decimal;
use sea_orm::{
    DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, entity::prelude::*,
};
// Import after EntityToModels to avoid conflicts
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "application_type")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    #[sea_orm(string_value = "spraying")]
    Spraying,
    #[sea_orm(string_value = "fertigation")]
    Fertigation,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "treatment_status")]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "delayed")]
    Delayed,
}

impl TreatmentStatus {
    /// Status is never stored by the client: a finish date means completed,
    /// a scheduled date in the past means delayed, anything else is pending.
    pub fn derive(finish_date: Option<NaiveDate>, scheduled: NaiveDate, today: NaiveDate) -> Self {
        if finish_date.is_some() {
            TreatmentStatus::Completed
        } else if scheduled < today {
            TreatmentStatus::Delayed
        } else {
            TreatmentStatus::Pending
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "treatments")]
#[crudcrate(
    generate_router,
    api_struct = "Treatment",
    name_singular = "treatment",
    name_plural = "treatments",
    description = "Spraying and fertigation treatments with their product line items.",
    fn_get_one = get_one_treatment,
    fn_get_all = get_all_treatments,
    fn_create = create_treatment_with_products,
    fn_update = update_treatment_with_products,
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub name: String,
    #[crudcrate(sortable, filterable, enum_field)]
    pub application_type: ApplicationType,
    #[crudcrate(sortable, filterable)]
    pub date: NaiveDate,
    #[crudcrate(sortable, filterable)]
    pub finish_date: Option<NaiveDate>,
    #[crudcrate(sortable, filterable)]
    pub field_id: Uuid,
    #[crudcrate(sortable, filterable)]
    pub machine_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[crudcrate(sortable, filterable)]
    pub water_per_ha: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub real_water_per_ha: Option<Decimal>,
    // Derived on every write, never taken from the client.
    #[crudcrate(create_model = false, update_model = false, on_create = TreatmentStatus::Pending, sortable, filterable, enum_field)]
    pub status: TreatmentStatus,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model=false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
    #[sea_orm(ignore)]
    #[crudcrate(non_db_attr = true, default = vec![], use_target_models)]
    pub products: Vec<crate::treatments::products::models::TreatmentProduct>,
    #[sea_orm(ignore)]
    #[crudcrate(non_db_attr = true, default = None, list_model=false)]
    pub loads: Option<MachineLoads>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::fields::models::Entity",
        from = "Column::FieldId",
        to = "crate::fields::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Fields,
    #[sea_orm(
        belongs_to = "crate::machines::models::Entity",
        from = "Column::MachineId",
        to = "crate::machines::models::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    Machines,
    #[sea_orm(has_many = "crate::treatments::products::models::Entity")]
    TreatmentProducts,
}

impl Related<crate::fields::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fields.def()
    }
}

impl Related<crate::machines::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Machines.def()
    }
}

impl Related<crate::treatments::products::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TreatmentProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Water rate the dose arithmetic should use: the measured rate once one
    /// has been recorded, the planned rate before that.
    pub fn effective_water_per_ha(&self) -> Decimal {
        match self.real_water_per_ha {
            Some(real) if real > Decimal::ZERO => real,
            _ => self.water_per_ha,
        }
    }
}

async fn get_one_treatment(db: &DatabaseConnection, id: Uuid) -> Result<Treatment, DbErr> {
    let model = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Treatment with id '{id}' not found")))?;

    let line_items = model
        .find_related(crate::treatments::products::models::Entity)
        .order_by_asc(crate::treatments::products::models::Column::CreatedAt)
        .all(db)
        .await?;

    let loads = super::services::load_plan(db, &model).await?;

    let mut treatment: Treatment = model.into();
    treatment.products = line_items.into_iter().map(TreatmentProduct::from).collect();
    treatment.loads = loads;
    Ok(treatment)
}

async fn get_all_treatments(
    db: &DatabaseConnection,
    condition: &sea_orm::Condition,
    order_column: Column,
    order_direction: sea_orm::Order,
    offset: u64,
    limit: u64,
) -> Result<Vec<TreatmentList>, DbErr> {
    let models = Entity::find()
        .filter(condition.clone())
        .order_by(order_column, order_direction)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    let mut treatments: Vec<TreatmentList> = Vec::new();
    for model in models {
        let line_items = model
            .find_related(crate::treatments::products::models::Entity)
            .all(db)
            .await?;
        let mut list_item = TreatmentList::from(model);
        list_item.products = line_items
            .into_iter()
            .map(TreatmentProductList::from)
            .collect();
        treatments.push(list_item);
    }
    Ok(treatments)
}

async fn create_treatment_with_products(
    db: &DatabaseConnection,
    create_data: TreatmentCreate,
) -> Result<Treatment, DbErr> {
    let id = super::services::create_treatment(db, create_data).await?;
    Treatment::get_one(db, id).await
}

async fn update_treatment_with_products(
    db: &DatabaseConnection,
    id: Uuid,
    update_data: TreatmentUpdate,
) -> Result<Treatment, DbErr> {
    super::services::update_treatment(db, id, update_data).await?;
    Treatment::get_one(db, id).await
}
