use crate::treatments::models::ApplicationType;
use chrono::{DateTime, Utc};
use crudcrate::{CRUDResource, EntityToModels, traits::MergeIntoActiveModel};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, entity::prelude::*,
};
// Import after EntityToModels to avoid conflicts
use uuid::Uuid;

/// Unit convention a recommended dose is expressed in. A closed enum so the
/// conversion arithmetic lives next to the variants instead of string
/// matching scattered across call sites.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "dose_type")]
pub enum DoseType {
    #[sea_orm(string_value = "l_per_1000l")]
    #[serde(rename = "l_per_1000l")]
    LitresPer1000L,
    #[sea_orm(string_value = "kg_per_1000l")]
    #[serde(rename = "kg_per_1000l")]
    KilogramsPer1000L,
    #[sea_orm(string_value = "l_per_ha")]
    #[serde(rename = "l_per_ha")]
    LitresPerHectare,
    #[sea_orm(string_value = "kg_per_ha")]
    #[serde(rename = "kg_per_ha")]
    KilogramsPerHectare,
    #[sea_orm(string_value = "pct")]
    #[serde(rename = "pct")]
    Percent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "dose_unit")]
pub enum DoseUnit {
    #[sea_orm(string_value = "L")]
    #[serde(rename = "L")]
    Litres,
    #[sea_orm(string_value = "kg")]
    #[serde(rename = "kg")]
    Kilograms,
}

impl DoseType {
    /// Physical unit of the absolute quantity. Percent doses always resolve
    /// to litres of product in the carrier water.
    pub fn unit(self) -> DoseUnit {
        match self {
            DoseType::KilogramsPer1000L | DoseType::KilogramsPerHectare => DoseUnit::Kilograms,
            DoseType::LitresPer1000L | DoseType::LitresPerHectare | DoseType::Percent => {
                DoseUnit::Litres
            }
        }
    }

    /// Dose scales with treated area only; water volume is irrelevant.
    pub fn is_area_based(self) -> bool {
        matches!(
            self,
            DoseType::LitresPerHectare | DoseType::KilogramsPerHectare
        )
    }

    /// Litres of carrier water one dose unit refers to. A future
    /// `*_per_2000l` variant only needs a new divisor here.
    pub fn water_divisor(self) -> Option<Decimal> {
        match self {
            DoseType::LitresPer1000L | DoseType::KilogramsPer1000L => Some(Decimal::from(1000)),
            DoseType::Percent => Some(Decimal::from(100)),
            DoseType::LitresPerHectare | DoseType::KilogramsPerHectare => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DoseType::LitresPer1000L => "L/1000L water",
            DoseType::KilogramsPer1000L => "kg/1000L water",
            DoseType::LitresPerHectare => "L/ha",
            DoseType::KilogramsPerHectare => "kg/ha",
            DoseType::Percent => "%",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "products")]
#[crudcrate(
    generate_router,
    api_struct = "Product",
    name_singular = "product",
    name_plural = "products",
    description = "Catalog of spraying and fertigation products with their recommended doses and prices.",
    fn_create = create_product,
    fn_update = update_product,
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub name: String,
    #[crudcrate(sortable, filterable)]
    pub product_type_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    #[crudcrate(sortable, filterable)]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub spraying_dose: Option<Decimal>,
    #[crudcrate(filterable)]
    pub spraying_dose_type: Option<DoseType>,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    #[crudcrate(sortable, filterable)]
    pub fertigation_dose: Option<Decimal>,
    #[crudcrate(filterable)]
    pub fertigation_dose_type: Option<DoseType>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub comments: Option<String>,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model=false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::product_types::models::Entity",
        from = "Column::ProductTypeId",
        to = "crate::product_types::models::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    ProductTypes,
    #[sea_orm(has_many = "crate::treatments::products::models::Entity")]
    TreatmentProducts,
}

impl Related<crate::product_types::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductTypes.def()
    }
}

impl Related<crate::treatments::products::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TreatmentProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The configured (dose, dose type) pair for an application method, or
    /// None when the product is not set up for it.
    pub fn dose_pair(&self, application_type: ApplicationType) -> Option<(Decimal, DoseType)> {
        match application_type {
            ApplicationType::Spraying => Option::zip(self.spraying_dose, self.spraying_dose_type),
            ApplicationType::Fertigation => {
                Option::zip(self.fertigation_dose, self.fertigation_dose_type)
            }
        }
    }

    pub fn supports(&self, application_type: ApplicationType) -> bool {
        self.dose_pair(application_type).is_some()
    }
}

/// A dose pair is either fully set or fully absent; at least one pair must be
/// configured, and fertigation doses are plot-wide (per-hectare only).
fn validate_dose_configuration(
    price: Decimal,
    spraying_dose: Option<Decimal>,
    spraying_dose_type: Option<DoseType>,
    fertigation_dose: Option<Decimal>,
    fertigation_dose_type: Option<DoseType>,
) -> Result<(), DbErr> {
    if price.is_sign_negative() {
        return Err(DbErr::Custom(
            "Validation failed: price must not be negative".to_string(),
        ));
    }

    if spraying_dose.is_some() != spraying_dose_type.is_some() {
        return Err(DbErr::Custom(
            "Validation failed: spraying_dose and spraying_dose_type must be set together"
                .to_string(),
        ));
    }

    if fertigation_dose.is_some() != fertigation_dose_type.is_some() {
        return Err(DbErr::Custom(
            "Validation failed: fertigation_dose and fertigation_dose_type must be set together"
                .to_string(),
        ));
    }

    if spraying_dose.is_none() && fertigation_dose.is_none() {
        return Err(DbErr::Custom(
            "Validation failed: dose configuration requires at least one of spraying or fertigation"
                .to_string(),
        ));
    }

    if let Some(dose_type) = fertigation_dose_type {
        if !dose_type.is_area_based() {
            return Err(DbErr::Custom(
                "Validation failed: fertigation_dose_type must be per hectare".to_string(),
            ));
        }
    }

    Ok(())
}

async fn create_product(db: &DatabaseConnection, data: ProductCreate) -> Result<Product, DbErr> {
    validate_dose_configuration(
        data.price,
        data.spraying_dose,
        data.spraying_dose_type,
        data.fertigation_dose,
        data.fertigation_dose_type,
    )?;

    let active_model: ActiveModel = data.into();
    let inserted = active_model.insert(db).await?;
    Ok(inserted.into())
}

async fn update_product(
    db: &DatabaseConnection,
    id: Uuid,
    data: ProductUpdate,
) -> Result<Product, DbErr> {
    let existing = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("Product with id '{id}' not found")))?;

    let prior = existing.clone();
    let merged = data.merge_into_activemodel(existing.into_active_model())?;

    // Validate the post-merge state so a partial update cannot leave the
    // product without a usable dose pair; unsent fields keep their stored
    // value.
    validate_dose_configuration(
        merged.price.try_as_ref().copied().unwrap_or(prior.price),
        merged
            .spraying_dose
            .try_as_ref()
            .copied()
            .unwrap_or(prior.spraying_dose),
        merged
            .spraying_dose_type
            .try_as_ref()
            .copied()
            .unwrap_or(prior.spraying_dose_type),
        merged
            .fertigation_dose
            .try_as_ref()
            .copied()
            .unwrap_or(prior.fertigation_dose),
        merged
            .fertigation_dose_type
            .try_as_ref()
            .copied()
            .unwrap_or(prior.fertigation_dose_type),
    )?;

    let updated = merged.update(db).await?;
    Ok(updated.into())
}
