use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Add the UUID primary key with a backend-appropriate default. Postgres
/// generates ids server-side, SQLite relies on the application setting them.
fn add_uuid_pk<T: IntoIden + 'static>(
    table: &mut TableCreateStatement,
    backend: sea_orm::DatabaseBackend,
    column: T,
) -> Result<(), DbErr> {
    match backend {
        sea_orm::DatabaseBackend::Postgres => {
            table.col(
                ColumnDef::new(column)
                    .uuid()
                    .not_null()
                    .primary_key()
                    .default(Expr::cust("uuid_generate_v4()")),
            );
        }
        sea_orm::DatabaseBackend::Sqlite => {
            table.col(ColumnDef::new(column).uuid().not_null().primary_key());
        }
        _ => {
            return Err(DbErr::Custom("Unsupported database backend".to_string()));
        }
    }
    Ok(())
}

/// Add a column backed by a Postgres enum type; plain text on SQLite.
fn add_enum_column<C: IntoIden + 'static, E: IntoIden + 'static>(
    table: &mut TableCreateStatement,
    backend: sea_orm::DatabaseBackend,
    column: C,
    enum_type: E,
    nullable: bool,
) -> Result<(), DbErr> {
    let mut def = match backend {
        sea_orm::DatabaseBackend::Postgres => {
            let mut def = ColumnDef::new(column);
            def.custom(enum_type);
            def
        }
        sea_orm::DatabaseBackend::Sqlite => {
            let mut def = ColumnDef::new(column);
            def.text();
            def
        }
        _ => {
            return Err(DbErr::Custom("Unsupported database backend".to_string()));
        }
    };
    if !nullable {
        def.not_null();
    }
    table.col(&mut def);
    Ok(())
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[allow(clippy::too_many_lines)] // Large migration requires extensive table definitions
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        // Enable UUID extension for PostgreSQL
        if backend == sea_orm::DatabaseBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";")
                .await?;
        }

        // Create custom types for PostgreSQL (plain text on SQLite)
        if backend == sea_orm::DatabaseBackend::Postgres {
            manager
                .create_type(
                    Type::create()
                        .as_enum(ApplicationType::Table)
                        .values([ApplicationType::Spraying, ApplicationType::Fertigation])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(TreatmentStatus::Table)
                        .values([
                            TreatmentStatus::Pending,
                            TreatmentStatus::Completed,
                            TreatmentStatus::Delayed,
                        ])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(DoseType::Table)
                        .values([
                            DoseType::LPer1000l,
                            DoseType::KgPer1000l,
                            DoseType::LPerHa,
                            DoseType::KgPerHa,
                            DoseType::Pct,
                        ])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(DoseUnit::Table)
                        .values([DoseUnit::Litres, DoseUnit::Kilograms])
                        .to_owned(),
                )
                .await?;
        }

        // Create fields table
        let mut fields_table = Table::create()
            .table(Fields::Table)
            .if_not_exists()
            .col(ColumnDef::new(Fields::Name).text().not_null())
            .col(ColumnDef::new(Fields::Area).decimal_len(12, 4).not_null())
            .col(ColumnDef::new(Fields::Crop).text().not_null())
            .col(ColumnDef::new(Fields::PlantingYear).integer().not_null())
            .col(ColumnDef::new(Fields::Location).text())
            .col(
                ColumnDef::new(Fields::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Fields::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_owned();
        add_uuid_pk(&mut fields_table, backend, Fields::Id)?;
        manager.create_table(fields_table).await?;

        // Create machines table
        let mut machines_table = Table::create()
            .table(Machines::Table)
            .if_not_exists()
            .col(ColumnDef::new(Machines::Name).text().not_null())
            .col(ColumnDef::new(Machines::MachineType).text().not_null())
            .col(ColumnDef::new(Machines::Capacity).integer().not_null())
            .col(
                ColumnDef::new(Machines::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Machines::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_owned();
        add_uuid_pk(&mut machines_table, backend, Machines::Id)?;
        manager.create_table(machines_table).await?;

        // Create product_types table
        let mut product_types_table = Table::create()
            .table(ProductTypes::Table)
            .if_not_exists()
            .col(ColumnDef::new(ProductTypes::Name).text().not_null())
            .col(ColumnDef::new(ProductTypes::Description).text())
            .col(
                ColumnDef::new(ProductTypes::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(ProductTypes::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_owned();
        add_uuid_pk(&mut product_types_table, backend, ProductTypes::Id)?;
        manager.create_table(product_types_table).await?;

        // Create products table
        let mut products_table = Table::create()
            .table(Products::Table)
            .if_not_exists()
            .col(ColumnDef::new(Products::Name).text().not_null())
            .col(ColumnDef::new(Products::ProductTypeId).uuid())
            .col(
                ColumnDef::new(Products::Price)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(ColumnDef::new(Products::SprayingDose).decimal_len(12, 4))
            .col(ColumnDef::new(Products::FertigationDose).decimal_len(12, 4))
            .col(ColumnDef::new(Products::Comments).text())
            .col(
                ColumnDef::new(Products::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Products::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("product_type_products")
                    .from(Products::Table, Products::ProductTypeId)
                    .to(ProductTypes::Table, ProductTypes::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();
        add_uuid_pk(&mut products_table, backend, Products::Id)?;
        add_enum_column(
            &mut products_table,
            backend,
            Products::SprayingDoseType,
            DoseType::Table,
            true,
        )?;
        add_enum_column(
            &mut products_table,
            backend,
            Products::FertigationDoseType,
            DoseType::Table,
            true,
        )?;
        manager.create_table(products_table).await?;

        // Create treatments table
        let mut treatments_table = Table::create()
            .table(Treatments::Table)
            .if_not_exists()
            .col(ColumnDef::new(Treatments::Name).text().not_null())
            .col(ColumnDef::new(Treatments::Date).date().not_null())
            .col(ColumnDef::new(Treatments::FinishDate).date())
            .col(ColumnDef::new(Treatments::FieldId).uuid().not_null())
            .col(ColumnDef::new(Treatments::MachineId).uuid())
            .col(
                ColumnDef::new(Treatments::WaterPerHa)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(ColumnDef::new(Treatments::RealWaterPerHa).decimal_len(12, 2))
            .col(
                ColumnDef::new(Treatments::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Treatments::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("field_treatments")
                    .from(Treatments::Table, Treatments::FieldId)
                    .to(Fields::Table, Fields::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("machine_treatments")
                    .from(Treatments::Table, Treatments::MachineId)
                    .to(Machines::Table, Machines::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();
        add_uuid_pk(&mut treatments_table, backend, Treatments::Id)?;
        add_enum_column(
            &mut treatments_table,
            backend,
            Treatments::ApplicationType,
            ApplicationType::Table,
            false,
        )?;
        add_enum_column(
            &mut treatments_table,
            backend,
            Treatments::Status,
            TreatmentStatus::Table,
            false,
        )?;
        manager.create_table(treatments_table).await?;

        // Create treatment_products table (line items)
        let mut treatment_products_table = Table::create()
            .table(TreatmentProducts::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(TreatmentProducts::TreatmentId)
                    .uuid()
                    .not_null(),
            )
            .col(
                ColumnDef::new(TreatmentProducts::ProductId)
                    .uuid()
                    .not_null(),
            )
            .col(ColumnDef::new(TreatmentProducts::Dose).decimal_len(12, 4))
            .col(ColumnDef::new(TreatmentProducts::TotalDose).decimal_len(12, 4))
            .col(ColumnDef::new(TreatmentProducts::UnitPrice).decimal_len(12, 2))
            .col(
                ColumnDef::new(TreatmentProducts::TotalPrice)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(
                ColumnDef::new(TreatmentProducts::PricePerHa)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(
                ColumnDef::new(TreatmentProducts::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(TreatmentProducts::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("treatment_treatment_products")
                    .from(TreatmentProducts::Table, TreatmentProducts::TreatmentId)
                    .to(Treatments::Table, Treatments::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("product_treatment_products")
                    .from(TreatmentProducts::Table, TreatmentProducts::ProductId)
                    .to(Products::Table, Products::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();
        add_uuid_pk(&mut treatment_products_table, backend, TreatmentProducts::Id)?;
        add_enum_column(
            &mut treatment_products_table,
            backend,
            TreatmentProducts::DoseType,
            DoseType::Table,
            true,
        )?;
        add_enum_column(
            &mut treatment_products_table,
            backend,
            TreatmentProducts::TotalDoseUnit,
            DoseUnit::Table,
            false,
        )?;
        manager.create_table(treatment_products_table).await?;

        // One line item per (treatment, product) pair
        manager
            .create_index(
                Index::create()
                    .name("idx_treatment_products_unique_pair")
                    .table(TreatmentProducts::Table)
                    .col(TreatmentProducts::TreatmentId)
                    .col(TreatmentProducts::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create expenses table
        let mut expenses_table = Table::create()
            .table(Expenses::Table)
            .if_not_exists()
            .col(ColumnDef::new(Expenses::FieldId).uuid())
            .col(ColumnDef::new(Expenses::Description).text().not_null())
            .col(ColumnDef::new(Expenses::ExpenseType).text().not_null())
            .col(
                ColumnDef::new(Expenses::Amount)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(ColumnDef::new(Expenses::Date).date().not_null())
            .col(
                ColumnDef::new(Expenses::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Expenses::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("field_expenses")
                    .from(Expenses::Table, Expenses::FieldId)
                    .to(Fields::Table, Fields::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();
        add_uuid_pk(&mut expenses_table, backend, Expenses::Id)?;
        manager.create_table(expenses_table).await?;

        // Create harvests table
        let mut harvests_table = Table::create()
            .table(Harvests::Table)
            .if_not_exists()
            .col(ColumnDef::new(Harvests::FieldId).uuid().not_null())
            .col(ColumnDef::new(Harvests::Date).date().not_null())
            .col(
                ColumnDef::new(Harvests::Amount)
                    .decimal_len(12, 2)
                    .not_null(),
            )
            .col(
                ColumnDef::new(Harvests::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Harvests::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("field_harvests")
                    .from(Harvests::Table, Harvests::FieldId)
                    .to(Fields::Table, Fields::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();
        add_uuid_pk(&mut harvests_table, backend, Harvests::Id)?;
        manager.create_table(harvests_table).await?;

        // Indexes for the hot lookup paths (cascade + cost aggregation)
        manager
            .create_index(
                Index::create()
                    .name("idx_treatments_field_id")
                    .table(Treatments::Table)
                    .col(Treatments::FieldId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_treatments_date")
                    .table(Treatments::Table)
                    .col(Treatments::Date)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_treatment_products_product_id")
                    .table(TreatmentProducts::Table)
                    .col(TreatmentProducts::ProductId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Harvests::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TreatmentProducts::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Treatments::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ProductTypes::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Machines::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Fields::Table).if_exists().to_owned())
            .await?;

        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .drop_type(Type::drop().name(DoseUnit::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_type(Type::drop().name(DoseType::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_type(
                    Type::drop()
                        .name(TreatmentStatus::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
            manager
                .drop_type(
                    Type::drop()
                        .name(ApplicationType::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }
}

// All table and enum identifiers
#[derive(DeriveIden)]
enum Fields {
    Table,
    Id,
    Name,
    Area,
    Crop,
    PlantingYear,
    Location,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Machines {
    Table,
    Id,
    Name,
    MachineType,
    Capacity,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum ProductTypes {
    Table,
    Id,
    Name,
    Description,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    ProductTypeId,
    Price,
    SprayingDose,
    SprayingDoseType,
    FertigationDose,
    FertigationDoseType,
    Comments,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Treatments {
    Table,
    Id,
    Name,
    ApplicationType,
    Date,
    FinishDate,
    FieldId,
    MachineId,
    WaterPerHa,
    RealWaterPerHa,
    Status,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum TreatmentProducts {
    Table,
    Id,
    TreatmentId,
    ProductId,
    Dose,
    DoseType,
    TotalDose,
    TotalDoseUnit,
    UnitPrice,
    TotalPrice,
    PricePerHa,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Expenses {
    Table,
    Id,
    FieldId,
    Description,
    ExpenseType,
    Amount,
    Date,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Harvests {
    Table,
    Id,
    FieldId,
    Date,
    Amount,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum ApplicationType {
    Table,
    Spraying,
    Fertigation,
}

#[derive(DeriveIden)]
enum TreatmentStatus {
    Table,
    Pending,
    Completed,
    Delayed,
}

#[derive(DeriveIden)]
enum DoseType {
    Table,
    #[sea_orm(iden = "l_per_1000l")]
    LPer1000l,
    #[sea_orm(iden = "kg_per_1000l")]
    KgPer1000l,
    #[sea_orm(iden = "l_per_ha")]
    LPerHa,
    #[sea_orm(iden = "kg_per_ha")]
    KgPerHa,
    #[sea_orm(iden = "pct")]
    Pct,
}

#[derive(DeriveIden)]
enum DoseUnit {
    Table,
    #[sea_orm(iden = "L")]
    Litres,
    #[sea_orm(iden = "kg")]
    Kilograms,
}
