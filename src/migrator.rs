use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_orders_table::Migration),
            Box::new(m20240101_000002_create_order_stages_table::Migration),
            Box::new(m20240101_000003_create_custom_stages_table::Migration),
        ]
    }
}

mod m20240101_000001_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNo)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerContact).string().null())
                        .col(ColumnDef::new(Orders::ProductName).string().not_null())
                        .col(ColumnDef::new(Orders::Sku).string().null())
                        .col(ColumnDef::new(Orders::SubType).string().null())
                        .col(
                            ColumnDef::new(Orders::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Orders::PricePerUnit).decimal_len(12, 2).null())
                        .col(ColumnDef::new(Orders::OrderTotal).decimal_len(14, 2).null())
                        .col(ColumnDef::new(Orders::ShippingAddress).text().null())
                        .col(ColumnDef::new(Orders::OrderNotes).text().null())
                        .col(
                            ColumnDef::new(Orders::Priority)
                                .string_len(16)
                                .not_null()
                                .default("normal"),
                        )
                        .col(
                            ColumnDef::new(Orders::Source)
                                .string_len(32)
                                .not_null()
                                .default("manual"),
                        )
                        .col(
                            ColumnDef::new(Orders::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(Orders::DeliveryDate).date().null())
                        .col(ColumnDef::new(Orders::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNo,
        CustomerName,
        CustomerContact,
        ProductName,
        Sku,
        SubType,
        Quantity,
        PricePerUnit,
        OrderTotal,
        ShippingAddress,
        OrderNotes,
        Priority,
        Source,
        Status,
        DeliveryDate,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_order_stages_table {

    use super::m20240101_000001_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_order_stages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::order_stage Model
            manager
                .create_table(
                    Table::create()
                        .table(OrderStages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderStages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStages::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderStages::StageName).string().not_null())
                        .col(
                            ColumnDef::new(OrderStages::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderStages::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(OrderStages::AssignedTo).string().null())
                        .col(
                            ColumnDef::new(OrderStages::StartTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderStages::EndTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderStages::EstimatedTimeHours)
                                .decimal_len(8, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderStages::TimeTakenHours)
                                .decimal_len(8, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderStages::WastagePercentage)
                                .decimal_len(5, 2)
                                .null(),
                        )
                        .col(ColumnDef::new(OrderStages::QualityRemarks).text().null())
                        .col(ColumnDef::new(OrderStages::Notes).text().null())
                        .col(
                            ColumnDef::new(OrderStages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderStages::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_stages_order_id")
                                .from(OrderStages::Table, OrderStages::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_stages_order_id")
                        .table(OrderStages::Table)
                        .col(OrderStages::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderStages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderStages {
        Table,
        Id,
        OrderId,
        StageName,
        Position,
        Status,
        AssignedTo,
        StartTime,
        EndTime,
        EstimatedTimeHours,
        TimeTakenHours,
        WastagePercentage,
        QualityRemarks,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_custom_stages_table {

    use chrono::Utc;
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::ConnectionTrait;
    use uuid::Uuid;

    use crate::services::stage_catalog::DEFAULT_STAGE_CATALOG;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_custom_stages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::custom_stage Model
            manager
                .create_table(
                    Table::create()
                        .table(CustomStages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomStages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomStages::StageName)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(CustomStages::DisplayOrder)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomStages::Department).string().null())
                        .col(
                            ColumnDef::new(CustomStages::EstimatedHours)
                                .decimal_len(8, 2)
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(CustomStages::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(CustomStages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CustomStages::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            let now = Utc::now();
            let mut insert = Query::insert();
            insert.into_table(CustomStages::Table).columns([
                CustomStages::Id,
                CustomStages::StageName,
                CustomStages::DisplayOrder,
                CustomStages::Department,
                CustomStages::EstimatedHours,
                CustomStages::IsActive,
                CustomStages::CreatedAt,
                CustomStages::UpdatedAt,
            ]);
            for (index, stage) in DEFAULT_STAGE_CATALOG.iter().enumerate() {
                insert
                    .values([
                        Uuid::new_v4().into(),
                        stage.name.into(),
                        (index as i32 + 1).into(),
                        stage.department.into(),
                        stage.estimated_hours().into(),
                        true.into(),
                        now.into(),
                        now.into(),
                    ])
                    .map_err(|e| DbErr::Custom(format!("Failed to seed stage catalog: {}", e)))?;
            }

            let db = manager.get_connection();
            db.execute(manager.get_database_backend().build(&insert))
                .await?;
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CustomStages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CustomStages {
        Table,
        Id,
        StageName,
        DisplayOrder,
        Department,
        EstimatedHours,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}
