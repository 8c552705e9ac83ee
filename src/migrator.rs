use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_units_table::Migration),
            Box::new(m20240101_000002_create_stock_transactions_table::Migration),
            Box::new(m20240101_000003_create_stock_entries_table::Migration),
            Box::new(m20240101_000004_create_invoices_table::Migration),
            Box::new(m20240101_000005_create_payments_table::Migration),
        ]
    }
}

mod m20240101_000001_create_stock_units_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_units_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockUnits::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StockUnits::AvailableQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockUnits::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockUnits::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockUnits::LastUpdatedBy).string().not_null())
                        .col(
                            ColumnDef::new(StockUnits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockUnits::UpdatedAt)
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
                        .name("idx_stock_units_sku")
                        .table(StockUnits::Table)
                        .col(StockUnits::Sku)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockUnits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockUnits {
        Table,
        Id,
        Sku,
        AvailableQuantity,
        ReservedQuantity,
        Version,
        LastUpdatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_transactions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::UnitId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransactions::TransactionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::QuantityChange)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::AvailableBefore)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::AvailableAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::ReservedBefore)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::ReservedAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::Reason).string().not_null())
                        .col(ColumnDef::new(StockTransactions::ReferenceType).string())
                        .col(ColumnDef::new(StockTransactions::ReferenceId).string())
                        .col(
                            ColumnDef::new(StockTransactions::CreatedBy)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::OccurredAt)
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
                        .name("idx_stock_transactions_unit_id")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::UnitId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_reference")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::ReferenceType)
                        .col(StockTransactions::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockTransactions {
        Table,
        Id,
        UnitId,
        TransactionType,
        QuantityChange,
        AvailableBefore,
        AvailableAfter,
        ReservedBefore,
        ReservedAfter,
        Reason,
        ReferenceType,
        ReferenceId,
        CreatedBy,
        OccurredAt,
    }
}

mod m20240101_000003_create_stock_entries_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockEntries::UnitId).uuid().not_null())
                        .col(ColumnDef::new(StockEntries::SupplierId).uuid())
                        .col(
                            ColumnDef::new(StockEntries::QuantityReceived)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockEntries::UnitCost).decimal_len(16, 4))
                        .col(ColumnDef::new(StockEntries::BatchNumber).string())
                        .col(
                            ColumnDef::new(StockEntries::IsProcessed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(StockEntries::ReceivedBy).string().not_null())
                        .col(ColumnDef::new(StockEntries::ProcessedBy).string())
                        .col(ColumnDef::new(StockEntries::ProcessedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(StockEntries::EntryDate)
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
                        .name("idx_stock_entries_unit_id")
                        .table(StockEntries::Table)
                        .col(StockEntries::UnitId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockEntries {
        Table,
        Id,
        UnitId,
        SupplierId,
        QuantityReceived,
        UnitCost,
        BatchNumber,
        IsProcessed,
        ReceivedBy,
        ProcessedBy,
        ProcessedAt,
        EntryDate,
    }
}

mod m20240101_000004_create_invoices_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string().not_null())
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(
                            ColumnDef::new(Invoices::Amount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::Currency).string().not_null())
                        .col(ColumnDef::new(Invoices::Gateway).string().not_null())
                        .col(ColumnDef::new(Invoices::GatewayOrderId).string())
                        .col(ColumnDef::new(Invoices::TransactionId).string())
                        .col(ColumnDef::new(Invoices::CardMetadata).json())
                        .col(ColumnDef::new(Invoices::PaidAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Invoices::CancelledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Invoices::CancellationReason).string())
                        .col(ColumnDef::new(Invoices::RefundedAmount).decimal_len(16, 4))
                        .col(ColumnDef::new(Invoices::RefundedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Invoices::RefundTransactionId).string())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
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
                        .name("idx_invoices_order_id")
                        .table(Invoices::Table)
                        .col(Invoices::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_status")
                        .table(Invoices::Table)
                        .col(Invoices::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        OrderId,
        InvoiceNumber,
        Status,
        Amount,
        Currency,
        Gateway,
        GatewayOrderId,
        TransactionId,
        CardMetadata,
        PaidAt,
        CancelledAt,
        CancellationReason,
        RefundedAmount,
        RefundedAt,
        RefundTransactionId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::Status).string().not_null())
                        .col(ColumnDef::new(Payments::TransactionId).string())
                        .col(ColumnDef::new(Payments::PaidAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
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
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        Method,
        Status,
        TransactionId,
        PaidAt,
        CreatedAt,
        UpdatedAt,
    }
}
