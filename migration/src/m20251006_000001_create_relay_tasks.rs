use sea_orm_migration::prelude::*;

use entity::tasks as Tasks;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20251006_000001_create_relay_tasks"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tasks::Column::OriginTaskId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tasks::Column::SettlementTaskId).string().null())
                    .col(ColumnDef::new(Tasks::Column::ExternalComputeId).string().null())
                    .col(ColumnDef::new(Tasks::Column::ServiceId).string().not_null())
                    .col(
                        ColumnDef::new(Tasks::Column::RequesterAddress)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tasks::Column::Amount).string().not_null())
                    .col(
                        ColumnDef::new(Tasks::Column::EventTimestamp)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tasks::Column::Status).integer().not_null())
                    .col(ColumnDef::new(Tasks::Column::ResultHash).string().null())
                    .col(ColumnDef::new(Tasks::Column::PendingResult).string().null())
                    .col(ColumnDef::new(Tasks::Column::ErrorMsg).string().null())
                    .col(
                        ColumnDef::new(Tasks::Column::FallbackAttempted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tasks::Column::CreateAt).big_integer().not_null())
                    .col(ColumnDef::new(Tasks::Column::UpdateAt).big_integer().not_null())
                    .col(ColumnDef::new(Tasks::Column::CompleteAt).big_integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_relay_tasks_status")
                    .table(Tasks::Entity)
                    .col(Tasks::Column::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tasks::Entity).to_owned())
            .await
    }
}
