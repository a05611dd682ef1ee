use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdminLog::Table)
                    .if_not_exists()
                    .col(pk_auto(AdminLog::Id))
                    .col(uuid(AdminLog::AdminId).not_null())
                    .col(string_len(AdminLog::Action, 100).not_null())
                    .col(string_null(AdminLog::Details))
                    .col(
                        timestamp_with_time_zone(AdminLog::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdminLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum AdminLog {
    Table,
    Id,
    AdminId,
    Action,
    Details,
    CreatedAt,
}
