use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_locations::Location;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Trip::Table)
                    .if_not_exists()
                    .col(uuid(Trip::Id).primary_key())
                    .col(uuid(Trip::DriverId).not_null())
                    .col(integer(Trip::DepartureId).not_null())
                    .col(integer(Trip::DestinationId).not_null())
                    .col(timestamp_with_time_zone(Trip::DepartureTime).not_null())
                    .col(timestamp_with_time_zone(Trip::EndTime).not_null())
                    .col(integer(Trip::TotalSeats).not_null())
                    .col(integer(Trip::SeatsAvailable).not_null())
                    .col(double_null(Trip::Price))
                    .col(string_null(Trip::Vehicle))
                    .col(boolean(Trip::IsActive).not_null().default(true))
                    .col(
                        timestamp_with_time_zone(Trip::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_driver")
                            .from(Trip::Table, Trip::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_departure")
                            .from(Trip::Table, Trip::DepartureId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_destination")
                            .from(Trip::Table, Trip::DestinationId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trip::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trip {
    Table,
    Id,
    DriverId,
    DepartureId,
    DestinationId,
    DepartureTime,
    EndTime,
    TotalSeats,
    SeatsAvailable,
    Price,
    Vehicle,
    IsActive,
    CreatedAt,
}
