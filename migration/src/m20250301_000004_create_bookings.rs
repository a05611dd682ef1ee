use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000003_create_trips::Trip;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Booking::Table)
                    .if_not_exists()
                    .col(uuid(Booking::Id).primary_key())
                    .col(uuid(Booking::TripId).not_null())
                    .col(uuid(Booking::PassengerId).not_null())
                    .col(integer(Booking::Seats).not_null())
                    .col(string_len(Booking::Status, 16).not_null())
                    // Stored as text; legacy rows may carry non-ISO encodings,
                    // so parsing lives in the store adapter.
                    .col(string_len(Booking::BookingTime, 64).not_null())
                    .col(string_null(Booking::NotifyRef))
                    .col(string_null(Booking::TripOutcome))
                    .col(integer_null(Booking::Rating))
                    .col(string_null(Booking::RatingComment))
                    .col(timestamp_with_time_zone_null(Booking::RatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_trip")
                            .from(Booking::Table, Booking::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_passenger")
                            .from(Booking::Table, Booking::PassengerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_booking_trip_status")
                    .table(Booking::Table)
                    .col(Booking::TripId)
                    .col(Booking::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Booking::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Booking {
    Table,
    Id,
    TripId,
    PassengerId,
    Seats,
    Status,
    BookingTime,
    NotifyRef,
    TripOutcome,
    Rating,
    RatingComment,
    RatedAt,
}
