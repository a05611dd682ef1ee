use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trip")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub departure_id: i32,
    pub destination_id: i32,
    pub departure_time: DateTimeWithTimeZone,
    pub end_time: DateTimeWithTimeZone,
    /// Capacity at creation; immutable. `seats_available` is the only
    /// seat field that moves.
    pub total_seats: i32,
    pub seats_available: i32,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::DepartureId",
        to = "super::location::Column::Id"
    )]
    Departure,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::DestinationId",
        to = "super::location::Column::Id"
    )]
    Destination,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id"
    )]
    Driver,
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
