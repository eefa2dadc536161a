pub mod auth;
pub mod bookings;
pub mod checkout;
pub mod trips;
pub mod users;
