pub(crate) mod auth;
pub(crate) mod bookings;
pub(crate) mod checkout;
pub(crate) mod trips;
pub(crate) mod users;
