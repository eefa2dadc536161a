pub mod booking;
pub mod checkout;
pub mod trip;
pub mod user;
