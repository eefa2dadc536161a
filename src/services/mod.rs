pub mod checkout;
pub mod ledger;
pub mod price_feed;
pub mod settlement;
pub mod wallet;
