pub mod buffer;
pub mod connection;
pub mod mock;
pub mod pipeline;
pub mod presenter;
pub mod synchronizer;
pub mod telemetry;
pub mod types;

pub const INIT_EVENT: &str = "init";
pub const PRICE_UPDATE_EVENT: &str = "price_update";
pub const NEW_TRANSACTION_EVENT: &str = "new_transaction";
pub const SENTIMENT_UPDATE_EVENT: &str = "sentiment_update";
pub const SCAN_NOTICE_EVENT: &str = "scan_notice";
