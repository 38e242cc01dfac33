pub mod dashboard;
pub mod feed_stream;
pub mod health;
