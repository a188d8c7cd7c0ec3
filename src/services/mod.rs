pub mod dashboard_service;
pub mod seat_aggregator;
pub mod time_buckets;
