pub mod query;
pub mod seats;
pub mod team;
pub mod usage;
