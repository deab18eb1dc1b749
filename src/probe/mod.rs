pub mod http_probe;
pub mod interval;
pub mod model;
pub mod schedule;
