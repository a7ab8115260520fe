pub mod approval;
pub mod audit;
pub mod keys;
pub mod rate_limit;
