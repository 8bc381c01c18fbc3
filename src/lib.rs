pub mod apis;
pub mod date_range;
pub mod invoices;
pub mod jobs;
pub mod money;
pub mod normalize;
pub mod parse;
pub mod sources;
pub mod tools;
pub mod utils;
