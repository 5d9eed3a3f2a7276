pub mod country_codes;
pub mod error;
pub mod merger;
