pub mod loader;

pub use loader::load_monthly_table;
