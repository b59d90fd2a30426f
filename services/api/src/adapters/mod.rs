pub mod db;
mod search_sql;

pub use db::DbAdapter;
