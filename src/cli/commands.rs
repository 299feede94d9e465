pub mod create_admin;
pub mod initdb;
pub mod load_ingredients;
pub mod migrate_and_serve;
pub mod serve;

pub use create_admin::create_admin;
pub use initdb::init_database;
pub use load_ingredients::load_ingredients;
pub use migrate_and_serve::migrate_and_serve;
pub use serve::serve;
