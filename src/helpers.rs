pub mod images;
pub mod json;
pub mod pagination;
pub mod query;
pub mod viewer;
