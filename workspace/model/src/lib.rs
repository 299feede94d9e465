//! Relational data model of the recipe service.

pub mod entities;
