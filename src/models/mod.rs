//! Domain model module declarations.

pub mod catalog;
pub mod inquiry;
