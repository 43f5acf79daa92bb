pub mod accounts;
pub mod categories;
pub mod clips;
pub mod sessions;
