pub mod accounts;
pub mod backup;
pub mod core;
pub mod exports;
pub mod faculties;
pub mod import;
pub mod reports;
pub mod sessions;
