pub mod files;
pub mod generate;
pub mod health;
pub mod process;
pub mod styles;
