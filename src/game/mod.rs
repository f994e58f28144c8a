pub mod rules;
pub mod san;
pub mod utils;
