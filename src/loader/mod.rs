pub mod descriptor;
pub mod parser;
