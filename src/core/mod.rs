// Core modules implementing line scanning, record assembly, and error modeling.
pub mod error;
pub mod reader;
pub mod scanner;
