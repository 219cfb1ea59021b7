pub mod config;
pub mod platforms;
pub mod run;
