// Library surface for the binary, headless integration tests and reuse.
pub mod answers;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod deck;
pub mod exercise;
pub mod flow;
pub mod runtime;
pub mod session;
pub mod speech;
pub mod ui;
pub mod util;
