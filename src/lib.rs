pub mod hotkey;
pub mod logging;
pub mod measure;
pub mod settings;
