pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod media;
pub mod settings;
pub mod platform {
    pub mod lock;
}
pub mod tasks {
    pub mod loader;
    pub mod scanner;
    pub mod sequencer;
}
