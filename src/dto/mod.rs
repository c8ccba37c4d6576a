pub mod feed;
pub mod game;
pub mod health;
pub mod reconcile;
pub mod settings;
