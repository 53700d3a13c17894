pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod access {
    pub mod evaluator;
    pub mod ownership;
    pub mod session;
    pub mod throttle;
}
pub mod api {
    pub mod errors;
    pub mod hilfen;
    pub mod viewer;
}
pub mod db {
    pub mod file_repository;
    pub mod models;
    pub mod repository;
}
pub mod rendering {
    pub mod markdown;
    pub mod view;
}
