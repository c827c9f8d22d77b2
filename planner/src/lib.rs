pub mod app;
pub mod arm;
pub mod board;
pub mod chess;
pub mod config;
pub mod error;
pub mod moves;
pub mod termdev;
