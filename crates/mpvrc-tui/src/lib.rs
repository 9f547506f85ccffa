//! mpvrc front end: event stream, command client, and terminal UI.

pub mod action;
pub mod app;
pub mod client;
pub mod controller;
pub mod file_picker;
pub mod lifecycle;
pub mod theme;
pub mod view;
pub mod widgets;
