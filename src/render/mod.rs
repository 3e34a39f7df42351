//! External-facing renderers: Markdown conversion and schema graphics.

pub mod graphic;
pub mod markdown;
