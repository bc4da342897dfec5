//! Built-in transforms
//!
//! Real per-filetype transforms (transpilers, preprocessors) live outside the
//! engine and are registered by the embedding application. These built-ins
//! cover the file types the engine needs to handle on its own.

mod extract_css;
mod identity;
mod json;
mod raw;

pub use extract_css::ExtractCssTransform;
pub use identity::IdentityTransform;
pub use json::JsonTransform;
pub use raw::RawTransform;
