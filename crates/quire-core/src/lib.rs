//! Quire Core Library
//!
//! Configuration, frontmatter, template values and error handling shared by
//! the Quire build pipeline.

pub mod config;
pub mod error;
pub mod frontmatter;
pub mod value;

pub use config::Config;
pub use error::{CoreError, Result};
pub use frontmatter::{Frontmatter, Permalink};
pub use value::{Value, parse_date};
