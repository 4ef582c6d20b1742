//! Sources of fully rendered page HTML.

pub mod web;

pub use web::{WebDriverFactory, WebDriverRenderer};

use crate::error::Result;
use async_trait::async_trait;

/// A live browser session able to render pages
#[async_trait]
pub trait Renderer: Send {
    /// HTML of `url` after its scripts have run
    async fn fetch_rendered_html(&mut self, url: &str) -> Result<String>;

    /// Ends the session; later fetches fail
    async fn close(&mut self) -> Result<()>;
}

/// Opens render sessions
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Renderer>>;
}
