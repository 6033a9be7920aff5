use crate::error::Result;
use crate::types::Frame;

/// An open connection to one camera. Reads block for at most the
/// implementation's own timeout.
pub trait StreamSource: Send {
    fn is_open(&self) -> bool;
    fn read_frame(&mut self) -> Result<Frame>;
    fn release(&mut self);
}

pub trait StreamOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn StreamSource>>;
}

pub trait Renderer {
    fn render_window(&mut self, title: &str, image: &Frame) -> Result<()>;
    /// True once the user asked to quit.
    fn poll_exit_key(&mut self) -> bool;
    fn close(&mut self) {}
}
