mod compositor;
mod resize;

pub use compositor::Compositor;
pub use resize::normalize;
