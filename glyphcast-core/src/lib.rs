pub mod frame;
pub mod glyph;
pub mod color;
pub mod imaging;
pub mod render;
