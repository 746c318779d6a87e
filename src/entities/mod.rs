//! Entity types shared between the cache worker and the render path
//!
//! Comments and rasters cross threads; the seams (source, displayer,
//! surface) stay external so applications can plug in their own stacks.

pub mod comment;
pub mod displayer;
pub mod raster;
pub mod source;

pub use comment::{Comment, CommentKind, CommentRef};
pub use displayer::{BuildError, Displayer, MonoDisplayer, Surface};
pub use raster::Raster;
pub use source::{CommentSource, SortedComments};
