mod image;
mod port;
mod reader;

#[doc(hidden)]
pub mod mock;

pub use image::{DEFAULT_IMAGE_BASE, ImageFile};
pub use port::{AttachTarget, MemoryPort, ModuleInfo, ProcessInfo};
pub use reader::MemoryReader;

#[doc(hidden)]
pub use mock::{MockMemory, MockMemoryBuilder};
