pub use projection::project;
pub use reader::Reader;

mod projection;
mod reader;
