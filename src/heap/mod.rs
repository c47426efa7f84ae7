pub mod encoder;
mod heap_file;
mod scan;

pub use heap_file::HeapFile;
pub use scan::HeapScan;
