mod dto;
mod model;

pub use dto::{map_rows, CodeRow, VideoRow};
pub use model::{CodeRecord, CodeStyle, ScanEvent, ScanLocation, VideoRecord};
