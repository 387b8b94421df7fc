pub mod text;
pub mod wfdb;

pub use text::{parse_sample_matrix, read_sample_matrix, write_sample_matrix};
pub use wfdb::{header_or_default, load_wfdb_record, read_header, RecordHeader, RecordMetadata};
