pub mod announcement;
pub mod files;

pub use announcement::Announcement;
pub use files::{parse_file_list, FileEntryExternal, FileListExternal, FormatError};

/// Skip an optional UTF-8 BOM and leading ASCII whitespace. Some servers emit either,
/// which `serde_json::from_slice` rejects.
pub(crate) fn trim_json_prefix(data: &[u8]) -> &[u8] {
    let mut start = 0usize;
    if data.len() >= 3 && data[0] == 0xEF && data[1] == 0xBB && data[2] == 0xBF {
        start = 3;
    }
    while start < data.len() && data[start].is_ascii_whitespace() {
        start += 1;
    }
    &data[start..]
}
