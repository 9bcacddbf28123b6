//! 日志与事件里使用的文本截断

/// 按字符截断到 max_chars，超出部分以 "..." 表示
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
