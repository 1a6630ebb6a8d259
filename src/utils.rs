/// 把连续空白折叠成单个空格，供压缩输出使用。
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按层级生成缩进。
pub fn indent(level: usize) -> String {
    "  ".repeat(level)
}

/// 数值的 CSS 文本形式：最多四位小数，去掉尾零。
pub fn format_number(value: f64) -> String {
    let mut value = value;
    if value.abs() < 1e-9 {
        value = 0.0;
    }
    let mut formatted = format!("{value:.4}");
    while formatted.contains('.') && formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    formatted
}
