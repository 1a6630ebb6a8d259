use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Node, Token, Variant};
use crate::error::{SassError, SassResult};
use crate::parser::SassParser;

/// 带协议前缀或以 `//` 开头的目标按纯 CSS 导入处理。
static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z][a-z0-9+.-]*:|//)").expect("url scheme pattern"));

/// 递归展开文件型 `@import`：目标解析、解析结果接入当前位置，
/// 并通过缓存与导入栈处理重复与循环导入。
pub struct ImportResolver<'a> {
    parser: &'a SassParser,
    include_paths: Vec<PathBuf>,
    cache: HashMap<PathBuf, Node>,
    stack: Vec<PathBuf>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(parser: &'a SassParser, include_paths: &[PathBuf]) -> Self {
        Self {
            parser,
            include_paths: include_paths.to_vec(),
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn expand(&mut self, root: Node, current_dir: Option<&Path>) -> SassResult<Node> {
        let mut expanded = Vec::new();
        for child in root.children() {
            if child.variant() != Variant::CssImport {
                expanded.push(child);
                continue;
            }
            let url = child.child(0);
            let raw = url.token().map(Token::text).unwrap_or("").to_string();
            let target = url.token().map(Token::unquote).unwrap_or("").to_string();
            if Self::is_css_target(&raw, &target) {
                expanded.push(child);
                continue;
            }

            let resolved = self.resolve_path(&target, current_dir, &child)?;
            if self.stack.contains(&resolved) {
                return Err(SassError::eval(
                    format!("import loop detected at {}", resolved.display()),
                    child.path(),
                    child.line(),
                ));
            }
            self.stack.push(resolved.clone());
            let stylesheet = self.load(&resolved)?;
            let parent = resolved.parent().map(Path::to_path_buf);
            let inner = self.expand(stylesheet, parent.as_deref())?;
            for statement in inner.children() {
                expanded.push(statement);
            }
            self.stack.pop();
        }
        root.replace_children(expanded);
        Ok(root)
    }

    fn load(&mut self, path: &Path) -> SassResult<Node> {
        if let Some(cached) = self.cache.get(path) {
            // 每个使用点拿独立的子树，避免同一节点被求值两次
            return Ok(cached.deep_clone());
        }
        let display = path.display().to_string();
        let content =
            fs::read_to_string(path).map_err(|err| SassError::read(err.to_string(), &display))?;
        let stylesheet = self.parser.parse(&content, &display)?;
        self.cache.insert(path.to_path_buf(), stylesheet.deep_clone());
        Ok(stylesheet)
    }

    fn is_css_target(raw: &str, target: &str) -> bool {
        raw.starts_with("url(") || target.ends_with(".css") || URL_SCHEME.is_match(target)
    }

    fn resolve_path(
        &self,
        target: &str,
        current_dir: Option<&Path>,
        origin: &Node,
    ) -> SassResult<PathBuf> {
        let raw = Path::new(target);
        let mut candidates = Vec::new();
        if raw.is_absolute() {
            candidates.push(raw.to_path_buf());
        } else {
            if let Some(dir) = current_dir {
                candidates.push(dir.join(raw));
            }
            for base in &self.include_paths {
                candidates.push(base.join(raw));
            }
        }
        for candidate in candidates {
            if let Some(found) = Self::find_existing(&candidate) {
                return Ok(found);
            }
        }
        Err(SassError::eval(
            format!("unable to resolve @import target {target}"),
            origin.path(),
            origin.line(),
        ))
    }

    /// 依次尝试原名、补 `.scss` 扩展名和 `_name.scss` 局部文件。
    fn find_existing(candidate: &Path) -> Option<PathBuf> {
        let mut attempts = vec![candidate.to_path_buf()];
        if candidate.extension().is_none() {
            attempts.push(candidate.with_extension("scss"));
        }
        if let Some(name) = candidate.file_name() {
            let parent = candidate.parent().unwrap_or_else(|| Path::new(""));
            let hidden = parent.join(format!("_{}", name.to_string_lossy()));
            if hidden.extension().is_none() {
                attempts.push(hidden.with_extension("scss"));
            } else {
                attempts.push(hidden);
            }
        }
        for attempt in attempts {
            if attempt.exists() && attempt.is_file() {
                if let Ok(real) = attempt.canonicalize() {
                    return Some(real);
                }
                return Some(attempt);
            }
        }
        None
    }
}

/// 入口：给定根节点与检索目录，展开其中的文件导入。
pub fn expand_imports(
    parser: &SassParser,
    root: Node,
    current_dir: Option<&Path>,
    include_paths: &[PathBuf],
) -> SassResult<Node> {
    let mut resolver = ImportResolver::new(parser, include_paths);
    resolver.expand(root, current_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_targets_are_recognized() {
        assert!(ImportResolver::is_css_target("\"reset.css\"", "reset.css"));
        assert!(ImportResolver::is_css_target(
            "\"https://cdn.example.com/reset\"",
            "https://cdn.example.com/reset"
        ));
        assert!(ImportResolver::is_css_target(
            "\"//cdn.example.com/reset\"",
            "//cdn.example.com/reset"
        ));
        assert!(ImportResolver::is_css_target(
            "url(theme.scss)",
            "url(theme.scss)"
        ));
        assert!(!ImportResolver::is_css_target("\"partials/colors\"", "partials/colors"));
        assert!(!ImportResolver::is_css_target("\"theme.scss\"", "theme.scss"));
    }
}
