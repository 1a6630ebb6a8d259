//! sass_oxide 库入口，提供 SCSS 风格样式表的编译能力。
//! 内部分为三个阶段：解析（Parser）→ 树重写（Evaluator）→ CSS 序列化（Serializer），
//! 变量、算术、mixin 展开与选择器嵌套都在重写阶段就地完成。

mod ast;
mod color;
mod error;
mod evaluator;
mod functions;
mod importer;
mod parser;
mod serializer;
mod utils;

pub use crate::error::{SassError, SassResult};

use evaluator::Evaluator;
use importer::expand_imports;
use parser::SassParser;
use serializer::Serializer;
use std::fs;
use std::path::{Path, PathBuf};

/// 编译配置。目前提供压缩开关与 @import 检索目录，
/// 后续可以在这里扩展 source map 等能力。
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// 是否输出压缩后的 CSS。
    pub minify: bool,
    /// 当前源文件所在目录，用于解析相对 @import。
    pub current_dir: Option<PathBuf>,
    /// 额外的检索目录。
    pub include_paths: Vec<PathBuf>,
}

/// 编译 SCSS 源码为 CSS 文本。
///
/// # 参数
/// * `source` - 待编译的 SCSS 字符串
/// * `options` - 编译配置
pub fn compile(source: &str, options: CompileOptions) -> SassResult<String> {
    compile_source(source, "", options)
}

/// 从文件路径编译 SCSS，自动处理相对 @import。
pub fn compile_file<P: AsRef<Path>>(path: P, mut options: CompileOptions) -> SassResult<String> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let source =
        fs::read_to_string(path).map_err(|err| SassError::read(err.to_string(), &display))?;
    if options.current_dir.is_none() {
        if let Some(parent) = path.parent() {
            options.current_dir = Some(parent.to_path_buf());
        }
    }
    if options.include_paths.is_empty() {
        if let Some(parent) = path.parent() {
            options.include_paths.push(parent.to_path_buf());
        }
    }
    compile_source(&source, &display, options)
}

fn compile_source(source: &str, path: &str, options: CompileOptions) -> SassResult<String> {
    let parser = SassParser::new();
    let mut tree = parser.parse(source, path)?;
    if options.current_dir.is_some() || !options.include_paths.is_empty() {
        tree = expand_imports(
            &parser,
            tree,
            options.current_dir.as_deref(),
            &options.include_paths,
        )?;
    }

    let minify = options.minify;
    let mut evaluator = Evaluator::new(options);
    let tree = evaluator.evaluate(tree)?;

    Ok(Serializer::new(minify).to_css(&tree))
}

#[cfg(feature = "node")]
use napi::{Error, Result};
#[cfg(feature = "node")]
use napi_derive::napi;

/// Node.js 侧的编译选项对象。
#[cfg(feature = "node")]
#[napi(object)]
pub struct JsCompileOptions {
    /// 是否压缩输出 CSS。
    pub minify: Option<bool>,
    /// 源文件路径，用于解析 @import。
    pub filename: Option<String>,
}

/// 暴露给 Node.js 的编译函数。
#[cfg(feature = "node")]
#[napi]
pub fn compile_scss(source: String, options: Option<JsCompileOptions>) -> Result<String> {
    let opt = options.unwrap_or(JsCompileOptions {
        minify: None,
        filename: None,
    });
    let mut compile_options = CompileOptions {
        minify: opt.minify.unwrap_or(false),
        ..CompileOptions::default()
    };
    if let Some(filename) = opt.filename {
        let path = PathBuf::from(&filename);
        if let Some(parent) = path.parent() {
            let dir = parent.to_path_buf();
            compile_options.current_dir = Some(dir.clone());
            compile_options.include_paths.push(dir);
        }
    }
    compile(&source, compile_options).map_err(|err| Error::from_reason(err.to_string()))
}
