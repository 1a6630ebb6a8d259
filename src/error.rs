use thiserror::Error;

/// 编译各阶段共用的错误类型，统一携带源路径与行号。
#[derive(Debug, Error)]
pub enum SassError {
    #[error("{path}:{line}: error during parsing: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },
    #[error("{path}:{line}: error during evaluation: {message}")]
    Eval {
        path: String,
        line: usize,
        message: String,
    },
    #[error("error reading {path}: {message}")]
    Read { path: String, message: String },
}

pub type SassResult<T> = Result<T, SassError>;

impl SassError {
    pub fn parse<S: Into<String>>(message: S, path: &str, line: usize) -> Self {
        SassError::Parse {
            path: unquote_path(path),
            line,
            message: message.into(),
        }
    }

    pub fn eval<S: Into<String>>(message: S, path: &str, line: usize) -> Self {
        SassError::Eval {
            path: unquote_path(path),
            line,
            message: message.into(),
        }
    }

    pub fn read<S: Into<String>>(message: S, path: &str) -> Self {
        SassError::Read {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// 路径若带有成对引号，存储前先剥掉。
fn unquote_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return path[1..path.len() - 1].to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_paths_are_unquoted() {
        let err = SassError::eval("boom", "\"styles/app.scss\"", 3);
        match err {
            SassError::Eval { path, line, .. } => {
                assert_eq!(path, "styles/app.scss");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn mismatched_quotes_are_kept() {
        let err = SassError::eval("boom", "\"styles/app.scss'", 1);
        match err {
            SassError::Eval { path, .. } => assert_eq!(path, "\"styles/app.scss'"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
