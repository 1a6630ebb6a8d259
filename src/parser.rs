use std::rc::Rc;

use crate::ast::{Node, Token, Variant};
use crate::error::{SassError, SassResult};

/// SCSS 解析器，把源码转换成求值器消费的树。
/// 求值器在重组选择器 schema 时会通过 [`SassParser::parse_selector_group`]
/// 重新进入本模块。
pub struct SassParser;

enum BodyKind {
    Declaration,
    Propset,
    NestedRule,
}

impl SassParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, source: &str, path: &str) -> SassResult<Node> {
        let mut cursor = Cursor::new(source, path, 1);
        let root = Node::new(Variant::Root, cursor.path(), 1);
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.is_eof() {
                break;
            }
            let statement = self.parse_statement(&mut cursor)?;
            root.push(statement);
        }
        Ok(root)
    }

    /// 选择器 schema 的重解析入口。缓冲区由求值器拼装，
    /// 以 ` {` 结尾，行号沿用 schema 原节点。
    pub fn parse_selector_group(
        &self,
        source: &str,
        path: &str,
        line: usize,
    ) -> SassResult<Node> {
        let mut cursor = Cursor::new(source, path, line);
        cursor.skip_whitespace_and_comments();
        self.parse_selector_prelude(&mut cursor)
    }

    fn parse_statement(&self, cursor: &mut Cursor) -> SassResult<Node> {
        if cursor.starts_with('$') {
            return self.parse_assignment(cursor);
        }
        if cursor.starts_with('@') {
            return self.parse_directive(cursor);
        }
        self.parse_ruleset(cursor)
    }

    fn parse_directive(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        cursor.expect_char('@')?;
        let name = cursor.read_identifier();
        match name.text() {
            "mixin" => self.parse_mixin_definition(cursor, line),
            "include" => self.parse_expansion(cursor, line),
            "import" => self.parse_import(cursor, line),
            other => Err(SassError::parse(
                format!("unsupported directive @{other}"),
                cursor.path(),
                line,
            )),
        }
    }

    fn parse_assignment(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let variable = self.parse_variable(cursor)?;
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(':')?;
        cursor.skip_whitespace_and_comments();
        let value = self.parse_list(cursor, &[';', '}'])?;
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }
        let node = Node::new(Variant::Assignment, cursor.path(), line);
        node.push(variable);
        node.push(value);
        Ok(node)
    }

    fn parse_variable(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        cursor.expect_char('$')?;
        let ident = cursor.read_identifier();
        if ident.text().is_empty() {
            return Err(SassError::parse(
                "variable name expected after '$'",
                cursor.path(),
                line,
            ));
        }
        // token 连同 $ 前缀一起入环境
        let token = cursor.token_from(start);
        Ok(Node::leaf(Variant::Variable, cursor.path(), line, token).with_eval())
    }

    fn parse_ruleset(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let selector = self.parse_selector_prelude(cursor)?;
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;
        let node = Node::new(Variant::Ruleset, cursor.path(), line);
        node.push(selector);
        node.push(body);
        Ok(node)
    }

    /// 读取 `{` 之前的选择器文本。含 `#{}` 插值时产出 schema，
    /// 留待求值后重新解析；否则直接做结构化拆分。
    fn parse_selector_prelude(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        let mut pieces: Vec<Node> = Vec::new();
        let mut piece_start = start;
        let mut interpolated = false;

        loop {
            match cursor.peek_char() {
                None => {
                    return Err(SassError::parse(
                        "expected '{' after selector",
                        cursor.path(),
                        line,
                    ));
                }
                Some('{') => break,
                Some('#') if cursor.peek_second() == Some('{') => {
                    interpolated = true;
                    if cursor.position() > piece_start {
                        pieces.push(Node::leaf(
                            Variant::StringConstant,
                            cursor.path(),
                            line,
                            cursor.token_between(piece_start, cursor.position()),
                        ));
                    }
                    cursor.advance_char();
                    cursor.advance_char();
                    cursor.skip_whitespace_and_comments();
                    let inner = self.parse_list(cursor, &['}'])?;
                    cursor.expect_char('}')?;
                    pieces.push(inner);
                    piece_start = cursor.position();
                }
                Some(_) => {
                    cursor.advance_char();
                }
            }
        }

        if interpolated {
            if cursor.position() > piece_start {
                pieces.push(Node::leaf(
                    Variant::StringConstant,
                    cursor.path(),
                    line,
                    cursor.token_between(piece_start, cursor.position()),
                ));
            }
            let schema = Node::new(Variant::SelectorSchema, cursor.path(), line).with_eval();
            for piece in pieces {
                schema.push(piece);
            }
            Ok(schema)
        } else {
            self.parse_selector_text(cursor, start, cursor.position(), line)
        }
    }

    /// 逗号拆分选择器组，空白拆分后代链。
    fn parse_selector_text(
        &self,
        cursor: &Cursor,
        start: usize,
        end: usize,
        line: usize,
    ) -> SassResult<Node> {
        let mut members = Vec::new();
        let mut segment_start = start;
        {
            let text = cursor.slice(start, end);
            for (offset, ch) in text.char_indices() {
                if ch == ',' {
                    members.push((segment_start, start + offset));
                    segment_start = start + offset + ch.len_utf8();
                }
            }
        }
        members.push((segment_start, end));

        let mut selectors = Vec::new();
        for (member_start, member_end) in members {
            if let Some(selector) =
                self.parse_selector_member(cursor, member_start, member_end, line)
            {
                selectors.push(selector);
            }
        }

        if selectors.is_empty() {
            return Err(SassError::parse(
                "expected a selector",
                cursor.path(),
                line,
            ));
        }
        if selectors.len() == 1 {
            return Ok(selectors.remove(0));
        }
        let group = Node::new(Variant::SelectorGroup, cursor.path(), line);
        for selector in selectors {
            group.push(selector);
        }
        Ok(group)
    }

    fn parse_selector_member(
        &self,
        cursor: &Cursor,
        start: usize,
        end: usize,
        line: usize,
    ) -> Option<Node> {
        let mut parts = Vec::new();
        let mut part_start: Option<usize> = None;
        {
            let text = cursor.slice(start, end);
            for (offset, ch) in text.char_indices() {
                if ch.is_whitespace() {
                    if let Some(begin) = part_start.take() {
                        parts.push((begin, start + offset));
                    }
                } else if part_start.is_none() {
                    part_start = Some(start + offset);
                }
            }
        }
        if let Some(begin) = part_start {
            parts.push((begin, end));
        }

        if parts.is_empty() {
            return None;
        }
        if parts.len() == 1 {
            let (s, e) = parts[0];
            return Some(self.parse_simple_part(cursor, s, e, line));
        }
        let selector = Node::new(Variant::Selector, cursor.path(), line);
        for (s, e) in parts {
            selector.push(self.parse_simple_part(cursor, s, e, line));
        }
        Some(selector)
    }

    fn parse_simple_part(&self, cursor: &Cursor, start: usize, end: usize, line: usize) -> Node {
        let text = cursor.slice(start, end);
        if text == "&" {
            return Node::new(Variant::Backref, cursor.path(), line);
        }
        if !text.contains('&') {
            return Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                cursor.token_between(start, end),
            );
        }

        // `&:hover`、`.a&` 之类的复合序列：按 & 切开
        let sequence = Node::new(Variant::SimpleSelectorSequence, cursor.path(), line);
        let mut run_start = start;
        for (offset, ch) in text.char_indices() {
            if ch == '&' {
                let absolute = start + offset;
                if absolute > run_start {
                    sequence.push(Node::leaf(
                        Variant::StringConstant,
                        cursor.path(),
                        line,
                        cursor.token_between(run_start, absolute),
                    ));
                }
                sequence.push(Node::new(Variant::Backref, cursor.path(), line));
                run_start = absolute + ch.len_utf8();
            }
        }
        if end > run_start {
            sequence.push(Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                cursor.token_between(run_start, end),
            ));
        }
        sequence
    }

    fn parse_block(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let block = Node::new(Variant::Block, cursor.path(), cursor.line());
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some('}') => {
                    cursor.advance_char();
                    break;
                }
                None => {
                    return Err(SassError::parse(
                        "missing closing '}'",
                        cursor.path(),
                        cursor.line(),
                    ));
                }
                _ => {
                    let item = self.parse_block_item(cursor)?;
                    block.push(item);
                }
            }
        }
        Ok(block)
    }

    fn parse_block_item(&self, cursor: &mut Cursor) -> SassResult<Node> {
        if cursor.starts_with('$') {
            return self.parse_assignment(cursor);
        }
        if cursor.starts_with('@') {
            return self.parse_directive(cursor);
        }
        match self.detect_body_kind(cursor) {
            Some(BodyKind::Declaration) => self.parse_declaration(cursor),
            Some(BodyKind::Propset) => self.parse_propset(cursor),
            Some(BodyKind::NestedRule) => self.parse_ruleset(cursor),
            None => Err(SassError::parse(
                "expected a declaration or nested ruleset",
                cursor.path(),
                cursor.line(),
            )),
        }
    }

    /// 向前扫描判断块内语句形态：先遇 `;` 是声明，先遇 `{` 看
    /// 它是否紧跟在 `:` 之后（属性命名空间）或属于嵌套规则。
    fn detect_body_kind(&self, cursor: &Cursor) -> Option<BodyKind> {
        let mut lookahead = cursor.clone();
        lookahead.skip_whitespace_and_comments();
        let mut saw_colon = false;
        let mut last_meaningful = '\0';
        while let Some(ch) = lookahead.peek_char() {
            match ch {
                '#' if lookahead.peek_second() == Some('{') => {
                    lookahead.advance_char();
                    lookahead.advance_char();
                    while let Some(inner) = lookahead.advance_char() {
                        if inner == '}' {
                            break;
                        }
                    }
                    last_meaningful = '}';
                    continue;
                }
                ';' => return Some(BodyKind::Declaration),
                '}' => {
                    return if saw_colon {
                        Some(BodyKind::Declaration)
                    } else {
                        None
                    };
                }
                '{' => {
                    return if last_meaningful == ':' {
                        Some(BodyKind::Propset)
                    } else {
                        Some(BodyKind::NestedRule)
                    };
                }
                ':' => {
                    saw_colon = true;
                    last_meaningful = ch;
                }
                _ => {
                    if !ch.is_whitespace() {
                        last_meaningful = ch;
                    }
                }
            }
            lookahead.advance_char();
        }
        if saw_colon {
            Some(BodyKind::Declaration)
        } else {
            None
        }
    }

    fn parse_declaration(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let property = cursor.read_property_name();
        if property.text().is_empty() {
            return Err(SassError::parse(
                "property name expected",
                cursor.path(),
                line,
            ));
        }
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(':')?;
        cursor.skip_whitespace_and_comments();
        let value = self.parse_list(cursor, &[';', '}'])?;
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }
        let node = Node::new(Variant::Rule, cursor.path(), line);
        node.push(Node::leaf(
            Variant::StringConstant,
            cursor.path(),
            line,
            property,
        ));
        node.push(value);
        Ok(node)
    }

    fn parse_propset(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let property = cursor.read_property_name();
        if property.text().is_empty() {
            return Err(SassError::parse(
                "property name expected",
                cursor.path(),
                line,
            ));
        }
        cursor.skip_whitespace_and_comments();
        cursor.expect_char(':')?;
        cursor.skip_whitespace_and_comments();
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;
        let node = Node::new(Variant::Propset, cursor.path(), line);
        node.push(Node::leaf(
            Variant::StringConstant,
            cursor.path(),
            line,
            property,
        ));
        node.push(body);
        Ok(node)
    }

    fn parse_mixin_definition(&self, cursor: &mut Cursor, line: usize) -> SassResult<Node> {
        cursor.skip_whitespace_and_comments();
        let name = cursor.read_identifier();
        if name.text().is_empty() {
            return Err(SassError::parse("mixin name expected", cursor.path(), line));
        }
        cursor.skip_whitespace_and_comments();
        let params = Node::new(Variant::CommaList, cursor.path(), cursor.line());
        if cursor.peek_char() == Some('(') {
            self.parse_mixin_params(cursor, &params)?;
        }
        cursor.skip_whitespace_and_comments();
        cursor.expect_char('{')?;
        let body = self.parse_block(cursor)?;
        let node = Node::new(Variant::Mixin, cursor.path(), line);
        node.push(Node::leaf(Variant::StringConstant, cursor.path(), line, name));
        node.push(params);
        node.push(body);
        Ok(node)
    }

    fn parse_mixin_params(&self, cursor: &mut Cursor, params: &Node) -> SassResult<()> {
        cursor.expect_char('(')?;
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(')') {
                cursor.advance_char();
                break;
            }
            let variable = self.parse_variable(cursor)?;
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(':') {
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                let default = self.parse_list(cursor, &[',', ')'])?;
                let assignment =
                    Node::new(Variant::Assignment, cursor.path(), cursor.line());
                assignment.push(variable);
                assignment.push(default);
                params.push(assignment);
            } else {
                params.push(variable);
            }
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some(',') => {
                    cursor.advance_char();
                }
                Some(')') => {
                    cursor.advance_char();
                    break;
                }
                _ => {
                    return Err(SassError::parse(
                        "expected ',' or ')' in parameter list",
                        cursor.path(),
                        cursor.line(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn parse_expansion(&self, cursor: &mut Cursor, line: usize) -> SassResult<Node> {
        cursor.skip_whitespace_and_comments();
        let name = cursor.read_identifier();
        if name.text().is_empty() {
            return Err(SassError::parse("mixin name expected", cursor.path(), line));
        }
        cursor.skip_whitespace_and_comments();
        let args = Node::new(Variant::CommaList, cursor.path(), cursor.line());
        if cursor.peek_char() == Some('(') {
            self.parse_arguments(cursor, &args)?;
        }
        cursor.skip_whitespace_and_comments();
        if cursor.peek_char() == Some(';') {
            cursor.advance_char();
        }
        let node = Node::new(Variant::Expansion, cursor.path(), line);
        node.push(Node::leaf(Variant::StringConstant, cursor.path(), line, name));
        node.push(args);
        Ok(node)
    }

    fn parse_arguments(&self, cursor: &mut Cursor, args: &Node) -> SassResult<()> {
        cursor.expect_char('(')?;
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(')') {
                cursor.advance_char();
                break;
            }
            if cursor.starts_with('$') && self.lookahead_is_keyword_argument(cursor) {
                let line = cursor.line();
                let variable = self.parse_variable(cursor)?;
                cursor.skip_whitespace_and_comments();
                cursor.expect_char(':')?;
                cursor.skip_whitespace_and_comments();
                let value = self.parse_list(cursor, &[',', ')'])?;
                let assignment = Node::new(Variant::Assignment, cursor.path(), line);
                assignment.push(variable);
                assignment.push(value);
                args.push(assignment);
            } else {
                let value = self.parse_list(cursor, &[',', ')'])?;
                args.push(value);
            }
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                Some(',') => {
                    cursor.advance_char();
                }
                Some(')') => {
                    cursor.advance_char();
                    break;
                }
                _ => {
                    return Err(SassError::parse(
                        "expected ',' or ')' in argument list",
                        cursor.path(),
                        cursor.line(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn lookahead_is_keyword_argument(&self, cursor: &Cursor) -> bool {
        let mut lookahead = cursor.clone();
        if lookahead.advance_char() != Some('$') {
            return false;
        }
        let ident = lookahead.read_identifier();
        if ident.text().is_empty() {
            return false;
        }
        lookahead.skip_whitespace_and_comments();
        lookahead.peek_char() == Some(':')
    }

    fn parse_import(&self, cursor: &mut Cursor, line: usize) -> SassResult<Node> {
        cursor.skip_whitespace_and_comments();
        let start = cursor.position();
        while let Some(ch) = cursor.peek_char() {
            if ch == ';' {
                break;
            }
            cursor.advance_char();
        }
        let mut end = cursor.position();
        cursor.expect_char(';')?;
        {
            // 去掉目标尾部的空白
            let text = cursor.slice(start, end);
            end = start + text.trim_end().len();
        }
        if end == start {
            return Err(SassError::parse(
                "import target expected",
                cursor.path(),
                line,
            ));
        }
        let node = Node::new(Variant::CssImport, cursor.path(), line);
        node.push(Node::leaf(
            Variant::StringConstant,
            cursor.path(),
            line,
            cursor.token_between(start, end),
        ));
        Ok(node)
    }

    /// 逗号层。单元素时直接返回该元素。
    fn parse_list(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let mut items = vec![self.parse_space_list(cursor, terminators)?];
        loop {
            cursor.skip_whitespace_and_comments();
            if cursor.peek_char() == Some(',') && !terminators.contains(&',') {
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                items.push(self.parse_space_list(cursor, terminators)?);
            } else {
                break;
            }
        }
        if items.len() == 1 {
            return Ok(items.remove(0));
        }
        let list = Node::new(Variant::CommaList, cursor.path(), line);
        if items.iter().any(Node::should_eval) {
            list.set_should_eval(true);
        }
        for item in items {
            list.push(item);
        }
        Ok(list)
    }

    /// 空格层。
    fn parse_space_list(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let mut items = vec![self.parse_disjunction(cursor, terminators)?];
        loop {
            cursor.skip_whitespace_and_comments();
            match cursor.peek_char() {
                None => break,
                Some(ch)
                    if terminators.contains(&ch)
                        || matches!(ch, ';' | '}' | ')' | ',' | '{') =>
                {
                    break;
                }
                _ => items.push(self.parse_disjunction(cursor, terminators)?),
            }
        }
        if items.len() == 1 {
            return Ok(items.remove(0));
        }
        let list = Node::new(Variant::SpaceList, cursor.path(), line);
        if items.iter().any(Node::should_eval) {
            list.set_should_eval(true);
        }
        for item in items {
            list.push(item);
        }
        Ok(list)
    }

    fn parse_disjunction(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let first = self.parse_conjunction(cursor, terminators)?;
        let mut rest = Vec::new();
        loop {
            let mut lookahead = cursor.clone();
            lookahead.skip_whitespace_and_comments();
            if !lookahead.starts_with_keyword("or") {
                break;
            }
            cursor.skip_whitespace_and_comments();
            cursor.consume_keyword("or");
            cursor.skip_whitespace_and_comments();
            rest.push(self.parse_conjunction(cursor, terminators)?);
        }
        if rest.is_empty() {
            return Ok(first);
        }
        let node = Node::new(Variant::Disjunction, cursor.path(), line).with_eval();
        node.push(first);
        for item in rest {
            node.push(item);
        }
        Ok(node)
    }

    fn parse_conjunction(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let first = self.parse_relation(cursor, terminators)?;
        let mut rest = Vec::new();
        loop {
            let mut lookahead = cursor.clone();
            lookahead.skip_whitespace_and_comments();
            if !lookahead.starts_with_keyword("and") {
                break;
            }
            cursor.skip_whitespace_and_comments();
            cursor.consume_keyword("and");
            cursor.skip_whitespace_and_comments();
            rest.push(self.parse_relation(cursor, terminators)?);
        }
        if rest.is_empty() {
            return Ok(first);
        }
        let node = Node::new(Variant::Conjunction, cursor.path(), line).with_eval();
        node.push(first);
        for item in rest {
            node.push(item);
        }
        Ok(node)
    }

    fn parse_relation(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let lhs = self.parse_expression(cursor, terminators)?;
        let mut lookahead = cursor.clone();
        lookahead.skip_whitespace_and_comments();
        let op = if lookahead.starts_with_str("==") {
            Some((Variant::Eq, 2))
        } else if lookahead.starts_with_str("!=") {
            Some((Variant::Neq, 2))
        } else if lookahead.starts_with_str(">=") {
            Some((Variant::Gte, 2))
        } else if lookahead.starts_with_str("<=") {
            Some((Variant::Lte, 2))
        } else if lookahead.starts_with_str(">") {
            Some((Variant::Gt, 1))
        } else if lookahead.starts_with_str("<") {
            Some((Variant::Lt, 1))
        } else {
            None
        };
        let Some((variant, width)) = op else {
            return Ok(lhs);
        };
        cursor.skip_whitespace_and_comments();
        for _ in 0..width {
            cursor.advance_char();
        }
        cursor.skip_whitespace_and_comments();
        let rhs = self.parse_expression(cursor, terminators)?;
        let node = Node::new(Variant::Relation, cursor.path(), line).with_eval();
        node.push(lhs);
        node.push(Node::new(variant, cursor.path(), line));
        node.push(rhs);
        Ok(node)
    }

    /// 加减层。`-` 只有后跟空白时才算二元运算符，
    /// 否则留给负数字面量。
    fn parse_expression(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let first = self.parse_term(cursor, terminators)?;
        let mut tail: Vec<(Variant, Node)> = Vec::new();
        loop {
            let mut lookahead = cursor.clone();
            lookahead.skip_whitespace_and_comments();
            let op = match lookahead.peek_char() {
                Some('+') if lookahead.peek_second().is_some_and(char::is_whitespace) => {
                    Variant::Add
                }
                Some('-') if lookahead.peek_second().is_some_and(char::is_whitespace) => {
                    Variant::Sub
                }
                _ => break,
            };
            cursor.skip_whitespace_and_comments();
            cursor.advance_char();
            cursor.skip_whitespace_and_comments();
            tail.push((op, self.parse_term(cursor, terminators)?));
        }
        if tail.is_empty() {
            return Ok(first);
        }
        let node = Node::new(Variant::Expression, cursor.path(), line).with_eval();
        node.push(first);
        for (op, operand) in tail {
            node.push(Node::new(op, cursor.path(), line));
            node.push(operand);
        }
        Ok(node)
    }

    /// 乘除层。
    fn parse_term(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        let line = cursor.line();
        let first = self.parse_factor(cursor, terminators)?;
        let mut tail: Vec<(Variant, Node)> = Vec::new();
        loop {
            let mut lookahead = cursor.clone();
            lookahead.skip_whitespace_and_comments();
            let op = match lookahead.peek_char() {
                Some('*') => Variant::Mul,
                Some('/') => Variant::Div,
                _ => break,
            };
            cursor.skip_whitespace_and_comments();
            cursor.advance_char();
            cursor.skip_whitespace_and_comments();
            tail.push((op, self.parse_factor(cursor, terminators)?));
        }
        if tail.is_empty() {
            return Ok(first);
        }
        let node = Node::new(Variant::Term, cursor.path(), line).with_eval();
        node.push(first);
        for (op, operand) in tail {
            node.push(Node::new(op, cursor.path(), line));
            node.push(operand);
        }
        Ok(node)
    }

    fn parse_factor(&self, cursor: &mut Cursor, terminators: &[char]) -> SassResult<Node> {
        match cursor.peek_char() {
            Some('(') => {
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                let inner = self.parse_list(cursor, &[')'])?;
                cursor.expect_char(')')?;
                Ok(inner)
            }
            // 一元符号只作用于变量或括号；数字的符号并入字面量，
            // `-moz-` 一类的前缀标识符整体走标识符路径
            Some('+') if cursor.peek_second().is_some_and(|c| c == '$' || c == '(') => {
                let line = cursor.line();
                cursor.advance_char();
                let operand = self.parse_factor(cursor, terminators)?;
                let node = Node::new(Variant::UnaryPlus, cursor.path(), line).with_eval();
                node.push(operand);
                Ok(node)
            }
            Some('-') if cursor.peek_second().is_some_and(|c| c == '$' || c == '(') => {
                let line = cursor.line();
                cursor.advance_char();
                let operand = self.parse_factor(cursor, terminators)?;
                let node = Node::new(Variant::UnaryMinus, cursor.path(), line).with_eval();
                node.push(operand);
                Ok(node)
            }
            _ => self.parse_atom(cursor),
        }
    }

    fn parse_atom(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        match cursor.peek_char() {
            None => Err(SassError::parse("expected a value", cursor.path(), line)),
            Some('$') => self.parse_variable(cursor),
            Some('"') | Some('\'') => self.parse_quoted(cursor),
            Some('#') if cursor.peek_second() == Some('{') => {
                cursor.advance_char();
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                let inner = self.parse_list(cursor, &['}'])?;
                cursor.expect_char('}')?;
                let schema = Node::new(Variant::ValueSchema, cursor.path(), line).with_eval();
                schema.push(inner);
                Ok(schema)
            }
            Some('#') => self.parse_hex(cursor),
            Some('!') => {
                cursor.advance_char();
                cursor.skip_whitespace_and_comments();
                let ident = cursor.read_identifier();
                if ident.text() != "important" {
                    return Err(SassError::parse(
                        "expected 'important' after '!'",
                        cursor.path(),
                        line,
                    ));
                }
                Ok(Node::leaf(
                    Variant::StringConstant,
                    cursor.path(),
                    line,
                    Token::from_str("!important"),
                ))
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number_like(cursor),
            Some(c)
                if (c == '-' || c == '+')
                    && cursor
                        .peek_second()
                        .is_some_and(|n| n.is_ascii_digit() || n == '.') =>
            {
                self.parse_number_like(cursor)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-' => {
                self.parse_identifier_like(cursor)
            }
            Some(c) => Err(SassError::parse(
                format!("unexpected character '{c}' in value"),
                cursor.path(),
                line,
            )),
        }
    }

    fn parse_number_like(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        if matches!(cursor.peek_char(), Some('-') | Some('+')) {
            cursor.advance_char();
        }
        let digits_start = cursor.position();
        while let Some(ch) = cursor.peek_char() {
            if ch.is_ascii_digit() || ch == '.' {
                cursor.advance_char();
            } else {
                break;
            }
        }
        if cursor.position() == digits_start {
            return Err(SassError::parse(
                "expected a number",
                cursor.path(),
                line,
            ));
        }
        if cursor.peek_char() == Some('%') {
            cursor.advance_char();
            return Ok(Node::leaf(
                Variant::TextualPercentage,
                cursor.path(),
                line,
                cursor.token_from(start),
            ));
        }
        let unit_start = cursor.position();
        while let Some(ch) = cursor.peek_char() {
            if ch.is_ascii_alphabetic() {
                cursor.advance_char();
            } else {
                break;
            }
        }
        let variant = if cursor.position() > unit_start {
            Variant::TextualDimension
        } else {
            Variant::TextualNumber
        };
        Ok(Node::leaf(variant, cursor.path(), line, cursor.token_from(start)))
    }

    fn parse_hex(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        cursor.expect_char('#')?;
        while let Some(ch) = cursor.peek_char() {
            if ch.is_ascii_alphanumeric() {
                cursor.advance_char();
            } else {
                break;
            }
        }
        let token = cursor.token_from(start);
        let digits = &token.text()[1..];
        let is_hex = (digits.len() == 3 || digits.len() == 6)
            && digits.chars().all(|c| c.is_ascii_hexdigit());
        if is_hex {
            Ok(Node::leaf(Variant::TextualHex, cursor.path(), line, token))
        } else {
            Ok(Node::leaf(Variant::StringConstant, cursor.path(), line, token))
        }
    }

    fn parse_quoted(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        let quote = match cursor.advance_char() {
            Some(c) => c,
            None => return Err(SassError::parse("expected a string", cursor.path(), line)),
        };
        let mut pieces: Vec<Node> = Vec::new();
        let mut piece_start = start;
        let mut interpolated = false;
        loop {
            match cursor.peek_char() {
                None => {
                    return Err(SassError::parse(
                        "unterminated string",
                        cursor.path(),
                        line,
                    ));
                }
                Some('\\') => {
                    cursor.advance_char();
                    cursor.advance_char();
                }
                Some('#') if cursor.peek_second() == Some('{') => {
                    interpolated = true;
                    if cursor.position() > piece_start {
                        pieces.push(Node::leaf(
                            Variant::StringConstant,
                            cursor.path(),
                            line,
                            cursor.token_between(piece_start, cursor.position()),
                        ));
                    }
                    cursor.advance_char();
                    cursor.advance_char();
                    cursor.skip_whitespace_and_comments();
                    let inner = self.parse_list(cursor, &['}'])?;
                    cursor.expect_char('}')?;
                    pieces.push(inner);
                    piece_start = cursor.position();
                }
                Some(c) => {
                    cursor.advance_char();
                    if c == quote {
                        break;
                    }
                }
            }
        }
        if !interpolated {
            return Ok(Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                cursor.token_from(start),
            ));
        }
        if cursor.position() > piece_start {
            pieces.push(Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                cursor.token_between(piece_start, cursor.position()),
            ));
        }
        let schema = Node::new(Variant::StringSchema, cursor.path(), line).with_eval();
        for piece in pieces {
            schema.push(piece);
        }
        Ok(schema)
    }

    fn parse_identifier_like(&self, cursor: &mut Cursor) -> SassResult<Node> {
        let line = cursor.line();
        let start = cursor.position();
        let ident = cursor.read_identifier();
        match ident.text() {
            "true" => return Ok(Node::boolean(cursor.path(), line, true)),
            "false" => return Ok(Node::boolean(cursor.path(), line, false)),
            _ => {}
        }
        if cursor.peek_char() != Some('(') {
            return Ok(Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                ident,
            ));
        }
        // url()/calc()/var() 里的内容不做求值，整段透传
        if matches!(ident.text(), "url" | "calc" | "var") {
            cursor.advance_char();
            let mut depth = 1usize;
            while let Some(ch) = cursor.advance_char() {
                match ch {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if depth != 0 {
                return Err(SassError::parse(
                    format!("unbalanced parentheses in {}()", ident.text()),
                    cursor.path(),
                    line,
                ));
            }
            return Ok(Node::leaf(
                Variant::StringConstant,
                cursor.path(),
                line,
                cursor.token_from(start),
            ));
        }
        let args = Node::new(Variant::CommaList, cursor.path(), cursor.line());
        self.parse_arguments(cursor, &args)?;
        let node = Node::new(Variant::FunctionCall, cursor.path(), line).with_eval();
        node.push(Node::leaf(Variant::StringConstant, cursor.path(), line, ident));
        node.push(args);
        Ok(node)
    }
}

/// 带行号的输入游标。克隆出的副本用于前瞻，互不影响。
#[derive(Clone)]
struct Cursor {
    source: Rc<str>,
    path: Rc<str>,
    len: usize,
    position: usize,
    line: usize,
}

impl Cursor {
    fn new(source: &str, path: &str, line: usize) -> Self {
        let source: Rc<str> = Rc::from(source);
        let len = source.len();
        Self {
            source,
            path: Rc::from(path),
            len,
            position: 0,
            line,
        }
    }

    fn path(&self) -> &Rc<str> {
        &self.path
    }

    fn line(&self) -> usize {
        self.line
    }

    fn position(&self) -> usize {
        self.position
    }

    fn is_eof(&self) -> bool {
        self.position >= self.len
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.source[start..end]
    }

    fn token_from(&self, start: usize) -> Token {
        Token::new(&self.source, start, self.position)
    }

    fn token_between(&self, start: usize, end: usize) -> Token {
        Token::new(&self.source, start, end)
    }

    fn starts_with(&self, ch: char) -> bool {
        self.peek_char() == Some(ch)
    }

    fn starts_with_str(&self, prefix: &str) -> bool {
        self.source[self.position..].starts_with(prefix)
    }

    fn starts_with_keyword(&self, keyword: &str) -> bool {
        if !self.starts_with_str(keyword) {
            return false;
        }
        match self.source[self.position + keyword.len()..].chars().next() {
            Some(ch) => !ch.is_alphanumeric() && ch != '-' && ch != '_',
            None => true,
        }
    }

    fn consume_keyword(&mut self, keyword: &str) {
        self.position += keyword.len();
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.source[self.position..].chars().nth(1)
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn expect_char(&mut self, expected: char) -> SassResult<()> {
        match self.advance_char() {
            Some(ch) if ch == expected => Ok(()),
            Some(ch) => Err(SassError::parse(
                format!("expected '{expected}', found '{ch}'"),
                &self.path,
                self.line,
            )),
            None => Err(SassError::parse(
                format!("expected '{expected}'"),
                &self.path,
                self.line,
            )),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if self.starts_with('/') && self.consume_comment() {
                continue;
            }
            break;
        }
    }

    fn consume_comment(&mut self) -> bool {
        if self.starts_with_str("//") {
            while let Some(ch) = self.advance_char() {
                if ch == '\n' {
                    break;
                }
            }
            true
        } else if self.starts_with_str("/*") {
            self.advance_char();
            self.advance_char();
            loop {
                if self.starts_with_str("*/") {
                    self.advance_char();
                    self.advance_char();
                    break;
                }
                if self.advance_char().is_none() {
                    break;
                }
            }
            true
        } else {
            false
        }
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.token_from(start)
    }

    fn read_property_name(&mut self) -> Token {
        let start = self.position;
        let mut end = self.position;
        while let Some(ch) = self.peek_char() {
            if ch == ':' || ch == ';' || ch == '{' || ch == '}' {
                break;
            }
            self.advance_char();
            if !ch.is_whitespace() {
                end = self.position;
            }
        }
        self.token_between(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Node {
        SassParser::new().parse(source, "test.scss").unwrap()
    }

    #[test]
    fn assignment_produces_variable_and_value() {
        let root = parse("$width: 10px;");
        assert_eq!(root.len(), 1);
        let assignment = root.child(0);
        assert_eq!(assignment.variant(), Variant::Assignment);
        assert_eq!(assignment.child(0).token().map(Token::text), Some("$width"));
        assert_eq!(assignment.child(1).variant(), Variant::TextualDimension);
    }

    #[test]
    fn ruleset_splits_selector_groups() {
        let root = parse(".a, .b { color: red; }");
        let ruleset = root.child(0);
        assert_eq!(ruleset.variant(), Variant::Ruleset);
        let selector = ruleset.child(0);
        assert_eq!(selector.variant(), Variant::SelectorGroup);
        assert_eq!(selector.len(), 2);
    }

    #[test]
    fn descendant_selector_becomes_component_chain() {
        let root = parse("ul li a { color: red; }");
        let selector = root.child(0).child(0);
        assert_eq!(selector.variant(), Variant::Selector);
        assert_eq!(selector.len(), 3);
        assert_eq!(selector.to_string(), "ul li a");
    }

    #[test]
    fn parent_reference_is_detected() {
        let root = parse(".btn { &:hover { color: red; } }");
        let nested = root.child(0).child(1).child(0);
        assert_eq!(nested.variant(), Variant::Ruleset);
        assert!(nested.child(0).has_backref());
    }

    #[test]
    fn arithmetic_builds_operator_trees() {
        let root = parse("$x: 1 + 2 * 3;");
        let value = root.child(0).child(1);
        assert_eq!(value.variant(), Variant::Expression);
        assert_eq!(value.len(), 3);
        assert_eq!(value.child(1).variant(), Variant::Add);
        assert_eq!(value.child(2).variant(), Variant::Term);
    }

    #[test]
    fn plain_declarations_are_not_marked_for_evaluation() {
        let root = parse(".a { color: red; width: 10px; }");
        let block = root.child(0).child(1);
        assert!(!block.child(0).child(1).should_eval());
        assert!(!block.child(1).child(1).should_eval());
    }

    #[test]
    fn variables_in_values_are_marked_for_evaluation() {
        let root = parse(".a { width: $w; }");
        let rhs = root.child(0).child(1).child(0).child(1);
        assert_eq!(rhs.variant(), Variant::Variable);
        assert!(rhs.should_eval());
    }

    #[test]
    fn mixin_definition_has_name_params_body() {
        let root = parse("@mixin rounded($radius: 2px) { border-radius: $radius; }");
        let mixin = root.child(0);
        assert_eq!(mixin.variant(), Variant::Mixin);
        assert_eq!(mixin.child(0).token().map(Token::text), Some("rounded"));
        let params = mixin.child(1);
        assert_eq!(params.len(), 1);
        assert_eq!(params.child(0).variant(), Variant::Assignment);
        assert_eq!(mixin.child(2).variant(), Variant::Block);
    }

    #[test]
    fn include_with_keyword_argument() {
        let root = parse(".a { @include rounded($radius: 4px); }");
        let expansion = root.child(0).child(1).child(0);
        assert_eq!(expansion.variant(), Variant::Expansion);
        let args = expansion.child(1);
        assert_eq!(args.len(), 1);
        assert_eq!(args.child(0).variant(), Variant::Assignment);
    }

    #[test]
    fn function_calls_keep_name_and_arguments() {
        let root = parse("$c: rgba(0, 0, 0, 0.5);");
        let call = root.child(0).child(1);
        assert_eq!(call.variant(), Variant::FunctionCall);
        assert_eq!(call.child(0).token().map(Token::text), Some("rgba"));
        assert_eq!(call.child(1).len(), 4);
    }

    #[test]
    fn url_contents_are_passed_through() {
        let root = parse(".a { background: url(img/a-b.png); }");
        let rhs = root.child(0).child(1).child(0).child(1);
        assert_eq!(rhs.variant(), Variant::StringConstant);
        assert_eq!(rhs.token().map(Token::text), Some("url(img/a-b.png)"));
    }

    #[test]
    fn interpolated_selector_becomes_schema() {
        let root = parse(".#{$name} { color: red; }");
        let selector = root.child(0).child(0);
        assert_eq!(selector.variant(), Variant::SelectorSchema);
        assert!(selector.should_eval());
    }

    #[test]
    fn propset_groups_inner_declarations() {
        let root = parse(".a { font: { weight: bold; size: 12px; } }");
        let propset = root.child(0).child(1).child(0);
        assert_eq!(propset.variant(), Variant::Propset);
        assert_eq!(propset.child(0).token().map(Token::text), Some("font"));
        assert_eq!(propset.child(1).len(), 2);
    }

    #[test]
    fn import_keeps_raw_target() {
        let root = parse("@import \"reset.css\";");
        let import = root.child(0);
        assert_eq!(import.variant(), Variant::CssImport);
        assert_eq!(
            import.child(0).token().map(Token::text),
            Some("\"reset.css\"")
        );
    }

    #[test]
    fn boolean_connectives_nest_or_over_and() {
        let root = parse("$t: true and false or 5;");
        let value = root.child(0).child(1);
        assert_eq!(value.variant(), Variant::Disjunction);
        assert_eq!(value.child(0).variant(), Variant::Conjunction);
        assert_eq!(value.child(1).variant(), Variant::TextualNumber);
    }

    #[test]
    fn reparse_hook_honors_the_caller_line() {
        let parser = SassParser::new();
        let selector = parser.parse_selector_group(".a .b {", "test.scss", 7).unwrap();
        assert_eq!(selector.variant(), Variant::Selector);
        assert_eq!(selector.line(), 7);
        assert_eq!(selector.to_string(), ".a .b");
    }

    #[test]
    fn negative_dimension_stays_a_literal() {
        let root = parse(".a { margin: 10px -2px; }");
        let rhs = root.child(0).child(1).child(0).child(1);
        assert_eq!(rhs.variant(), Variant::SpaceList);
        assert_eq!(rhs.child(1).token().map(Token::text), Some("-2px"));
    }

    #[test]
    fn errors_carry_the_source_line() {
        let err = SassParser::new()
            .parse(".a {\n  color red;\n}", "test.scss")
            .unwrap_err();
        match err {
            SassError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
